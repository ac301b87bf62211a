// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: wires the security crate to persistent storage on this host.

pub mod app_services;
pub mod data_dir;
pub mod session_store;
pub mod vault_store;
