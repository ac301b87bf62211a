// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ledgerguard: tamper-evident ledger and session protection.
//
// Entry point. Initialises logging and the security services, then hands
// stdin to the operator console.

mod console;
mod services;

use std::process::ExitCode;

use ledgerguard_core::AppConfig;
use tracing::{error, info, warn};

use services::app_services::SecurityServices;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Ledgerguard starting");

    let services = match SecurityServices::init() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "persistent storage failed, using in-memory fallback");
            match SecurityServices::in_memory(AppConfig::default()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "in-memory fallback failed");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    if let Err(e) = services.persist_config() {
        warn!(error = %e, "could not write config");
    }

    match console::run(&services).await {
        Ok(()) => {
            info!("Ledgerguard shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "console failed");
            ExitCode::FAILURE
        }
    }
}
