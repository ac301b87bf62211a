// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Idle session lock.
//
// Two states. `Active` always has exactly one armed deadline; `Locked` has
// none. Each arm spawns a single sleeping task and aborts the previous one.
// A generation counter is bumped on every arm so a task that was already
// past its sleep when it got replaced cannot lock the session.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use ledgerguard_core::config::SessionConfig;
use ledgerguard_core::error::{LedgerguardError, Result};
use ledgerguard_core::types::{ActivityKind, SessionLockState};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::locks::lock;

const EVENT_CAPACITY: usize = 16;

/// Notification emitted on every state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LockEvent {
    Locked {
        session_id: Uuid,
        at: DateTime<Utc>,
        title: String,
        message: String,
    },
    Resumed {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
}

/// Inactivity watchdog for one user session.
///
/// Must be started inside a tokio runtime. Dropping it cancels the timer.
pub struct SessionLock {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    config: SessionConfig,
    runtime: Handle,
    machine: Mutex<Machine>,
    state_tx: watch::Sender<SessionLockState>,
    events_tx: broadcast::Sender<LockEvent>,
}

struct Machine {
    state: SessionLockState,
    generation: u64,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl SessionLock {
    /// Enter `Active` and arm the first deadline.
    pub fn start(config: SessionConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            LedgerguardError::Runtime(format!("session lock needs a tokio runtime: {e}"))
        })?;

        let (state_tx, _) = watch::channel(SessionLockState::Active);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            config,
            runtime,
            machine: Mutex::new(Machine {
                state: SessionLockState::Active,
                generation: 0,
                deadline: None,
                timer: None,
            }),
            state_tx,
            events_tx,
        });

        shared.arm(&mut lock(&shared.machine));
        info!(
            session_id = %shared.id,
            timeout_ms = shared.config.timeout_ms,
            "session lock armed"
        );
        Ok(Self { shared })
    }

    /// Report user activity. Re-arms the deadline while `Active`.
    ///
    /// Returns `false` when the session is locked and the event was ignored.
    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        let mut machine = lock(&self.shared.machine);
        if machine.state == SessionLockState::Locked {
            debug!(?kind, "activity ignored while locked");
            return false;
        }
        self.shared.arm(&mut machine);
        true
    }

    /// Leave `Locked` and re-arm. Returns `false` if already `Active`.
    pub fn resume(&self) -> bool {
        let mut machine = lock(&self.shared.machine);
        if machine.state == SessionLockState::Active {
            return false;
        }

        machine.state = SessionLockState::Active;
        self.shared.arm(&mut machine);
        self.shared.state_tx.send_replace(SessionLockState::Active);
        let _ = self.shared.events_tx.send(LockEvent::Resumed {
            session_id: self.shared.id,
            at: Utc::now(),
        });

        info!(session_id = %self.shared.id, "session resumed");
        true
    }

    pub fn state(&self) -> SessionLockState {
        lock(&self.shared.machine).state
    }

    pub fn is_locked(&self) -> bool {
        self.state() == SessionLockState::Locked
    }

    /// When the session will lock absent further activity. `None` while locked.
    pub fn deadline(&self) -> Option<Instant> {
        lock(&self.shared.machine).deadline
    }

    /// Watch the lock indicator.
    pub fn subscribe(&self) -> watch::Receiver<SessionLockState> {
        self.shared.state_tx.subscribe()
    }

    /// Receive lock and resume notifications from now on.
    pub fn notifications(&self) -> broadcast::Receiver<LockEvent> {
        self.shared.events_tx.subscribe()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock")
            .field("session_id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn arm(self: &Arc<Self>, machine: &mut Machine) {
        if let Some(timer) = machine.timer.take() {
            timer.abort();
        }

        machine.generation += 1;
        let generation = machine.generation;
        let deadline = Instant::now() + self.config.timeout();
        machine.deadline = Some(deadline);

        let weak: Weak<Self> = Arc::downgrade(self);
        machine.timer = Some(self.runtime.spawn(async move {
            sleep_until(deadline).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(generation);
            }
        }));
    }

    fn expire(&self, generation: u64) {
        let mut machine = lock(&self.machine);
        if machine.generation != generation || machine.state != SessionLockState::Active {
            return;
        }

        machine.state = SessionLockState::Locked;
        machine.deadline = None;
        machine.timer = None;

        self.state_tx.send_replace(SessionLockState::Locked);
        let _ = self.events_tx.send(LockEvent::Locked {
            session_id: self.id,
            at: Utc::now(),
            title: self.config.lock_title.clone(),
            message: self.config.lock_message.clone(),
        });

        warn!(
            session_id = %self.id,
            timeout_ms = self.config.timeout_ms,
            "session locked after inactivity"
        );
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let machine = self
            .machine
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = machine.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    use super::*;

    fn config_ms(ms: u64) -> SessionConfig {
        SessionConfig::with_timeout(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn locks_after_timeout() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        assert_eq!(lock.state(), SessionLockState::Active);
        assert!(lock.deadline().is_some());

        sleep(Duration::from_millis(150)).await;
        assert!(lock.is_locked());
        assert!(lock.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_postpones_lock() {
        let lock = SessionLock::start(config_ms(100)).unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(lock.record_activity(ActivityKind::KeyDown));

        sleep(Duration::from_millis(60)).await;
        assert_eq!(lock.state(), SessionLockState::Active);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(lock.state(), SessionLockState::Locked);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_while_locked_is_ignored_until_resume() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        sleep(Duration::from_millis(150)).await;
        assert!(lock.is_locked());

        assert!(!lock.record_activity(ActivityKind::PointerMove));
        assert!(lock.is_locked());

        assert!(lock.resume());
        assert_eq!(lock.state(), SessionLockState::Active);
        assert!(lock.deadline().is_some());

        sleep(Duration::from_millis(150)).await;
        assert!(lock.is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_while_active_is_noop() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        let mut events = lock.notifications();

        assert!(!lock.resume());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_activity_locks_once() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        let mut events = lock.notifications();

        for _ in 0..500 {
            lock.record_activity(ActivityKind::Scroll);
        }
        sleep(Duration::from_millis(300)).await;

        match events.try_recv() {
            Ok(LockEvent::Locked { session_id, title, .. }) => {
                assert_eq!(session_id, lock.session_id());
                assert_eq!(title, "Session Locked");
            }
            other => panic!("expected a lock event, got {other:?}"),
        }
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_channel_reports_transitions() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        let mut state = lock.subscribe();
        assert_eq!(*state.borrow(), SessionLockState::Active);

        state.changed().await.unwrap();
        assert_eq!(*state.borrow_and_update(), SessionLockState::Locked);

        lock.resume();
        state.changed().await.unwrap();
        assert_eq!(*state.borrow_and_update(), SessionLockState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_emits_event() {
        let lock = SessionLock::start(config_ms(100)).unwrap();
        let mut events = lock.notifications();
        sleep(Duration::from_millis(120)).await;
        lock.resume();

        assert!(matches!(events.try_recv(), Ok(LockEvent::Locked { .. })));
        assert!(matches!(events.try_recv(), Ok(LockEvent::Resumed { .. })));
    }

    #[test]
    fn start_without_runtime_is_an_error() {
        let result = SessionLock::start(SessionConfig::default());
        assert!(matches!(result, Err(LedgerguardError::Runtime(_))));
    }
}
