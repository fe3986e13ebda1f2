//! Shared per-identity session context.
//!
//! One explicit context per client identity holds the readiness flag, last
//! scan artifact, and lifecycle state. It is created by the engine and
//! shared by reference with the state machine, poller, and API layer, so
//! nothing here lives in process-wide globals.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use tether_core::LifecycleState;

pub struct SessionContext {
    client_id: String,
    state: Mutex<LifecycleState>,
    ready_at: Mutex<Option<DateTime<Utc>>>,
    last_qr: Mutex<Option<String>>,
    session_closed: AtomicBool,
    poller_started: AtomicBool,
    ready_notify: Notify,
}

impl SessionContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            state: Mutex::new(LifecycleState::Uninitialized),
            ready_at: Mutex::new(None),
            last_qr: Mutex::new(None),
            session_closed: AtomicBool::new(false),
            poller_started: AtomicBool::new(false),
            ready_notify: Notify::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: LifecycleState) {
        *self.state.lock() = state;
    }

    /// Whether the session is fully operable right now.
    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        *self.ready_at.lock()
    }

    /// Flip to Ready and wake anyone blocked in [`Self::ready_signal`].
    pub fn mark_ready(&self, at: DateTime<Utc>) {
        self.set_state(LifecycleState::Ready);
        *self.ready_at.lock() = Some(at);
        self.ready_notify.notify_waiters();
    }

    /// Drop the local ready flag. Never touches the store.
    pub fn clear_ready(&self) {
        *self.ready_at.lock() = None;
    }

    /// Resolves once the session is ready. Safe against the notify firing
    /// between the flag check and the await.
    pub async fn ready_signal(&self) {
        loop {
            if self.is_ready() {
                return;
            }
            let notified = self.ready_notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    pub fn last_qr(&self) -> Option<String> {
        self.last_qr.lock().clone()
    }

    pub fn set_last_qr(&self, artifact: String) {
        *self.last_qr.lock() = Some(artifact);
    }

    /// Whether the underlying driver session is gone for good.
    pub fn is_closed(&self) -> bool {
        self.session_closed.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.session_closed.store(true, Ordering::SeqCst);
    }

    /// Claim the right to start the recovery poller. Returns true exactly
    /// once per context.
    pub fn try_start_poller(&self) -> bool {
        self.poller_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn poller_started(&self) -> bool {
        self.poller_started.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let ctx = SessionContext::new("default");
        assert_eq!(ctx.state(), LifecycleState::Uninitialized);
        assert!(!ctx.is_ready());
        assert!(ctx.ready_at().is_none());
        assert!(!ctx.is_closed());
    }

    #[test]
    fn test_mark_and_clear_ready() {
        let ctx = SessionContext::new("default");
        ctx.mark_ready(Utc::now());
        assert!(ctx.is_ready());
        assert!(ctx.ready_at().is_some());

        ctx.set_state(LifecycleState::Disconnected);
        ctx.clear_ready();
        assert!(!ctx.is_ready());
        assert!(ctx.ready_at().is_none());
    }

    #[test]
    fn test_poller_start_claimed_once() {
        let ctx = SessionContext::new("default");
        assert!(ctx.try_start_poller());
        assert!(!ctx.try_start_poller());
        assert!(ctx.poller_started());
    }

    #[tokio::test]
    async fn test_ready_signal_resolves_when_already_ready() {
        let ctx = SessionContext::new("default");
        ctx.mark_ready(Utc::now());
        // Must not hang.
        ctx.ready_signal().await;
    }
}
