//! Recovery poller.
//!
//! Two independent timers, started only after the state machine first
//! reaches Ready (probing an unauthenticated driver produces noisy,
//! misleading failures):
//!
//! - a liveness timer that asks the driver for its connectivity state and
//!   goes quiet once the session is terminally gone, and
//! - a forced-save timer that re-triggers persistence as a safety net for
//!   missed event-driven captures.
//!
//! Both run for the lifetime of the process; their handles are aborted
//! only when the poller itself is dropped at shutdown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use tether_core::SessionDriver;

use crate::context::SessionContext;
use crate::gate::{PersistTrigger, PersistenceGate};

pub struct RecoveryPoller {
    driver: Arc<dyn SessionDriver>,
    ctx: Arc<SessionContext>,
    gate: Arc<PersistenceGate>,
    liveness_interval: Duration,
    forced_save_interval: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RecoveryPoller {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        ctx: Arc<SessionContext>,
        gate: Arc<PersistenceGate>,
        liveness_interval: Duration,
        forced_save_interval: Duration,
    ) -> Self {
        Self {
            driver,
            ctx,
            gate,
            liveness_interval,
            forced_save_interval,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start both timers. Idempotent: the context hands out the start
    /// claim exactly once.
    pub fn start(self: &Arc<Self>) {
        if !self.ctx.try_start_poller() {
            return;
        }

        info!(
            liveness_secs = self.liveness_interval.as_secs(),
            forced_save_secs = self.forced_save_interval.as_secs(),
            "recovery poller started"
        );

        let liveness = {
            let poller = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick = interval(poller.liveness_interval);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    poller.liveness_pass().await;
                }
            })
        };

        let forced_save = {
            let poller = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick = interval(poller.forced_save_interval);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    poller.forced_save_pass().await;
                }
            })
        };

        self.handles.lock().extend([liveness, forced_save]);
    }

    /// One liveness probe. A terminal failure flips the closed flag and
    /// turns every later tick into a no-op without stopping the timer;
    /// anything else is transient and retried next tick.
    async fn liveness_pass(&self) {
        if self.ctx.is_closed() {
            return;
        }

        match self.driver.connectivity().await {
            Ok(state) => {
                debug!(%state, "liveness probe");
            }
            Err(err) if err.is_terminal() => {
                warn!(%err, "driver session closed; suppressing further probes");
                self.ctx.mark_closed();
            }
            Err(err) => {
                debug!(%err, "transient liveness failure; will retry");
            }
        }
    }

    /// One forced persistence pass, still subject to the gate's rate limit.
    async fn forced_save_pass(&self) {
        if !self.ctx.is_ready() || self.ctx.is_closed() {
            return;
        }
        self.gate.persist(PersistTrigger::Forced, None).await;
    }
}

impl Drop for RecoveryPoller {
    fn drop(&mut self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureBuffer;
    use crate::testutil::{blob, CountingStore, MockDriver};
    use chrono::Utc;
    use tempfile::TempDir;
    use tether_core::{Connectivity, DriverError, DEFAULT_CLIENT_ID};
    use tether_store::{SessionStore, SqliteSessionStore};

    struct Fixture {
        poller: Arc<RecoveryPoller>,
        driver: Arc<MockDriver>,
        ctx: Arc<SessionContext>,
        store: Arc<CountingStore>,
        buffer: Arc<Mutex<CaptureBuffer>>,
        _tmp: TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(CountingStore::new(
            SqliteSessionStore::new(tmp.path()).unwrap(),
        ));
        let buffer = Arc::new(Mutex::new(CaptureBuffer::default()));
        let gate = Arc::new(PersistenceGate::new(
            store.clone(),
            DEFAULT_CLIENT_ID,
            Duration::from_secs(5),
            Duration::from_secs(30),
            buffer.clone(),
        ));
        let ctx = Arc::new(SessionContext::new(DEFAULT_CLIENT_ID));
        let driver = Arc::new(MockDriver::default());
        let poller = Arc::new(RecoveryPoller::new(
            driver.clone(),
            ctx.clone(),
            gate,
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        Fixture {
            poller,
            driver,
            ctx,
            store,
            buffer,
            _tmp: tmp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failure_short_circuits_probing() {
        let fx = fixture();
        fx.ctx.mark_ready(Utc::now());
        fx.driver.push_connectivity(Err(DriverError::SessionClosed {
            message: "Protocol error: Session closed.".into(),
        }));

        fx.poller.start();
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(fx.ctx.is_closed());
        let probes_after_close = fx.driver.probe_count();

        // Later ticks perform no driver call.
        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(fx.driver.probe_count(), probes_after_close);

        // A terminal liveness failure does not, by itself, demote readiness.
        assert!(fx.ctx.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_keeps_probing() {
        let fx = fixture();
        fx.ctx.mark_ready(Utc::now());
        fx.driver
            .push_connectivity(Err(DriverError::probe("navigation timeout")));
        fx.driver.push_connectivity(Ok(Connectivity::Connected));

        // Let the timers register and fire their immediate first tick
        // before advancing to the second.
        fx.poller.start();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(!fx.ctx.is_closed());
        assert!(fx.driver.probe_count() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_save_persists_buffered_credentials() {
        let fx = fixture();
        fx.ctx.mark_ready(Utc::now());
        fx.buffer.lock().blob = Some(blob(&[("wa_token", "abc")]));

        fx.poller.start();
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert!(fx.store.writes() >= 1);
        let record = fx
            .store
            .find_by_client_id(DEFAULT_CLIENT_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.credential_blob, blob(&[("wa_token", "abc")]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_save_skipped_when_not_ready() {
        let fx = fixture();
        fx.buffer.lock().blob = Some(blob(&[("wa_token", "abc")]));
        // Claim the start without marking ready.
        fx.poller.start();

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(fx.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let fx = fixture();
        fx.poller.start();
        fx.poller.start();
        assert_eq!(fx.poller.handles.lock().len(), 2);
    }
}
