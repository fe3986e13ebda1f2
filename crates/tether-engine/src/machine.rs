//! Lifecycle state machine.
//!
//! The single place driver signals are reconciled. Every trigger path
//! funnels through one transition table and one call-out to the
//! persistence gate, so the no-destructive-overwrite and throttle
//! invariants hold no matter which source fires first.
//!
//! The driver can report "authenticated" well before it is actually
//! interactive, so Authenticating is an explicit intermediate state and
//! only a ready event or a connected-state signal flips to Ready.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use tracing::{debug, info, warn};

use tether_core::{DriverEvent, LifecycleState, SessionDriver};
use tether_store::{SessionPatch, SessionStore};

use crate::capture::{CaptureSink, CaptureSource};
use crate::context::SessionContext;
use crate::gate::{PersistTrigger, PersistenceGate};
use crate::poller::RecoveryPoller;

/// Encode a raw scan payload into the opaque artifact stored alongside the
/// record. Rendering is someone else's problem; everything downstream
/// treats the artifact as an opaque string.
pub fn encode_scan_artifact(payload: &str) -> String {
    format!("data:text/plain;base64,{}", STANDARD.encode(payload))
}

pub struct LifecycleMachine {
    ctx: Arc<SessionContext>,
    store: Arc<dyn SessionStore>,
    driver: Arc<dyn SessionDriver>,
    sink: Arc<CaptureSink>,
    gate: Arc<PersistenceGate>,
    poller: Arc<RecoveryPoller>,
}

impl LifecycleMachine {
    pub fn new(
        ctx: Arc<SessionContext>,
        store: Arc<dyn SessionStore>,
        driver: Arc<dyn SessionDriver>,
        sink: Arc<CaptureSink>,
        gate: Arc<PersistenceGate>,
        poller: Arc<RecoveryPoller>,
    ) -> Self {
        Self {
            ctx,
            store,
            driver,
            sink,
            gate,
            poller,
        }
    }

    /// Apply one driver event. Never returns an error: failures become
    /// state transitions or logged no-ops.
    pub async fn handle_event(&self, event: DriverEvent) {
        match event {
            DriverEvent::ScanCode(payload) => self.on_scan_code(&payload).await,
            DriverEvent::Authenticated(snapshot) => self.on_authenticated(snapshot).await,
            DriverEvent::Ready => self.promote_ready("ready event").await,
            DriverEvent::ConnectivityChanged(state) => {
                if state.is_connected() {
                    self.promote_ready("connectivity signal").await;
                } else if self.ctx.state() == LifecycleState::Ready {
                    warn!(%state, "connectivity degraded while ready");
                    self.transition(LifecycleState::Degraded, "connectivity signal");
                } else {
                    debug!(%state, "connectivity change ignored");
                }
            }
            DriverEvent::AuthFailure(reason) => {
                // Log only: a transient handshake failure must not destroy a
                // possibly-valid stored record.
                warn!(%reason, "authentication failed");
                self.ctx.clear_ready();
                self.transition(LifecycleState::Disconnected, "auth failure");
            }
            DriverEvent::Disconnected(reason) => {
                warn!(%reason, "session disconnected");
                self.ctx.clear_ready();
                self.transition(LifecycleState::Disconnected, "disconnect event");
            }
            DriverEvent::Activity => {
                // Opportunistic refresh; the gate's throttle does the rest.
                self.gate.persist(PersistTrigger::Event, None).await;
            }
        }
    }

    async fn on_scan_code(&self, payload: &str) {
        if self.ctx.state() == LifecycleState::Ready {
            debug!("scan code while ready; ignoring");
            return;
        }

        let artifact = encode_scan_artifact(payload);
        self.ctx.set_last_qr(artifact.clone());
        self.transition(LifecycleState::AwaitingScan, "scan code");

        if let Err(err) = self
            .store
            .upsert(self.ctx.client_id(), SessionPatch::qr(artifact))
            .await
        {
            warn!(%err, "failed to persist scan artifact");
        }
    }

    async fn on_authenticated(&self, snapshot: Option<tether_core::CredentialBlob>) {
        if self.ctx.state() == LifecycleState::Ready {
            debug!("authenticated while already ready");
        } else {
            self.transition(LifecycleState::Authenticating, "authenticated event");
        }

        if snapshot.is_some() {
            self.sink.capture(CaptureSource::Restore, snapshot).await;
        }
    }

    /// Flip to Ready. Only trusted from Authenticating: Ready is never
    /// re-entered without a fresh handshake cycle.
    async fn promote_ready(&self, trigger: &str) {
        match self.ctx.state() {
            LifecycleState::Ready => {
                // Resumed sessions land here: bootstrap flipped the state
                // optimistically and the poller still has to come up.
                debug!(trigger, "already ready");
                self.poller.start();
                return;
            }
            LifecycleState::Authenticating => {}
            other => {
                debug!(trigger, state = %other, "ready signal ignored outside authentication");
                return;
            }
        }

        let now = Utc::now();
        self.ctx.mark_ready(now);
        info!(trigger, "session ready");

        if let Err(err) = self
            .store
            .upsert(self.ctx.client_id(), SessionPatch::ready(now))
            .await
        {
            warn!(%err, "failed to mark stored session ready");
        }

        // Safety net for drivers that never call the save hook.
        match self.driver.snapshot_credentials().await {
            Ok(snapshot) => {
                self.sink
                    .capture(CaptureSource::Reconstruction, snapshot)
                    .await;
            }
            Err(err) => debug!(%err, "credential reconstruction unavailable"),
        }

        self.gate.persist(PersistTrigger::Event, None).await;
        self.poller.start();
    }

    fn transition(&self, to: LifecycleState, trigger: &str) {
        let from = self.ctx.state();
        if from == to {
            return;
        }
        info!(%from, %to, trigger, "lifecycle transition");
        self.ctx.set_state(to);
    }
}
