//! Engine facade.
//!
//! Assembles the capture sink, persistence gate, state machine, recovery
//! poller, and bootstrap sequencer around one session context, and exposes
//! the small surface the host (driver wiring, API layer) consumes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tether_core::{Config, CredentialBlob, DriverEvent, LifecycleState, SessionDriver};
use tether_store::{SessionStore, StoreError};

use crate::bootstrap::BootstrapSequencer;
use crate::capture::{CaptureBuffer, CaptureSink, CaptureSource};
use crate::context::SessionContext;
use crate::gate::PersistenceGate;
use crate::machine::LifecycleMachine;
use crate::poller::RecoveryPoller;
use crate::{EngineError, Result};

pub struct SessionEngine {
    ctx: Arc<SessionContext>,
    store: Arc<dyn SessionStore>,
    driver: Arc<dyn SessionDriver>,
    sink: Arc<CaptureSink>,
    machine: LifecycleMachine,
    bootstrap: BootstrapSequencer,
    ready_grace: Duration,
    wait_timeout_secs: u64,
}

impl SessionEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn SessionStore>,
        driver: Arc<dyn SessionDriver>,
    ) -> Self {
        let ctx = Arc::new(SessionContext::new(config.session.client_id.clone()));

        let buffer = Arc::new(Mutex::new(CaptureBuffer::default()));
        let gate = Arc::new(PersistenceGate::new(
            store.clone(),
            config.session.client_id.clone(),
            Duration::from_secs(config.persistence.event_spacing_secs),
            Duration::from_secs(config.persistence.forced_spacing_secs),
            buffer.clone(),
        ));
        let sink = Arc::new(CaptureSink::new(buffer, gate.clone()));

        let poller = Arc::new(RecoveryPoller::new(
            driver.clone(),
            ctx.clone(),
            gate.clone(),
            Duration::from_secs(config.poller.liveness_secs),
            Duration::from_secs(config.poller.forced_save_secs),
        ));

        let machine = LifecycleMachine::new(
            ctx.clone(),
            store.clone(),
            driver.clone(),
            sink.clone(),
            gate,
            poller,
        );

        let bootstrap = BootstrapSequencer::new(
            store.clone(),
            ctx.clone(),
            sink.clone(),
            config.session.scratch_dir.clone(),
        );

        Self {
            ctx,
            store,
            driver,
            sink,
            machine,
            bootstrap,
            ready_grace: Duration::from_secs(config.readiness.grace_secs),
            wait_timeout_secs: config.readiness.wait_timeout_secs,
        }
    }

    /// Create the event channel the driver wiring feeds.
    pub fn event_channel(capacity: usize) -> (mpsc::Sender<DriverEvent>, mpsc::Receiver<DriverEvent>) {
        mpsc::channel(capacity)
    }

    /// Run the bootstrap sequence. Must happen before the driver starts;
    /// the return value is the pre-start hydration blob.
    pub async fn bootstrap(&self) -> Option<CredentialBlob> {
        self.bootstrap.hydrate().await
    }

    /// Consume driver events until the channel closes.
    pub async fn run(&self, mut events: mpsc::Receiver<DriverEvent>) {
        while let Some(event) = events.recv().await {
            self.machine.handle_event(event).await;
        }
        info!("driver event channel closed; engine loop exiting");
    }

    pub fn client_id(&self) -> &str {
        self.ctx.client_id()
    }

    pub fn state(&self) -> LifecycleState {
        self.ctx.state()
    }

    pub fn is_ready(&self) -> bool {
        self.ctx.is_ready()
    }

    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.ctx.ready_at()
    }

    /// Most recent scan artifact, falling back to the store when the
    /// in-memory copy is gone (e.g. after a restart).
    pub async fn last_qr(&self) -> Option<String> {
        if let Some(artifact) = self.ctx.last_qr() {
            return Some(artifact);
        }
        match self.store.find_by_client_id(self.ctx.client_id()).await {
            Ok(Some(record)) => record.qr_artifact,
            Ok(None) => None,
            Err(err) => {
                warn!(%err, "store read failed while fetching scan artifact");
                None
            }
        }
    }

    /// Block until the session is ready, then honor the grace period the
    /// driver needs between its ready signal and actually being usable.
    ///
    /// Bounded: fails with [`EngineError::ReadyTimeout`] instead of
    /// spinning forever.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let bound = Duration::from_secs(self.wait_timeout_secs);
        tokio::time::timeout(bound, self.ctx.ready_signal())
            .await
            .map_err(|_| EngineError::ReadyTimeout(self.wait_timeout_secs))?;

        if let Some(at) = self.ctx.ready_at() {
            let grace = chrono::Duration::from_std(self.ready_grace)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
            let elapsed = Utc::now().signed_duration_since(at);
            if elapsed < grace {
                let remaining = (grace - elapsed).to_std().unwrap_or_default();
                tokio::time::sleep(remaining).await;
            }
        }

        Ok(())
    }

    /// The driver's save-credentials override point.
    pub async fn save_credentials(&self, blob: Option<CredentialBlob>) {
        self.sink.capture(CaptureSource::SaveHook, blob).await;
    }

    /// The driver's load-credentials override point: in-memory buffer
    /// first, stored record second.
    pub async fn load_credentials(&self) -> Option<CredentialBlob> {
        if let Some(blob) = self.sink.latest() {
            return Some(blob);
        }
        match self.store.find_by_client_id(self.ctx.client_id()).await {
            Ok(Some(record)) if !record.credential_blob.is_empty() => {
                Some(record.credential_blob)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(%err, "store read failed while loading credentials");
                None
            }
        }
    }

    /// Stop the driver session and delete the stored record.
    pub async fn force_logout(&self) -> Result<()> {
        if let Err(err) = self.driver.logout().await {
            warn!(%err, "driver logout failed; deleting stored session anyway");
        }

        match self.store.delete_by_client_id(self.ctx.client_id()).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        self.ctx.clear_ready();
        self.ctx.set_state(LifecycleState::Disconnected);
        info!(client_id = self.ctx.client_id(), "session logged out");
        Ok(())
    }
}
