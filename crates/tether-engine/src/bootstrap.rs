//! Bootstrap/restore sequencer.
//!
//! Runs once at process start, before the external driver is constructed:
//! clears stale scratch artifacts a crashed run may have left behind, then
//! hydrates the session context from the store so a previously
//! authenticated session resumes without a new handshake.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use tether_core::{CredentialBlob, LifecycleState};
use tether_store::SessionStore;

use crate::capture::{CaptureSink, CaptureSource};
use crate::context::SessionContext;

pub struct BootstrapSequencer {
    store: Arc<dyn SessionStore>,
    ctx: Arc<SessionContext>,
    sink: Arc<CaptureSink>,
    scratch_dir: Option<PathBuf>,
}

impl BootstrapSequencer {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ctx: Arc<SessionContext>,
        sink: Arc<CaptureSink>,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            ctx,
            sink,
            scratch_dir,
        }
    }

    /// Hydrate from the store. Returns the credential blob to hand to the
    /// driver's pre-start hook, or `None` when a fresh handshake (scan) is
    /// required. Never fails: a missing record or an unreachable store
    /// both mean "start fresh".
    pub async fn hydrate(&self) -> Option<CredentialBlob> {
        self.clear_scratch();

        let record = match self.store.find_by_client_id(self.ctx.client_id()).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, "store unavailable during bootstrap; starting fresh");
                None
            }
        };

        let Some(record) = record else {
            info!(
                client_id = self.ctx.client_id(),
                "no stored session; fresh handshake required"
            );
            self.ctx.set_state(LifecycleState::AwaitingScan);
            return None;
        };

        if let Some(artifact) = record.qr_artifact.clone() {
            self.ctx.set_last_qr(artifact);
        }

        if record.credential_blob.is_empty() {
            info!(
                client_id = self.ctx.client_id(),
                "stored record has no credentials; fresh handshake required"
            );
            self.ctx.set_state(LifecycleState::AwaitingScan);
            return None;
        }

        self.sink
            .capture(CaptureSource::Hydration, Some(record.credential_blob.clone()))
            .await;

        if record.is_ready {
            // Optimistic: the poller re-verifies once the driver is up.
            let at = record.ready_at.unwrap_or_else(chrono::Utc::now);
            self.ctx.mark_ready(at);
            info!(
                client_id = self.ctx.client_id(),
                "resuming previously ready session"
            );
        } else {
            self.ctx.set_state(LifecycleState::AwaitingScan);
        }

        Some(record.credential_blob)
    }

    /// Remove the scratch directory left by a previous run. Absence is not
    /// an error.
    fn clear_scratch(&self) {
        let Some(dir) = &self.scratch_dir else {
            return;
        };
        if !dir.exists() {
            return;
        }
        match std::fs::remove_dir_all(dir) {
            Ok(()) => info!(path = %dir.display(), "removed stale scratch directory"),
            Err(err) => warn!(%err, path = %dir.display(), "failed to remove scratch directory"),
        }
    }
}
