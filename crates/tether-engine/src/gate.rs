//! Throttled persistence gate.
//!
//! Rate-limits credential writes to at most one per throttle window and
//! refuses destructive no-op writes: an empty capture never overwrites a
//! non-empty stored record. Store failures are logged and dropped; the
//! next trigger (event, poller tick, or activity hook) retries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use tether_core::CredentialBlob;
use tether_store::{SessionPatch, SessionStore};

use crate::capture::CaptureBuffer;

/// Which path asked for the write. Poller-driven passes get a wider
/// window so the forced-save timer cannot saturate the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTrigger {
    /// Driver event or capture hook (5s minimum spacing by default).
    Event,
    /// Recovery poller forced pass (30s by default).
    Forced,
}

pub struct PersistenceGate {
    store: Arc<dyn SessionStore>,
    client_id: String,
    event_spacing: Duration,
    forced_spacing: Duration,
    buffer: Arc<Mutex<CaptureBuffer>>,
    // Held across the whole write so concurrent triggers (the forced-save
    // poller runs on its own task) cannot both claim the same window.
    last_write: AsyncMutex<Option<Instant>>,
}

impl PersistenceGate {
    pub fn new(
        store: Arc<dyn SessionStore>,
        client_id: impl Into<String>,
        event_spacing: Duration,
        forced_spacing: Duration,
        buffer: Arc<Mutex<CaptureBuffer>>,
    ) -> Self {
        Self {
            store,
            client_id: client_id.into(),
            event_spacing,
            forced_spacing,
            buffer,
            last_write: AsyncMutex::new(None),
        }
    }

    /// Attempt a credential write.
    ///
    /// Resolution priority: explicit `blob` -> capture buffer -> nothing.
    /// Skipping (throttled, empty, or store failure) is not an error; the
    /// value stays in the buffer for the next allowed write. Concurrent
    /// callers are serialized: at most one write lands per window.
    pub async fn persist(&self, trigger: PersistTrigger, blob: Option<CredentialBlob>) {
        let spacing = match trigger {
            PersistTrigger::Event => self.event_spacing,
            PersistTrigger::Forced => self.forced_spacing,
        };

        let mut last_write = self.last_write.lock().await;
        if let Some(at) = *last_write {
            if at.elapsed() < spacing {
                debug!(?trigger, "persist skipped: inside throttle window");
                return;
            }
        }

        let resolved = blob.or_else(|| self.buffer.lock().blob.clone());

        let resolved = match resolved {
            Some(blob) if !blob.is_empty() => blob,
            _ => {
                // Nothing usable in hand. If the store already holds good
                // credentials, leave them alone; otherwise there is simply
                // nothing to save yet.
                match self.store.find_by_client_id(&self.client_id).await {
                    Ok(Some(record)) if !record.credential_blob.is_empty() => {
                        debug!("empty capture: store already holds credentials, skipping");
                    }
                    Ok(_) => {
                        warn!("no credential material available to persist");
                    }
                    Err(err) => {
                        warn!(%err, "store read failed while resolving empty capture");
                    }
                }
                return;
            }
        };

        match self
            .store
            .upsert(&self.client_id, SessionPatch::credentials(resolved))
            .await
        {
            Ok(record) => {
                *last_write = Some(Instant::now());
                debug!(
                    keys = record.credential_blob.len(),
                    "credentials persisted"
                );
            }
            Err(err) => {
                warn!(%err, "credential persist failed; will retry on next trigger");
            }
        }
    }
}
