//! Credential capture sink.
//!
//! Credentials show up from four places at unpredictable times: the
//! pre-start hydration, the driver's post-restore confirmation, its
//! explicit save hook, and the best-effort reconstruction at Ready time.
//! The sink normalizes all of them into one canonical in-memory slot and
//! immediately offers each accepted blob to the persistence gate.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use tether_core::CredentialBlob;

use crate::gate::{PersistTrigger, PersistenceGate};

/// Where a credential blob came from. All sources are equally
/// authoritative; the driver does not disambiguate which is most current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Stored record loaded before the driver started.
    Hydration,
    /// Driver confirmed a restored session.
    Restore,
    /// Driver's explicit save hook.
    SaveHook,
    /// Best-effort reconstruction at the Ready transition.
    Reconstruction,
}

impl std::fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureSource::Hydration => f.write_str("hydration"),
            CaptureSource::Restore => f.write_str("restore"),
            CaptureSource::SaveHook => f.write_str("save-hook"),
            CaptureSource::Reconstruction => f.write_str("reconstruction"),
        }
    }
}

/// The latest normalized credential blob seen from any source.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    pub blob: Option<CredentialBlob>,
}

pub struct CaptureSink {
    buffer: Arc<Mutex<CaptureBuffer>>,
    gate: Arc<PersistenceGate>,
}

impl CaptureSink {
    pub fn new(buffer: Arc<Mutex<CaptureBuffer>>, gate: Arc<PersistenceGate>) -> Self {
        Self { buffer, gate }
    }

    /// Accept a credential blob from any source.
    ///
    /// Empty or absent blobs are dropped silently (the driver emits them
    /// during teardown). A non-empty blob replaces the buffer
    /// unconditionally - last write wins - and is offered to the gate.
    pub async fn capture(&self, source: CaptureSource, blob: Option<CredentialBlob>) {
        let blob = match blob {
            Some(blob) if !blob.is_empty() => blob,
            _ => {
                warn!(%source, "dropping empty credential capture");
                return;
            }
        };

        debug!(%source, keys = blob.len(), "credential capture accepted");
        self.buffer.lock().blob = Some(blob.clone());
        self.gate.persist(PersistTrigger::Event, Some(blob)).await;
    }

    /// Current buffered blob, if any.
    pub fn latest(&self) -> Option<CredentialBlob> {
        self.buffer.lock().blob.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blob, CountingStore};
    use std::time::Duration;
    use tempfile::TempDir;
    use tether_core::DEFAULT_CLIENT_ID;
    use tether_store::{SessionStore, SqliteSessionStore};

    fn new_sink() -> (CaptureSink, Arc<CountingStore>, TempDir) {
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
        (CaptureSink::new(buffer, gate), store, tmp)
    }

    #[tokio::test]
    async fn test_empty_capture_is_dropped() {
        let (sink, store, _tmp) = new_sink();

        sink.capture(CaptureSource::SaveHook, None).await;
        sink.capture(CaptureSource::SaveHook, Some(CredentialBlob::new()))
            .await;

        assert!(sink.latest().is_none());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_capture_persists_and_buffers() {
        let (sink, store, _tmp) = new_sink();

        let creds = blob(&[("wa_token", "abc")]);
        sink.capture(CaptureSource::Restore, Some(creds.clone()))
            .await;

        assert_eq!(sink.latest(), Some(creds.clone()));
        assert_eq!(store.writes(), 1);
        let record = store
            .find_by_client_id(DEFAULT_CLIENT_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.credential_blob, creds);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins_across_sources() {
        let (sink, store, _tmp) = new_sink();

        sink.capture(CaptureSource::Hydration, Some(blob(&[("wa_token", "old")])))
            .await;
        sink.capture(
            CaptureSource::Reconstruction,
            Some(blob(&[("wa_token", "new")])),
        )
        .await;

        // Both landed in one throttle window: one write, newest value buffered.
        assert_eq!(store.writes(), 1);
        assert_eq!(sink.latest(), Some(blob(&[("wa_token", "new")])));
    }
}
