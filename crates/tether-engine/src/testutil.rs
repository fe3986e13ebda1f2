//! Shared test fixtures: a scriptable driver and counting/failing stores.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use tether_core::{Connectivity, CredentialBlob, DriverError, SessionDriver, SessionRecord};
use tether_store::{SessionPatch, SessionStore, SqliteSessionStore, StoreError};

/// Build a credential blob from string pairs.
pub fn blob(pairs: &[(&str, &str)]) -> CredentialBlob {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

/// A driver whose probe results are scripted per call.
#[derive(Default)]
pub struct MockDriver {
    connectivity: Mutex<VecDeque<Result<Connectivity, DriverError>>>,
    snapshot: Mutex<Option<CredentialBlob>>,
    probe_count: AtomicUsize,
    logout_count: AtomicUsize,
}

impl MockDriver {
    pub fn push_connectivity(&self, result: Result<Connectivity, DriverError>) {
        self.connectivity.lock().push_back(result);
    }

    pub fn set_snapshot(&self, snapshot: Option<CredentialBlob>) {
        *self.snapshot.lock() = snapshot;
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logout_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDriver for MockDriver {
    async fn connectivity(&self) -> Result<Connectivity, DriverError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        self.connectivity
            .lock()
            .pop_front()
            .unwrap_or(Ok(Connectivity::Connected))
    }

    async fn snapshot_credentials(&self) -> Result<Option<CredentialBlob>, DriverError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn logout(&self) -> Result<(), DriverError> {
        self.logout_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wraps a real store and counts successful upserts.
pub struct CountingStore {
    inner: SqliteSessionStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: SqliteSessionStore) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.find_by_client_id(client_id).await
    }

    async fn upsert(
        &self,
        client_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        let record = self.inner.upsert(client_id, patch).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<(), StoreError> {
        self.inner.delete_by_client_id(client_id).await
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.inner.list().await
    }
}

/// Counting store whose writes yield first, widening task interleavings.
pub struct SlowStore {
    inner: CountingStore,
}

impl SlowStore {
    pub fn new(inner: SqliteSessionStore) -> Self {
        Self {
            inner: CountingStore::new(inner),
        }
    }

    pub fn writes(&self) -> usize {
        self.inner.writes()
    }
}

#[async_trait]
impl SessionStore for SlowStore {
    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.find_by_client_id(client_id).await
    }

    async fn upsert(
        &self,
        client_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        tokio::task::yield_now().await;
        self.inner.upsert(client_id, patch).await
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<(), StoreError> {
        self.inner.delete_by_client_id(client_id).await
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.inner.list().await
    }
}

/// A store that errors on everything until healed.
#[derive(Default)]
pub struct FailingStore {
    healed: AtomicBool,
    inner: Mutex<Option<SessionRecord>>,
    writes: AtomicUsize,
}

impl FailingStore {
    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.healed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::PathError("store unavailable".into()))
        }
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn find_by_client_id(
        &self,
        _client_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().clone())
    }

    async fn upsert(
        &self,
        client_id: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        self.check()?;
        let mut guard = self.inner.lock();
        let mut record = guard
            .clone()
            .unwrap_or_else(|| SessionRecord::new(client_id));
        if let Some(blob) = patch.credential_blob {
            if !(blob.is_empty() && !record.credential_blob.is_empty()) {
                record.credential_blob = blob;
            }
        }
        if let Some(artifact) = patch.qr_artifact {
            record.qr_artifact = Some(artifact);
            record.last_qr_generated_at = Some(chrono::Utc::now());
        }
        if let Some(ready) = patch.is_ready {
            record.is_ready = ready;
        }
        if let Some(at) = patch.ready_at {
            record.ready_at = Some(at);
        }
        *guard = Some(record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<(), StoreError> {
        self.check()?;
        if self.inner.lock().take().is_none() {
            return Err(StoreError::NotFound(client_id.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().clone().into_iter().collect())
    }
}
