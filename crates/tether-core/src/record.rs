//! Durable session record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The client identity used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Opaque credential material produced by the external driver.
///
/// The driver decides what goes in here; this subsystem never validates it
/// beyond "non-empty". Keys are kept ordered so two blobs with the same
/// content serialize identically, which makes persisted writes idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBlob(BTreeMap<String, serde_json::Value>);

impl CredentialBlob {
    /// Create an empty blob.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the blob carries any material at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keys in the blob.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insert a key/value pair.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl FromIterator<(String, serde_json::Value)> for CredentialBlob {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One durable record per client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Logical name distinguishing one managed session from another.
    pub client_id: String,
    /// Last known credential material; may be partially populated.
    pub credential_blob: CredentialBlob,
    /// Most recent scan artifact (opaque encoded image).
    pub qr_artifact: Option<String>,
    /// True once the external session reached a fully operable state.
    pub is_ready: bool,
    /// When the session last became ready.
    pub ready_at: Option<DateTime<Utc>>,
    /// When the last scan artifact was generated.
    pub last_qr_generated_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh record for a client identity.
    pub fn new(client_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            client_id: client_id.into(),
            credential_blob: CredentialBlob::new(),
            qr_artifact: None,
            is_ready: false,
            ready_at: None,
            last_qr_generated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_roundtrip_is_stable() {
        let mut blob = CredentialBlob::new();
        blob.insert("wa_token", json!("abc123"));
        blob.insert("browser_id", json!({"id": 7}));

        let a = serde_json::to_string(&blob).unwrap();
        let parsed: CredentialBlob = serde_json::from_str(&a).unwrap();
        let b = serde_json::to_string(&parsed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_blob() {
        let blob = CredentialBlob::new();
        assert!(blob.is_empty());
        assert_eq!(blob.len(), 0);
    }

    #[test]
    fn test_new_record_defaults() {
        let record = SessionRecord::new(DEFAULT_CLIENT_ID);
        assert_eq!(record.client_id, "default");
        assert!(!record.is_ready);
        assert!(record.credential_blob.is_empty());
        assert!(record.qr_artifact.is_none());
    }
}
