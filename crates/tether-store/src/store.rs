//! Session storage implementation.
//!
//! Provides a SQLite-backed upsert store keyed by client identity. All
//! writes are partial: a [`SessionPatch`] names only the fields it wants
//! to touch, and the adapter refuses to replace a non-empty stored
//! credential blob with an empty one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::warn;

use tether_core::{CredentialBlob, SessionRecord};

/// Errors that can occur during session storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage path error: {0}")]
    PathError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A partial update to a session record.
///
/// Only fields that are `Some` are written; everything else keeps its
/// stored value.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New credential material. An empty blob never replaces a non-empty
    /// stored one (the driver reports empty credentials during teardown).
    pub credential_blob: Option<CredentialBlob>,
    /// New scan artifact; also stamps `last_qr_generated_at`.
    pub qr_artifact: Option<String>,
    /// New readiness flag.
    pub is_ready: Option<bool>,
    /// When the session became ready.
    pub ready_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch writing credential material.
    pub fn credentials(blob: CredentialBlob) -> Self {
        Self {
            credential_blob: Some(blob),
            ..Default::default()
        }
    }

    /// Patch writing a fresh scan artifact.
    pub fn qr(artifact: impl Into<String>) -> Self {
        Self {
            qr_artifact: Some(artifact.into()),
            ..Default::default()
        }
    }

    /// Patch marking the session ready.
    pub fn ready(at: DateTime<Utc>) -> Self {
        Self {
            is_ready: Some(true),
            ready_at: Some(at),
            ..Default::default()
        }
    }
}

/// Session storage trait for abstraction over storage backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a record by client identity.
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<SessionRecord>>;

    /// Apply a partial update, creating the record if it does not exist.
    /// Returns the record as stored after the write.
    async fn upsert(&self, client_id: &str, patch: SessionPatch) -> Result<SessionRecord>;

    /// Delete a record by client identity.
    async fn delete_by_client_id(&self, client_id: &str) -> Result<()>;

    /// List every stored record.
    async fn list(&self) -> Result<Vec<SessionRecord>>;
}

/// SQLite-backed session storage.
pub struct SqliteSessionStore {
    /// Database connection (wrapped in mutex for thread safety).
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Create a new SQLite session store.
    ///
    /// Creates the database and runs migrations if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let db_path = base_dir.join("sessions.db");
        let conn = Connection::open(&db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.run_migrations()?;

        Ok(store)
    }

    /// Open store at the default data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = default_data_dir()?;
        Self::new(data_dir)
    }

    /// Open an in-memory store. Useful for diagnostics and tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            let migration = include_str!("../migrations/001_initial.sql");
            conn.execute_batch(migration)?;
        }

        Ok(())
    }

    /// Parse datetime from SQLite string.
    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Format datetime for SQLite.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            client_id: row.get(0)?,
            credential_blob: row.get(1)?,
            qr_artifact: row.get(2)?,
            is_ready: row.get::<_, i64>(3)? != 0,
            ready_at: row.get(4)?,
            last_qr_generated_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Row image before JSON/timestamp decoding.
struct RawRecord {
    client_id: String,
    credential_blob: String,
    qr_artifact: Option<String>,
    is_ready: bool,
    ready_at: Option<String>,
    last_qr_generated_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn decode(self) -> Result<SessionRecord> {
        let credential_blob: CredentialBlob = serde_json::from_str(&self.credential_blob)?;
        Ok(SessionRecord {
            client_id: self.client_id,
            credential_blob,
            qr_artifact: self.qr_artifact,
            is_ready: self.is_ready,
            ready_at: self
                .ready_at
                .as_deref()
                .map(SqliteSessionStore::parse_datetime),
            last_qr_generated_at: self
                .last_qr_generated_at
                .as_deref()
                .map(SqliteSessionStore::parse_datetime),
            created_at: SqliteSessionStore::parse_datetime(&self.created_at),
            updated_at: SqliteSessionStore::parse_datetime(&self.updated_at),
        })
    }
}

const SELECT_FIELDS: &str = "client_id, credential_blob, qr_artifact, is_ready, \
     ready_at, last_qr_generated_at, created_at, updated_at";

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().unwrap();

        let raw = conn
            .query_row(
                &format!("SELECT {SELECT_FIELDS} FROM sessions WHERE client_id = ?1"),
                params![client_id],
                Self::row_to_record,
            )
            .optional()?;

        raw.map(RawRecord::decode).transpose()
    }

    async fn upsert(&self, client_id: &str, patch: SessionPatch) -> Result<SessionRecord> {
        let conn = self.conn.lock().unwrap();

        let existing = conn
            .query_row(
                &format!("SELECT {SELECT_FIELDS} FROM sessions WHERE client_id = ?1"),
                params![client_id],
                Self::row_to_record,
            )
            .optional()?
            .map(RawRecord::decode)
            .transpose()?;

        let mut record = existing.unwrap_or_else(|| SessionRecord::new(client_id));

        if let Some(blob) = patch.credential_blob {
            if blob.is_empty() && !record.credential_blob.is_empty() {
                // Never replace good stored credentials with nothing.
                warn!(
                    client_id,
                    "refusing to overwrite stored credentials with an empty blob"
                );
            } else {
                record.credential_blob = blob;
            }
        }

        if let Some(artifact) = patch.qr_artifact {
            record.qr_artifact = Some(artifact);
            record.last_qr_generated_at = Some(Utc::now());
        }

        if let Some(ready) = patch.is_ready {
            record.is_ready = ready;
        }

        if let Some(at) = patch.ready_at {
            record.ready_at = Some(at);
        }

        record.updated_at = Utc::now();

        let blob_json = serde_json::to_string(&record.credential_blob)?;

        conn.execute(
            r#"
            INSERT INTO sessions (
                client_id, credential_blob, qr_artifact, is_ready,
                ready_at, last_qr_generated_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(client_id) DO UPDATE SET
                credential_blob = excluded.credential_blob,
                qr_artifact = excluded.qr_artifact,
                is_ready = excluded.is_ready,
                ready_at = excluded.ready_at,
                last_qr_generated_at = excluded.last_qr_generated_at,
                updated_at = excluded.updated_at
            "#,
            params![
                record.client_id,
                blob_json,
                record.qr_artifact,
                record.is_ready as i64,
                record.ready_at.as_ref().map(Self::format_datetime),
                record
                    .last_qr_generated_at
                    .as_ref()
                    .map(Self::format_datetime),
                Self::format_datetime(&record.created_at),
                Self::format_datetime(&record.updated_at),
            ],
        )?;

        Ok(record)
    }

    async fn delete_by_client_id(&self, client_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let rows = conn.execute(
            "DELETE FROM sessions WHERE client_id = ?1",
            params![client_id],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(client_id.to_string()));
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FIELDS} FROM sessions ORDER BY updated_at DESC"
        ))?;

        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.decode()?);
        }
        Ok(records)
    }
}

/// Default data directory for the session database.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join("tether"))
        .ok_or_else(|| StoreError::PathError("Could not find data directory".into()))
}
