//! # tether-store
//!
//! Durable session storage for Tether.
//!
//! One key-value record per client identity: last known credential blob,
//! scan artifact, readiness flag and timestamps. Backed by SQLite.

pub mod store;

pub use store::{SessionPatch, SessionStore, SqliteSessionStore, StoreError};
