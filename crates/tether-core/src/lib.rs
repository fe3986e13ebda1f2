//! # tether-core
//!
//! Core types and abstractions for Tether - the restart-surviving messaging
//! session keeper.
//!
//! This crate provides:
//! - Session record and credential blob primitives
//! - Lifecycle state and driver event types
//! - The external driver trait
//! - Configuration system
//! - Common error types

pub mod config;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod record;

pub use config::Config;
pub use driver::SessionDriver;
pub use error::{DriverError, Error, Result};
pub use lifecycle::{Connectivity, DriverEvent, LifecycleState};
pub use record::{CredentialBlob, SessionRecord, DEFAULT_CLIENT_ID};
