//! The external driver trait.
//!
//! The driver is the browser-automation client that owns the actual
//! messaging protocol session. It is opaque to this subsystem: lifecycle
//! events arrive on a channel the host wires up, and the engine only ever
//! calls back into the driver through this trait.

use async_trait::async_trait;

use crate::error::DriverError;
use crate::lifecycle::Connectivity;
use crate::record::CredentialBlob;

/// Calls the core makes into the external driver.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Ask the driver for its current connectivity state.
    ///
    /// Used by the liveness poller. An error whose [`DriverError::is_terminal`]
    /// is true means the underlying process is gone and further probing is
    /// pointless.
    async fn connectivity(&self) -> Result<Connectivity, DriverError>;

    /// Best-effort reconstruction of the current credential material.
    ///
    /// Invoked once at the Ready transition as a safety net for drivers that
    /// never call the explicit save hook. `Ok(None)` is a normal outcome.
    async fn snapshot_credentials(&self) -> Result<Option<CredentialBlob>, DriverError>;

    /// Terminate the external session.
    async fn logout(&self) -> Result<(), DriverError>;
}
