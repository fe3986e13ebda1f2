//! Lifecycle state and driver event types.

use serde::{Deserialize, Serialize};

use crate::record::CredentialBlob;

/// Coarse connectivity state of the running session.
///
/// Process-local: created at process start, mutated only by the lifecycle
/// state machine, destroyed on process exit. The store only ever sees the
/// derived ready flag and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Nothing has happened yet
    Uninitialized,
    /// A fresh handshake (scan) is required
    AwaitingScan,
    /// The driver reported an authenticated handshake, not yet interactive
    Authenticating,
    /// The session is fully operable
    Ready,
    /// The session reported a non-connected state while it was ready
    Degraded,
    /// The session dropped or the handshake failed
    Disconnected,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::AwaitingScan => "awaiting-scan",
            LifecycleState::Authenticating => "authenticating",
            LifecycleState::Ready => "ready",
            LifecycleState::Degraded => "degraded",
            LifecycleState::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity as reported by the driver's own state-change signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Opening,
    Pairing,
    Unpaired,
    Timeout,
    /// A state name this subsystem does not interpret.
    Other(String),
}

impl Connectivity {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connectivity::Connected)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Connected => f.write_str("connected"),
            Connectivity::Opening => f.write_str("opening"),
            Connectivity::Pairing => f.write_str("pairing"),
            Connectivity::Unpaired => f.write_str("unpaired"),
            Connectivity::Timeout => f.write_str("timeout"),
            Connectivity::Other(name) => f.write_str(name),
        }
    }
}

/// Lifecycle signals emitted by the external driver.
///
/// Delivery order is whatever the driver produces; the state machine is the
/// single place these are reconciled.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// A new scan code was generated; payload is the raw code.
    ScanCode(String),
    /// The handshake succeeded; the driver may attach a credential snapshot.
    Authenticated(Option<CredentialBlob>),
    /// The driver confirms the session is fully operable.
    Ready,
    /// The handshake failed.
    AuthFailure(String),
    /// The session dropped.
    Disconnected(String),
    /// The driver's own connectivity state changed.
    ConnectivityChanged(Connectivity),
    /// Any inbound activity; used only as an opportunistic persistence trigger.
    Activity,
}
