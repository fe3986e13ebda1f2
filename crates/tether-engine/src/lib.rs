//! # tether-engine
//!
//! The session lifecycle synchronization engine.
//!
//! Continuously reconciles three weakly-ordered signal sources - lifecycle
//! events from the external driver, a liveness poller, and ad-hoc capture
//! hooks - into a single authoritative, eventually-consistent store record,
//! while tolerating partial captures, duplicate saves, and the underlying
//! browser process dying mid-operation.
//!
//! Nothing in this crate raises to its caller from a trigger path: the
//! engine runs unattended and converts every failure into a state
//! transition or a logged no-op.

pub mod bootstrap;
pub mod capture;
pub mod context;
pub mod engine;
pub mod gate;
pub mod machine;
pub mod poller;

#[cfg(test)]
pub(crate) mod testutil;

use thiserror::Error;

pub use bootstrap::BootstrapSequencer;
pub use capture::{CaptureBuffer, CaptureSink, CaptureSource};
pub use context::SessionContext;
pub use engine::SessionEngine;
pub use gate::{PersistTrigger, PersistenceGate};
pub use machine::LifecycleMachine;
pub use poller::RecoveryPoller;

/// Errors surfaced at the engine's API boundary.
///
/// Trigger paths (events, poller ticks, capture hooks) never return these;
/// they absorb failures internally.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The session never became ready within the configured bound.
    #[error("Session not ready after {0}s")]
    ReadyTimeout(u64),

    #[error(transparent)]
    Store(#[from] tether_store::StoreError),

    #[error(transparent)]
    Driver(#[from] tether_core::DriverError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
