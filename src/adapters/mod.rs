//! Hardware adapter implementations.
//!
//! This module defines the `ScpiAdapter` trait, the low-level I/O seam between
//! the instrument drivers and the transport (VISA, or a mock for tests), and
//! its implementations. An adapter instance is exclusively owned by one driver
//! for its lifetime: opened on initialization, released on teardown, never
//! shared between instruments.

pub mod mock_adapter;
#[cfg(feature = "instrument_visa")]
pub mod visa_adapter;

pub use mock_adapter::{MockHmpAdapter, MockMwAdapter};
#[cfg(feature = "instrument_visa")]
pub use visa_adapter::VisaAdapter;

use crate::error::ActuatorResult;
use async_trait::async_trait;
use std::time::Duration;

/// Request/response command channel to one instrument.
///
/// Implementations send ASCII SCPI commands and return ASCII responses.
/// Operations may block on I/O up to the adapter timeout; on expiry they fail
/// rather than hang. Drivers additionally bound every exchange with
/// `tokio::time::timeout`, so a misbehaving adapter cannot stall the host.
#[async_trait]
pub trait ScpiAdapter: Send + Sync {
    /// Open the transport session.
    async fn connect(&mut self) -> ActuatorResult<()>;

    /// Close the transport session. Safe to call when already closed.
    async fn disconnect(&mut self) -> ActuatorResult<()>;

    /// Send a command without reading a response (e.g. `*RST`, `FREQ 1e9`).
    async fn write(&mut self, cmd: &str) -> ActuatorResult<()>;

    /// Send a query and read the response, trimmed (e.g. `*IDN?`, `:FREQ?`).
    async fn query(&mut self, cmd: &str) -> ActuatorResult<String>;

    /// Replace the I/O timeout used for subsequent operations.
    fn set_timeout(&mut self, timeout: Duration);

    /// Current I/O timeout.
    fn timeout(&self) -> Duration;

    /// Whether a session is currently open.
    fn is_connected(&self) -> bool;

    /// Short adapter kind tag ("visa", "mock_mw", ...).
    fn adapter_type(&self) -> &str;

    /// Human-readable description for logs.
    fn info(&self) -> String {
        format!("{}({}ms timeout)", self.adapter_type(), self.timeout().as_millis())
    }
}
