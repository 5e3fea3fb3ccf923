//! Custom error types for the crate.
//!
//! This module defines the primary error type, `ActuatorError`, used by the
//! adapter layer, the instrument drivers, and the actuators. Using the
//! `thiserror` crate, it provides a centralized and consistent way to handle
//! the different failure classes an actuator operation can hit:
//!
//! - **`Connection`**: the transport session could not be established, or the
//!   instrument did not answer the identification query during initialization.
//! - **`Transport`**: a command could not be delivered or acknowledged on an
//!   already-open session.
//! - **`Timeout`**: an operation exceeded its bounded I/O timeout. Reported
//!   separately from `Transport` so callers can distinguish a dead link from
//!   a slow instrument.
//! - **`OutOfRange`**: a requested target lies outside the instrument's
//!   supported range. Raised before anything is written to the wire.
//! - **`Parse`**: the instrument's ASCII response was not a well-formed value.
//! - **`NotConnected`**: an operation was attempted on a closed session.
//!
//! Every error carries a human-readable message; the host framework is the
//! retry/recovery authority, so nothing here retries on its own.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type ActuatorResult<T> = std::result::Result<T, ActuatorError>;

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {0:?} waiting for instrument")]
    Timeout(Duration),

    #[error("Target {value} {unit} outside supported range [{min} {unit}, {max} {unit}]")]
    OutOfRange {
        value: f64,
        min: f64,
        max: f64,
        unit: &'static str,
    },

    #[error("Failed to parse instrument response '{response}': {reason}")]
    Parse { response: String, reason: String },

    #[error("Adapter not connected")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActuatorError {
    /// Build a `Parse` error from a raw response and its parse failure.
    pub fn parse(response: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            response: response.to_string(),
            reason: reason.to_string(),
        }
    }
}
