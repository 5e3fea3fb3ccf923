//! Actuator abstraction over the instrument drivers.
//!
//! An actuator exposes one scalar setpoint (a frequency, a power, a voltage)
//! through a uniform async contract: initialize the hardware, move to an
//! absolute target, read back the current value, stop, close. Host
//! applications subscribe to a broadcast channel for status transitions
//! instead of polling.

pub mod hmp_voltage;
pub mod mw_frequency;
pub mod mw_multi;

pub use hmp_voltage::HmpVoltageActuator;
pub use mw_frequency::MwFrequencyActuator;
pub use mw_multi::{Axis, MwSourceActuator};

use crate::error::ActuatorResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle state reported by an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorStatus {
    /// Ready, no motion in progress
    Idle,
    /// A move is being executed
    Moving,
    /// The last operation failed; see the update message
    Error,
}

impl std::fmt::Display for ActuatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorStatus::Idle => write!(f, "idle"),
            ActuatorStatus::Moving => write!(f, "moving"),
            ActuatorStatus::Error => write!(f, "error"),
        }
    }
}

/// One status transition, broadcast to all subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Actuator that emitted the update
    pub actuator_id: String,

    /// When the transition happened
    pub timestamp: DateTime<Utc>,

    /// New lifecycle state
    pub status: ActuatorStatus,

    /// Human-readable detail (error text, readback value)
    pub message: String,
}

impl StatusUpdate {
    pub fn new(actuator_id: &str, status: ActuatorStatus, message: impl Into<String>) -> Self {
        Self {
            actuator_id: actuator_id.to_string(),
            timestamp: Utc::now(),
            status,
            message: message.into(),
        }
    }
}

/// Fan-out of [`StatusUpdate`]s to any number of subscribers. Lagging
/// receivers drop the oldest updates rather than block the actuator.
pub struct StatusChannel {
    sender: broadcast::Sender<StatusUpdate>,
}

impl StatusChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }

    /// Publish an update. Having no subscribers is not an error.
    pub fn publish(&self, update: StatusUpdate) {
        debug!(
            "Actuator '{}' -> {}: {}",
            update.actuator_id, update.status, update.message
        );
        let _ = self.sender.send(update);
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Uniform async contract for one scalar setpoint on an instrument.
///
/// Implementations must uphold:
/// - [`move_abs`](Actuator::move_abs) rejects targets outside
///   [`bounds`](Actuator::bounds) before touching the hardware, so the
///   instrument's previous setpoint survives a rejected move.
/// - After a successful move, [`current_value`](Actuator::current_value)
///   agrees with the target within [`epsilon`](Actuator::epsilon).
/// - [`close`](Actuator::close) is idempotent.
/// - Every operation completes within the configured timeout; a dead
///   transport yields an error, never a hang.
#[async_trait]
pub trait Actuator: Send {
    /// Stable identifier used in status updates and logs.
    fn id(&self) -> &str;

    /// Unit of the controlled value ("Hz", "dBm", "V").
    fn unit(&self) -> &'static str;

    /// Tolerance for considering a move complete, in [`unit`](Actuator::unit).
    fn epsilon(&self) -> f64;

    /// Inclusive (min, max) range accepted by [`move_abs`](Actuator::move_abs).
    fn bounds(&self) -> (f64, f64);

    /// Last reported lifecycle state.
    fn status(&self) -> ActuatorStatus;

    /// Subscribe to status transitions.
    fn subscribe(&self) -> broadcast::Receiver<StatusUpdate>;

    /// Connect to the instrument and bring it to a known state.
    async fn initialize(&mut self) -> ActuatorResult<()>;

    /// Move to an absolute target, in [`unit`](Actuator::unit).
    async fn move_abs(&mut self, target: f64) -> ActuatorResult<()>;

    /// Move by an offset relative to the current value.
    async fn move_rel(&mut self, offset: f64) -> ActuatorResult<()> {
        let current = self.current_value().await?;
        self.move_abs(current + offset).await
    }

    /// Read back the current value from the hardware.
    async fn current_value(&mut self) -> ActuatorResult<f64>;

    /// Halt the physical effect of the actuator (e.g. switch RF output off).
    async fn stop(&mut self) -> ActuatorResult<()>;

    /// Release the instrument session. Idempotent.
    async fn close(&mut self) -> ActuatorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ActuatorStatus::Idle.to_string(), "idle");
        assert_eq!(ActuatorStatus::Moving.to_string(), "moving");
        assert_eq!(ActuatorStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let json = serde_json::to_string(&ActuatorStatus::Moving).unwrap();
        assert_eq!(json, "\"moving\"");
        let back: ActuatorStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActuatorStatus::Moving);
    }

    #[tokio::test]
    async fn test_status_channel_fan_out() {
        let channel = StatusChannel::default();
        let mut rx1 = channel.subscribe();
        let mut rx2 = channel.subscribe();

        channel.publish(StatusUpdate::new("mw", ActuatorStatus::Moving, "to 1 GHz"));

        let u1 = rx1.recv().await.unwrap();
        let u2 = rx2.recv().await.unwrap();
        assert_eq!(u1.status, ActuatorStatus::Moving);
        assert_eq!(u2.actuator_id, "mw");
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let channel = StatusChannel::default();
        channel.publish(StatusUpdate::new("mw", ActuatorStatus::Idle, "ready"));
    }
}
