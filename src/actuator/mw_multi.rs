//! Multi-axis actuator exposing both frequency and power of a microwave
//! source.
//!
//! One instrument session, two logical axes. The active axis is selected with
//! [`MwSourceActuator::set_axis`]; the [`Actuator`] contract then applies to
//! that axis.

use crate::actuator::{Actuator, ActuatorStatus, StatusChannel, StatusUpdate};
use crate::adapters::ScpiAdapter;
use crate::config::MwSourceConfig;
use crate::error::{ActuatorError, ActuatorResult};
use crate::instrument::{MwSource, SourceMode};
use async_trait::async_trait;
use log::warn;
use tokio::sync::broadcast;

// Level range of the SMA/SMB output stage
const MIN_POWER_DBM: f64 = -120.0;
const MAX_POWER_DBM: f64 = 25.0;
const POWER_EPSILON_DBM: f64 = 0.01;

/// Controllable axis of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// CW output frequency, in Hz
    Frequency,
    /// Output level, in dBm
    Power,
}

impl Axis {
    pub fn unit(&self) -> &'static str {
        match self {
            Axis::Frequency => "Hz",
            Axis::Power => "dBm",
        }
    }
}

/// Frequency and power axes of one microwave source.
pub struct MwSourceActuator {
    id: String,
    source: MwSource,
    axis: Axis,
    min_hz: f64,
    max_hz: f64,
    epsilon_hz: f64,
    default_power_dbm: f64,
    status: ActuatorStatus,
    updates: StatusChannel,
}

impl MwSourceActuator {
    pub fn new(
        id: impl Into<String>,
        adapter: Box<dyn ScpiAdapter>,
        config: &MwSourceConfig,
    ) -> Self {
        let id = id.into();
        Self {
            source: MwSource::new(id.clone(), adapter, config.connection.timeout),
            id,
            axis: Axis::Frequency,
            min_hz: config.min_frequency_hz,
            max_hz: config.max_frequency_hz,
            epsilon_hz: config.epsilon_hz,
            default_power_dbm: config.default_power_dbm,
            status: ActuatorStatus::Idle,
            updates: StatusChannel::default(),
        }
    }

    /// Select the axis subsequent operations act on.
    pub fn set_axis(&mut self, axis: Axis) {
        self.axis = axis;
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    fn transition(&mut self, status: ActuatorStatus, message: impl Into<String>) {
        self.status = status;
        self.updates
            .publish(StatusUpdate::new(&self.id, status, message));
    }

    fn fail<T>(&mut self, err: ActuatorError) -> ActuatorResult<T> {
        self.transition(ActuatorStatus::Error, err.to_string());
        Err(err)
    }
}

#[async_trait]
impl Actuator for MwSourceActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn unit(&self) -> &'static str {
        self.axis.unit()
    }

    fn epsilon(&self) -> f64 {
        match self.axis {
            Axis::Frequency => self.epsilon_hz,
            Axis::Power => POWER_EPSILON_DBM,
        }
    }

    fn bounds(&self) -> (f64, f64) {
        match self.axis {
            Axis::Frequency => (self.min_hz, self.max_hz),
            Axis::Power => (MIN_POWER_DBM, MAX_POWER_DBM),
        }
    }

    fn status(&self) -> ActuatorStatus {
        self.status
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    async fn initialize(&mut self) -> ActuatorResult<()> {
        if let Err(e) = self.source.open().await {
            return self.fail(e);
        }
        if let Err(e) = self.source.set_cw(None, Some(self.default_power_dbm)).await {
            return self.fail(e);
        }
        self.transition(ActuatorStatus::Idle, "initialized");
        Ok(())
    }

    async fn move_abs(&mut self, target: f64) -> ActuatorResult<()> {
        let (min, max) = self.bounds();
        if !(min..=max).contains(&target) {
            let unit = self.axis.unit();
            return self.fail(ActuatorError::OutOfRange {
                value: target,
                min,
                max,
                unit,
            });
        }

        let unit = self.axis.unit();
        self.transition(ActuatorStatus::Moving, format!("moving to {target} {unit}"));

        let result = match self.axis {
            Axis::Frequency => self.source.set_cw(Some(target), None).await,
            Axis::Power => self.source.set_cw(None, Some(target)).await,
        };
        if let Err(e) = result {
            return self.fail(e);
        }
        if let Err(e) = self.source.cw_on().await {
            return self.fail(e);
        }

        self.transition(ActuatorStatus::Idle, format!("at {target} {unit}"));
        Ok(())
    }

    async fn current_value(&mut self) -> ActuatorResult<f64> {
        match self.axis {
            Axis::Frequency => {
                let (mode, _) = match self.source.status().await {
                    Ok(s) => s,
                    Err(e) => return self.fail(e),
                };
                if mode != SourceMode::Cw {
                    warn!(
                        "Actuator '{}': source is in {mode} mode, frequency axis undefined",
                        self.id
                    );
                    return Ok(0.0);
                }
                match self.source.cw_frequency().await {
                    Ok(f) => Ok(f),
                    Err(e) => self.fail(e),
                }
            }
            Axis::Power => match self.source.power().await {
                Ok(p) => Ok(p),
                Err(e) => self.fail(e),
            },
        }
    }

    async fn stop(&mut self) -> ActuatorResult<()> {
        if let Err(e) = self.source.off().await {
            return self.fail(e);
        }
        self.transition(ActuatorStatus::Idle, "output off");
        Ok(())
    }

    async fn close(&mut self) -> ActuatorResult<()> {
        self.source.close().await?;
        self.status = ActuatorStatus::Idle;
        Ok(())
    }
}
