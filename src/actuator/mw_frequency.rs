//! CW frequency axis of an SMA/SMB microwave source.

use crate::actuator::{Actuator, ActuatorStatus, StatusChannel, StatusUpdate};
use crate::adapters::ScpiAdapter;
use crate::config::MwSourceConfig;
use crate::error::{ActuatorError, ActuatorResult};
use crate::instrument::{MwSource, SourceMode};
use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::broadcast;

/// Drives the CW output frequency of a microwave source as a single actuator
/// axis, in Hz.
///
/// Targets outside the configured band are rejected before any command is
/// sent, so a bad target never disturbs the running output. Each move is
/// confirmed by reading the frequency back from the instrument.
pub struct MwFrequencyActuator {
    id: String,
    source: MwSource,
    min_hz: f64,
    max_hz: f64,
    epsilon_hz: f64,
    default_power_dbm: f64,
    status: ActuatorStatus,
    updates: StatusChannel,
}

impl MwFrequencyActuator {
    pub fn new(
        id: impl Into<String>,
        adapter: Box<dyn ScpiAdapter>,
        config: &MwSourceConfig,
    ) -> Self {
        let id = id.into();
        Self {
            source: MwSource::new(id.clone(), adapter, config.connection.timeout),
            id,
            min_hz: config.min_frequency_hz,
            max_hz: config.max_frequency_hz,
            epsilon_hz: config.epsilon_hz,
            default_power_dbm: config.default_power_dbm,
            status: ActuatorStatus::Idle,
            updates: StatusChannel::default(),
        }
    }

    /// Underlying driver, for operations beyond the frequency axis
    /// (sweep and list setup, trigger configuration).
    pub fn source_mut(&mut self) -> &mut MwSource {
        &mut self.source
    }

    fn transition(&mut self, status: ActuatorStatus, message: impl Into<String>) {
        self.status = status;
        self.updates
            .publish(StatusUpdate::new(&self.id, status, message));
    }

    /// Record a failed operation and hand the error back to the caller.
    fn fail<T>(&mut self, err: ActuatorError) -> ActuatorResult<T> {
        self.transition(ActuatorStatus::Error, err.to_string());
        Err(err)
    }
}

#[async_trait]
impl Actuator for MwFrequencyActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn unit(&self) -> &'static str {
        "Hz"
    }

    fn epsilon(&self) -> f64 {
        self.epsilon_hz
    }

    fn bounds(&self) -> (f64, f64) {
        (self.min_hz, self.max_hz)
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
        // known state: CW mode at the configured power, output off
        if let Err(e) = self.source.set_cw(None, Some(self.default_power_dbm)).await {
            return self.fail(e);
        }
        let freq = match self.source.cw_frequency().await {
            Ok(f) => f,
            Err(e) => return self.fail(e),
        };
        info!(
            "Actuator '{}' initialized: {} at {freq} Hz",
            self.id,
            self.source.model()
        );
        self.transition(ActuatorStatus::Idle, format!("initialized at {freq} Hz"));
        Ok(())
    }

    async fn move_abs(&mut self, target: f64) -> ActuatorResult<()> {
        if !(self.min_hz..=self.max_hz).contains(&target) {
            return self.fail(ActuatorError::OutOfRange {
                value: target,
                min: self.min_hz,
                max: self.max_hz,
                unit: "Hz",
            });
        }

        self.transition(ActuatorStatus::Moving, format!("moving to {target} Hz"));
        if let Err(e) = self.source.set_cw(Some(target), None).await {
            return self.fail(e);
        }
        if let Err(e) = self.source.cw_on().await {
            return self.fail(e);
        }

        let readback = match self.source.cw_frequency().await {
            Ok(f) => f,
            Err(e) => return self.fail(e),
        };
        if (readback - target).abs() > self.epsilon_hz {
            return self.fail(ActuatorError::Transport(format!(
                "Frequency readback {readback} Hz disagrees with target {target} Hz"
            )));
        }

        self.transition(ActuatorStatus::Idle, format!("at {readback} Hz"));
        Ok(())
    }

    async fn current_value(&mut self) -> ActuatorResult<f64> {
        let (mode, _) = match self.source.status().await {
            Ok(s) => s,
            Err(e) => return self.fail(e),
        };
        if mode != SourceMode::Cw {
            warn!(
                "Actuator '{}': source is in {mode} mode, frequency axis undefined",
                self.id
            );
            self.updates.publish(StatusUpdate::new(
                &self.id,
                self.status,
                format!("source in {mode} mode, reporting 0 Hz"),
            ));
            return Ok(0.0);
        }
        match self.source.cw_frequency().await {
            Ok(f) => Ok(f),
            Err(e) => self.fail(e),
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
