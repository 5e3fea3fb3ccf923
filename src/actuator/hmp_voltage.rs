//! Voltage axis of one HMP2030 power supply channel.

use crate::actuator::{Actuator, ActuatorStatus, StatusChannel, StatusUpdate};
use crate::adapters::ScpiAdapter;
use crate::config::PowerSupplyConfig;
use crate::error::{ActuatorError, ActuatorResult};
use crate::instrument::Hmp2030;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Drives the voltage setpoint of a single supply channel, in V.
///
/// The channel is fixed at construction time. `stop` switches that channel's
/// output off without touching the setpoint; `close` powers down all
/// channels.
pub struct HmpVoltageActuator {
    id: String,
    supply: Hmp2030,
    channel: u8,
    voltage_max: f64,
    status: ActuatorStatus,
    updates: StatusChannel,
}

const VOLTAGE_EPSILON: f64 = 0.001;

impl HmpVoltageActuator {
    pub fn new(
        id: impl Into<String>,
        adapter: Box<dyn ScpiAdapter>,
        config: &PowerSupplyConfig,
    ) -> Self {
        let id = id.into();
        Self {
            supply: Hmp2030::new(id.clone(), adapter, config),
            id,
            channel: config.channel,
            voltage_max: config.voltage_max,
            status: ActuatorStatus::Idle,
            updates: StatusChannel::default(),
        }
    }

    /// Underlying driver, for current limits, OVP and fuse setup.
    pub fn supply_mut(&mut self) -> &mut Hmp2030 {
        &mut self.supply
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
impl Actuator for HmpVoltageActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn unit(&self) -> &'static str {
        "V"
    }

    fn epsilon(&self) -> f64 {
        VOLTAGE_EPSILON
    }

    fn bounds(&self) -> (f64, f64) {
        (0.0, self.voltage_max)
    }

    fn status(&self) -> ActuatorStatus {
        self.status
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    async fn initialize(&mut self) -> ActuatorResult<()> {
        if let Err(e) = self.supply.open().await {
            return self.fail(e);
        }
        if let Err(e) = self.supply.select_channel(self.channel).await {
            return self.fail(e);
        }
        self.transition(
            ActuatorStatus::Idle,
            format!("initialized on channel {}", self.channel),
        );
        Ok(())
    }

    async fn move_abs(&mut self, target: f64) -> ActuatorResult<()> {
        if !(0.0..=self.voltage_max).contains(&target) {
            return self.fail(ActuatorError::OutOfRange {
                value: target,
                min: 0.0,
                max: self.voltage_max,
                unit: "V",
            });
        }

        self.transition(ActuatorStatus::Moving, format!("moving to {target} V"));
        if let Err(e) = self.supply.set_voltage(self.channel, target).await {
            return self.fail(e);
        }
        if let Err(e) = self.supply.output_on(self.channel).await {
            return self.fail(e);
        }
        self.transition(ActuatorStatus::Idle, format!("at {target} V"));
        Ok(())
    }

    async fn current_value(&mut self) -> ActuatorResult<f64> {
        match self.supply.voltage_setpoint(self.channel).await {
            Ok(v) => Ok(v),
            Err(e) => self.fail(e),
        }
    }

    async fn stop(&mut self) -> ActuatorResult<()> {
        if let Err(e) = self.supply.output_off(self.channel).await {
            return self.fail(e);
        }
        self.transition(ActuatorStatus::Idle, "output off");
        Ok(())
    }

    async fn close(&mut self) -> ActuatorResult<()> {
        self.supply.close().await?;
        self.status = ActuatorStatus::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockHmpAdapter;

    async fn ready_actuator(channel: u8) -> (HmpVoltageActuator, MockHmpAdapter) {
        let mock = MockHmpAdapter::new();
        let config = PowerSupplyConfig {
            channel,
            ..PowerSupplyConfig::default()
        };
        let mut actuator = HmpVoltageActuator::new("hmp", Box::new(mock.clone()), &config);
        actuator.initialize().await.unwrap();
        (actuator, mock)
    }

    #[tokio::test]
    async fn test_move_and_read_back() {
        let (mut actuator, mock) = ready_actuator(2).await;
        actuator.move_abs(12.5).await.unwrap();

        assert_eq!(actuator.current_value().await.unwrap(), 12.5);
        assert_eq!(mock.voltage_set(2), 12.5);
        assert!(mock.output_on(2));
    }

    #[tokio::test]
    async fn test_out_of_range_leaves_setpoint_unchanged() {
        let (mut actuator, mock) = ready_actuator(1).await;
        actuator.move_abs(5.0).await.unwrap();

        let err = actuator.move_abs(33.0).await.unwrap_err();
        assert!(matches!(err, ActuatorError::OutOfRange { unit: "V", .. }));
        assert_eq!(mock.voltage_set(1), 5.0);
        assert_eq!(actuator.status(), ActuatorStatus::Error);
    }

    #[tokio::test]
    async fn test_stop_switches_channel_off() {
        let (mut actuator, mock) = ready_actuator(1).await;
        actuator.move_abs(5.0).await.unwrap();
        assert!(mock.output_on(1));

        actuator.stop().await.unwrap();
        assert!(!mock.output_on(1));
        // setpoint untouched
        assert_eq!(actuator.current_value().await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut actuator, _mock) = ready_actuator(1).await;
        actuator.close().await.unwrap();
        actuator.close().await.unwrap();
    }
}
