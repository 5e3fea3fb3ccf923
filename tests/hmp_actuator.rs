//! End-to-end scenario for the HMP2030 voltage axis over a mock transport.

use rsmw_daq::actuator::{Actuator, ActuatorStatus, HmpVoltageActuator};
use rsmw_daq::adapters::MockHmpAdapter;
use rsmw_daq::config::PowerSupplyConfig;
use rsmw_daq::ActuatorError;

#[tokio::test]
async fn voltage_axis_full_session() {
    let mock = MockHmpAdapter::new();
    let config = PowerSupplyConfig {
        channel: 2,
        ..PowerSupplyConfig::default()
    };
    let mut actuator = HmpVoltageActuator::new("hmp2030", Box::new(mock.clone()), &config);

    actuator.initialize().await.unwrap();
    assert_eq!(actuator.unit(), "V");
    assert_eq!(actuator.bounds(), (0.0, 32.0));

    actuator.move_abs(12.0).await.unwrap();
    assert_eq!(actuator.current_value().await.unwrap(), 12.0);
    assert!(mock.output_on(2));

    // other channels stay untouched
    assert!(!mock.output_on(1));
    assert!(!mock.output_on(3));

    let err = actuator.move_abs(40.0).await.unwrap_err();
    assert!(matches!(err, ActuatorError::OutOfRange { max, .. } if max == 32.0));
    assert_eq!(mock.voltage_set(2), 12.0);
    assert_eq!(actuator.status(), ActuatorStatus::Error);

    actuator.stop().await.unwrap();
    assert!(!mock.output_on(2));

    // close powers everything down and is idempotent
    actuator.move_abs(5.0).await.unwrap();
    actuator.close().await.unwrap();
    assert!(!mock.output_on(2));
    actuator.close().await.unwrap();
}

#[tokio::test]
async fn current_limit_and_protection_setup() {
    let mock = MockHmpAdapter::new();
    let config = PowerSupplyConfig::default();
    let mut actuator = HmpVoltageActuator::new("hmp2030", Box::new(mock.clone()), &config);
    actuator.initialize().await.unwrap();

    let supply = actuator.supply_mut();
    supply.set_current(1, 0.25).await.unwrap();
    supply.set_over_voltage(1, 15.0).await.unwrap();
    supply.set_over_current(1, 0.5).await.unwrap();

    // limits beyond the hardware range are rejected
    let err = supply.set_current(1, 6.0).await.unwrap_err();
    assert!(matches!(err, ActuatorError::OutOfRange { unit: "A", .. }));

    actuator.close().await.unwrap();
}
