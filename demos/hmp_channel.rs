//! Ramp the voltage on one channel of a mock HMP2030 supply.
//!
//! Run with: cargo run --example hmp_channel

use anyhow::Result;
use rsmw_daq::actuator::{Actuator, HmpVoltageActuator};
use rsmw_daq::adapters::MockHmpAdapter;
use rsmw_daq::config::PowerSupplyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = PowerSupplyConfig {
        channel: 2,
        ..PowerSupplyConfig::default()
    };
    let mut actuator = HmpVoltageActuator::new("hmp_demo", Box::new(MockHmpAdapter::new()), &config);

    actuator.initialize().await?;
    actuator.supply_mut().set_current(2, 0.5).await?;

    for volts in [1.0, 2.0, 5.0, 12.0] {
        actuator.move_abs(volts).await?;
        println!(
            "channel 2 setpoint {} V, measured {} V",
            actuator.current_value().await?,
            actuator.supply_mut().measured_voltage(2).await?
        );
    }

    actuator.stop().await?;
    actuator.close().await?;
    Ok(())
}
