//! Drive a mock SMB source through a CW frequency ramp.
//!
//! Run with: cargo run --example cw_sweep

use anyhow::Result;
use rsmw_daq::actuator::{Actuator, MwFrequencyActuator};
use rsmw_daq::adapters::MockMwAdapter;
use rsmw_daq::config::MwSourceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = MwSourceConfig::default();
    let mut actuator =
        MwFrequencyActuator::new("mw_demo", Box::new(MockMwAdapter::new()), &config);

    let mut updates = actuator.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            println!("[{}] {}: {}", update.actuator_id, update.status, update.message);
        }
    });

    actuator.initialize().await?;

    for step in 0..5 {
        let target = 1.0e9 + step as f64 * 0.5e9;
        actuator.move_abs(target).await?;
        let readback = actuator.current_value().await?;
        println!("set {target} Hz, read back {readback} Hz");
    }

    // out-of-range targets are rejected without touching the instrument
    if let Err(e) = actuator.move_abs(1.0e12).await {
        println!("rejected: {e}");
    }
    println!("frequency still {} Hz", actuator.current_value().await?);

    actuator.stop().await?;
    actuator.close().await?;
    Ok(())
}
