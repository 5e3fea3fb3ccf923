//! Rohde & Schwarz HMP-series power supply command layer.
//!
//! Drives channel selection, voltage/current setpoints and output switching
//! on the HMP2030 (three channels, 32 V / 5 A each) over any
//! [`ScpiAdapter`]. Setpoints are validated against per-channel limits before
//! anything is written to the wire.

use crate::adapters::ScpiAdapter;
use crate::config::PowerSupplyConfig;
use crate::error::{ActuatorError, ActuatorResult};
use log::{info, warn};
use std::time::Duration;

const NUM_CHANNELS: usize = 3;

/// Regulation state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regulation {
    /// Constant-current limiting active
    ConstantCurrent,
    /// Constant-voltage regulation
    ConstantVoltage,
}

/// HMP2030 power supply driver.
pub struct Hmp2030 {
    id: String,
    adapter: Option<Box<dyn ScpiAdapter>>,
    model: String,
    timeout: Duration,
    voltage_max: [f64; NUM_CHANNELS],
    current_max: [f64; NUM_CHANNELS],
}

impl Hmp2030 {
    /// Create a driver over an unconnected adapter.
    pub fn new(
        id: impl Into<String>,
        adapter: Box<dyn ScpiAdapter>,
        config: &PowerSupplyConfig,
    ) -> Self {
        Self {
            id: id.into(),
            adapter: Some(adapter),
            model: String::new(),
            timeout: config.connection.timeout,
            voltage_max: [config.voltage_max; NUM_CHANNELS],
            current_max: [config.current_max; NUM_CHANNELS],
        }
    }

    /// Instrument identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model field of the `*IDN?` response, empty before [`Hmp2030::open`].
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the transport session is open.
    pub fn is_open(&self) -> bool {
        self.adapter.as_ref().is_some_and(|a| a.is_connected())
    }

    /// Voltage and current limits for a channel: ((0, v_max), (0, i_max)).
    pub fn limits(&self, channel: u8) -> ActuatorResult<((f64, f64), (f64, f64))> {
        let idx = Self::channel_index(channel)?;
        Ok(((0.0, self.voltage_max[idx]), (0.0, self.current_max[idx])))
    }

    fn channel_index(channel: u8) -> ActuatorResult<usize> {
        if (1..=NUM_CHANNELS as u8).contains(&channel) {
            Ok((channel - 1) as usize)
        } else {
            Err(ActuatorError::Config(format!(
                "Wrong channel number {channel}. Choose 1, 2 or 3."
            )))
        }
    }

    /// Open the session, identify the instrument and switch it to remote
    /// control.
    pub async fn open(&mut self) -> ActuatorResult<()> {
        {
            let adapter = self
                .adapter
                .as_mut()
                .ok_or(ActuatorError::NotConnected)?;
            adapter.set_timeout(self.timeout);
            adapter.connect().await.map_err(|e| {
                ActuatorError::Connection(format!(
                    "Could not connect to power supply. Check the wires and the address: {e}"
                ))
            })?;
        }

        let idn = self.query("*IDN?").await.map_err(|e| {
            ActuatorError::Connection(format!("No identification response: {e}"))
        })?;
        self.model = idn
            .split(',')
            .nth(1)
            .unwrap_or(idn.as_str())
            .trim()
            .to_string();

        self.write("SYST:REM").await?;
        info!("Power supply '{}' connected: {}", self.id, self.model);
        Ok(())
    }

    /// Switch all outputs off and release the session. Safe to call
    /// repeatedly and after errors.
    pub async fn close(&mut self) -> ActuatorResult<()> {
        if self.adapter.is_none() {
            return Ok(());
        }
        if let Err(e) = self.all_off().await {
            // teardown must still release the session
            warn!("Power supply '{}': all-off during close failed: {e}", self.id);
        }
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect().await?;
            info!("Power supply '{}' disconnected", self.id);
        }
        Ok(())
    }

    async fn write(&mut self, cmd: &str) -> ActuatorResult<()> {
        let timeout = self.timeout;
        let adapter = self.adapter.as_mut().ok_or(ActuatorError::NotConnected)?;
        tokio::time::timeout(timeout, adapter.write(cmd))
            .await
            .map_err(|_| ActuatorError::Timeout(timeout))?
    }

    async fn query(&mut self, cmd: &str) -> ActuatorResult<String> {
        let timeout = self.timeout;
        let adapter = self.adapter.as_mut().ok_or(ActuatorError::NotConnected)?;
        tokio::time::timeout(timeout, adapter.query(cmd))
            .await
            .map_err(|_| ActuatorError::Timeout(timeout))?
    }

    async fn query_f64(&mut self, cmd: &str) -> ActuatorResult<f64> {
        let response = self.query(cmd).await?;
        // some firmware revisions append '\r' before the terminator
        let value = response.split('\r').next().unwrap_or("").trim();
        value
            .parse::<f64>()
            .map_err(|e| ActuatorError::parse(&response, e))
    }

    /// Select the active output channel (1-3).
    pub async fn select_channel(&mut self, channel: u8) -> ActuatorResult<()> {
        Self::channel_index(channel)?;
        self.write(&format!("INST OUT{channel}")).await
    }

    /// Query the currently selected channel.
    pub async fn selected_channel(&mut self) -> ActuatorResult<u8> {
        Ok(self.query_f64("INST:NSEL?").await? as u8)
    }

    /// Set the voltage setpoint of a channel, in V.
    pub async fn set_voltage(&mut self, channel: u8, volts: f64) -> ActuatorResult<()> {
        let idx = Self::channel_index(channel)?;
        let max = self.voltage_max[idx];
        if !(0.0..=max).contains(&volts) {
            return Err(ActuatorError::OutOfRange {
                value: volts,
                min: 0.0,
                max,
                unit: "V",
            });
        }
        self.select_channel(channel).await?;
        self.write(&format!("VOLT {volts}")).await?;
        info!("Power supply '{}' channel {channel} set to {volts} V", self.id);
        Ok(())
    }

    /// Voltage setpoint of a channel, in V.
    pub async fn voltage_setpoint(&mut self, channel: u8) -> ActuatorResult<f64> {
        self.select_channel(channel).await?;
        self.query_f64("VOLT?").await
    }

    /// Measured output voltage of a channel, in V.
    pub async fn measured_voltage(&mut self, channel: u8) -> ActuatorResult<f64> {
        self.select_channel(channel).await?;
        self.query_f64("MEAS:VOLT?").await
    }

    /// Set the current limit of a channel, in A.
    pub async fn set_current(&mut self, channel: u8, amps: f64) -> ActuatorResult<()> {
        let idx = Self::channel_index(channel)?;
        let max = self.current_max[idx];
        if !(0.0..=max).contains(&amps) {
            return Err(ActuatorError::OutOfRange {
                value: amps,
                min: 0.0,
                max,
                unit: "A",
            });
        }
        self.select_channel(channel).await?;
        self.write(&format!("CURR {amps}")).await
    }

    /// Measured output current of a channel, in A.
    pub async fn measured_current(&mut self, channel: u8) -> ActuatorResult<f64> {
        self.select_channel(channel).await?;
        self.query_f64("MEAS:CURR?").await
    }

    /// Switch a channel's output on.
    pub async fn output_on(&mut self, channel: u8) -> ActuatorResult<()> {
        self.select_channel(channel).await?;
        self.write("OUTP ON").await
    }

    /// Switch a channel's output off.
    pub async fn output_off(&mut self, channel: u8) -> ActuatorResult<()> {
        self.select_channel(channel).await?;
        self.write("OUTP OFF").await
    }

    /// Switch every channel's output off.
    pub async fn all_off(&mut self) -> ActuatorResult<()> {
        for channel in 1..=NUM_CHANNELS as u8 {
            self.output_off(channel).await?;
        }
        Ok(())
    }

    /// Regulation state (CC or CV) of a channel.
    pub async fn regulation(&mut self, channel: u8) -> ActuatorResult<Regulation> {
        Self::channel_index(channel)?;
        let state = self
            .query_f64(&format!("STAT:QUES:INST:ISUM{channel}:COND?"))
            .await? as i64;
        Ok(if state == 1 {
            Regulation::ConstantCurrent
        } else {
            Regulation::ConstantVoltage
        })
    }

    /// Set the over-voltage protection threshold of a channel, in V.
    pub async fn set_over_voltage(&mut self, channel: u8, volts: f64) -> ActuatorResult<()> {
        self.select_channel(channel).await?;
        self.write(&format!("VOLT:PROT {volts}")).await
    }

    /// Enable the electronic fuse on a channel and set its trip current.
    pub async fn set_over_current(&mut self, channel: u8, amps: f64) -> ActuatorResult<()> {
        self.select_channel(channel).await?;
        self.write("FUSE ON").await?;
        self.write(&format!("CURR {amps}")).await
    }

    /// Reset the instrument and return it to remote control.
    pub async fn reset(&mut self) -> ActuatorResult<()> {
        self.write("*RST").await?;
        self.write("SYST:REM").await
    }

    /// Pop the next entry from the instrument's error queue.
    pub async fn next_error(&mut self) -> ActuatorResult<String> {
        self.query("SYST:ERR?").await
    }

    /// Sound the instrument's beeper.
    pub async fn beep(&mut self) -> ActuatorResult<()> {
        self.write("SYST:BEEP").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockHmpAdapter;

    async fn open_supply() -> (Hmp2030, MockHmpAdapter) {
        let mock = MockHmpAdapter::new();
        let config = PowerSupplyConfig::default();
        let mut supply = Hmp2030::new("hmp_test", Box::new(mock.clone()), &config);
        supply.open().await.unwrap();
        (supply, mock)
    }

    #[tokio::test]
    async fn test_open_identifies_model() {
        let (supply, _mock) = open_supply().await;
        assert_eq!(supply.model(), "HMP2030");
    }

    #[tokio::test]
    async fn test_set_voltage_selects_channel() {
        let (mut supply, mock) = open_supply().await;
        supply.set_voltage(3, 12.0).await.unwrap();
        assert_eq!(mock.voltage_set(3), 12.0);
        assert_eq!(supply.selected_channel().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_voltage_out_of_range_rejected_before_write() {
        let (mut supply, mock) = open_supply().await;
        let commands_before = mock.call_log().len();
        let err = supply.set_voltage(1, 40.0).await.unwrap_err();
        assert!(matches!(err, ActuatorError::OutOfRange { .. }));
        // nothing reached the wire
        assert_eq!(mock.call_log().len(), commands_before);
        assert_eq!(mock.voltage_set(1), 0.0);
    }

    #[tokio::test]
    async fn test_invalid_channel_rejected() {
        let (mut supply, _mock) = open_supply().await;
        assert!(supply.set_voltage(0, 1.0).await.is_err());
        assert!(supply.set_voltage(4, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_measured_voltage_follows_output() {
        let (mut supply, _mock) = open_supply().await;
        supply.set_voltage(1, 5.0).await.unwrap();
        assert_eq!(supply.measured_voltage(1).await.unwrap(), 0.0);

        supply.output_on(1).await.unwrap();
        assert_eq!(supply.measured_voltage(1).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_close_switches_outputs_off() {
        let (mut supply, mock) = open_supply().await;
        supply.output_on(1).await.unwrap();
        supply.output_on(2).await.unwrap();
        supply.close().await.unwrap();

        assert!(!mock.output_on(1));
        assert!(!mock.output_on(2));
        assert!(!supply.is_open());

        // idempotent
        supply.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_regulation_parse() {
        let (mut supply, _mock) = open_supply().await;
        assert_eq!(
            supply.regulation(1).await.unwrap(),
            Regulation::ConstantVoltage
        );
    }
}
