//! Rohde & Schwarz SMA/SMB microwave source command layer.
//!
//! Drives the frequency, power, output and mode (CW / sweep / list) controls
//! of the SMA/SMB series over any [`ScpiAdapter`]. Tested command set matches
//! the SMB100A and SMA100B.
//!
//! State-changing commands go through [`MwSource::command_wait`], which chases
//! the command with `*WAI` and polls `*OPC?` until the instrument reports
//! completion, bounded by the configured timeout. Mode changes follow the
//! instrument's rules: the output is switched off before the mode is changed.

use crate::adapters::ScpiAdapter;
use crate::error::{ActuatorError, ActuatorResult};
use log::{debug, info};
use std::fmt;
use std::time::{Duration, Instant};

/// Interval between `*OPC?` completion polls.
const OPC_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Frequency operating mode of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Fixed-frequency continuous wave output
    Cw,
    /// Stepped frequency sweep
    Sweep,
    /// Arbitrary frequency/power list
    List,
}

impl SourceMode {
    /// Parse a `:FREQ:MODE?` response ("CW", "SWE", "LIST", any case).
    pub fn from_scpi(response: &str) -> ActuatorResult<Self> {
        let mode = response.trim().to_ascii_lowercase();
        if mode.starts_with("cw") || mode.starts_with("fix") {
            Ok(SourceMode::Cw)
        } else if mode.starts_with("swe") {
            Ok(SourceMode::Sweep)
        } else if mode.starts_with("list") {
            Ok(SourceMode::List)
        } else {
            Err(ActuatorError::parse(response, "unknown frequency mode"))
        }
    }

}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Cw => write!(f, "cw"),
            SourceMode::Sweep => write!(f, "sweep"),
            SourceMode::List => write!(f, "list"),
        }
    }
}

/// External trigger edge for sweep and list stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    Rising,
    Falling,
}

impl TriggerEdge {
    fn as_scpi(self) -> &'static str {
        match self {
            TriggerEdge::Rising => "POS",
            TriggerEdge::Falling => "NEG",
        }
    }

    fn from_scpi(response: &str) -> ActuatorResult<Self> {
        let slope = response.trim().to_ascii_uppercase();
        if slope.contains("POS") {
            Ok(TriggerEdge::Rising)
        } else if slope.contains("NEG") {
            Ok(TriggerEdge::Falling)
        } else {
            Err(ActuatorError::parse(response, "unknown trigger slope"))
        }
    }
}

/// Stepped sweep span, all in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSettings {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub step_hz: f64,
}

/// Frequency readback, shaped by the active mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FrequencyReading {
    /// Single CW frequency in Hz
    Cw(f64),
    /// Sweep span
    Sweep(SweepSettings),
    /// List-mode frequency table in Hz
    List(Vec<f64>),
}

/// SMA/SMB microwave source driver.
///
/// Exclusively owns its transport session: opened by [`MwSource::open`],
/// released by [`MwSource::close`] (idempotent) or on drop.
pub struct MwSource {
    id: String,
    adapter: Option<Box<dyn ScpiAdapter>>,
    model: String,
    timeout: Duration,
}

impl MwSource {
    /// Create a driver over an unconnected adapter.
    pub fn new(id: impl Into<String>, adapter: Box<dyn ScpiAdapter>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            adapter: Some(adapter),
            model: String::new(),
            timeout,
        }
    }

    /// Instrument identifier used in logs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model field of the `*IDN?` response, empty before [`MwSource::open`].
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the transport session is open.
    pub fn is_open(&self) -> bool {
        self.adapter.as_ref().is_some_and(|a| a.is_connected())
    }

    /// Open the session, identify the instrument and reset it to a known
    /// state (`*CLS`, `*RST`).
    pub async fn open(&mut self) -> ActuatorResult<()> {
        {
            let adapter = self
                .adapter
                .as_mut()
                .ok_or(ActuatorError::NotConnected)?;
            adapter.set_timeout(self.timeout);
            adapter.connect().await?;
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

        self.write("*CLS").await?;
        self.command_wait("*RST").await?;

        info!("MW source '{}' connected: {}", self.id, self.model);
        Ok(())
    }

    /// Release the session. Safe to call repeatedly and after errors.
    pub async fn close(&mut self) -> ActuatorResult<()> {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect().await?;
            info!("MW source '{}' disconnected", self.id);
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
        response
            .trim()
            .parse::<f64>()
            .map_err(|e| ActuatorError::parse(&response, e))
    }

    /// Send a state-changing command and wait until the instrument has
    /// finished processing it (`*WAI` plus `*OPC?` polling).
    pub async fn command_wait(&mut self, cmd: &str) -> ActuatorResult<()> {
        self.write(cmd).await?;
        self.write("*WAI").await?;

        let start = Instant::now();
        loop {
            let done = self.query_f64("*OPC?").await? as i64;
            if done == 1 {
                debug!("[{}] {} complete", self.id, cmd);
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(ActuatorError::Timeout(self.timeout));
            }
            tokio::time::sleep(OPC_POLL_INTERVAL).await;
        }
    }

    /// Current mode and whether the RF output is on.
    pub async fn status(&mut self) -> ActuatorResult<(SourceMode, bool)> {
        let is_running = self.query_f64("OUTP:STAT?").await? as i64 != 0;
        let mode_str = self.query(":FREQ:MODE?").await?;
        Ok((SourceMode::from_scpi(&mode_str)?, is_running))
    }

    /// Switch the RF output off. No-op when already off.
    pub async fn off(&mut self) -> ActuatorResult<()> {
        let (_, is_running) = self.status().await?;
        if !is_running {
            return Ok(());
        }
        self.command_wait("OUTP:STAT OFF").await
    }

    /// Frequency readback shaped by the active mode: a single value in CW,
    /// the sweep span in sweep mode, the frequency table in list mode.
    pub async fn frequency(&mut self) -> ActuatorResult<FrequencyReading> {
        let (mode, _) = self.status().await?;
        match mode {
            SourceMode::Cw => Ok(FrequencyReading::Cw(self.query_f64(":FREQ?").await?)),
            SourceMode::Sweep => {
                let start = self.query_f64(":FREQ:STAR?").await?;
                let stop = self.query_f64(":FREQ:STOP?").await?;
                let step = self.query_f64(":SWE:STEP?").await?;
                Ok(FrequencyReading::Sweep(SweepSettings {
                    // the configured start is one step below the first point
                    start_hz: start + step,
                    stop_hz: stop,
                    step_hz: step,
                }))
            }
            SourceMode::List => {
                let response = self.query(":LIST:FREQ?").await?;
                let freqs = response
                    .split(',')
                    .map(|v| {
                        v.trim()
                            .parse::<f64>()
                            .map_err(|e| ActuatorError::parse(v, e))
                    })
                    .collect::<ActuatorResult<Vec<f64>>>()?;
                Ok(FrequencyReading::List(freqs))
            }
        }
    }

    /// CW frequency in Hz, regardless of the readback shape.
    pub async fn cw_frequency(&mut self) -> ActuatorResult<f64> {
        self.query_f64(":FREQ?").await
    }

    /// Output power in dBm (CW and sweep modes share one level).
    pub async fn power(&mut self) -> ActuatorResult<f64> {
        self.query_f64(":POW?").await
    }

    /// List-mode power table in dBm.
    pub async fn list_powers(&mut self) -> ActuatorResult<Vec<f64>> {
        let response = self.query("LIST:POW?").await?;
        response
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| ActuatorError::parse(v, e))
            })
            .collect()
    }

    /// Configure CW mode, optionally setting frequency and/or power.
    /// The output is switched off first; [`MwSource::cw_on`] re-enables it.
    pub async fn set_cw(
        &mut self,
        frequency_hz: Option<f64>,
        power_dbm: Option<f64>,
    ) -> ActuatorResult<()> {
        let (mode, is_running) = self.status().await?;
        if is_running {
            self.off().await?;
        }
        if mode != SourceMode::Cw {
            self.command_wait(":FREQ:MODE CW").await?;
        }
        if let Some(freq) = frequency_hz {
            self.command_wait(&format!(":FREQ {freq}")).await?;
            debug!("[{}] CW frequency set to {} Hz", self.id, freq);
        }
        if let Some(power) = power_dbm {
            self.command_wait(&format!(":POW {power:.2}")).await?;
            debug!("[{}] CW power set to {:.2} dBm", self.id, power);
        }
        Ok(())
    }

    /// Switch on the CW output. No-op when already running in CW mode.
    pub async fn cw_on(&mut self) -> ActuatorResult<()> {
        let (mode, is_running) = self.status().await?;
        if is_running {
            if mode == SourceMode::Cw {
                return Ok(());
            }
            self.off().await?;
        }
        if mode != SourceMode::Cw {
            self.command_wait(":FREQ:MODE CW").await?;
        }
        self.command_wait(":OUTP:STAT ON").await
    }

    /// Configure list mode with a frequency table and matching powers.
    /// A single power value is broadcast over the whole table.
    pub async fn set_list(
        &mut self,
        frequencies_hz: &[f64],
        powers_dbm: &[f64],
    ) -> ActuatorResult<()> {
        if frequencies_hz.is_empty() {
            return Err(ActuatorError::Config("Empty frequency list".into()));
        }
        let powers: Vec<f64> = if powers_dbm.len() == 1 {
            vec![powers_dbm[0]; frequencies_hz.len()]
        } else if powers_dbm.len() == frequencies_hz.len() {
            powers_dbm.to_vec()
        } else {
            return Err(ActuatorError::Config(format!(
                "Number of frequencies ({}) and power values ({}) not matching",
                frequencies_hz.len(),
                powers_dbm.len()
            )));
        };

        let (_, is_running) = self.status().await?;
        if is_running {
            self.off().await?;
        }

        self.write(":LIST:SEL \"daq_list\"").await?;
        self.write(&format!("LIST:FREQ {}", csv(frequencies_hz)))
            .await?;
        self.write(&format!("LIST:POW {}", csv_fmt(&powers))).await?;

        self.command_wait(":FREQ:MODE LIST").await?;
        // trigger each table entry separately, from the external input
        self.write("LIST:MODE STEP").await?;
        self.write("LIST:TRIG:SOUR EXT").await?;

        info!(
            "[{}] list mode configured with {} points",
            self.id,
            frequencies_hz.len()
        );
        Ok(())
    }

    /// Switch on the output in list mode. No-op when already running in list
    /// mode.
    pub async fn list_on(&mut self) -> ActuatorResult<()> {
        let (mode, is_running) = self.status().await?;
        if is_running {
            if mode == SourceMode::List {
                return Ok(());
            }
            self.off().await?;
        }
        if mode != SourceMode::List {
            self.command_wait(":FREQ:MODE LIST").await?;
            self.write(":LIST:SEL \"daq_list\"").await?;
        }
        self.command_wait(":OUTP:STAT ON").await
    }

    /// Rewind the list index to the first entry.
    pub async fn reset_list_position(&mut self) -> ActuatorResult<()> {
        self.command_wait(":LIST:RES").await
    }

    /// Configure a linear stepped sweep, optionally setting the power.
    pub async fn set_sweep(
        &mut self,
        sweep: SweepSettings,
        power_dbm: Option<f64>,
    ) -> ActuatorResult<()> {
        if sweep.step_hz <= 0.0 {
            return Err(ActuatorError::Config(format!(
                "Sweep step must be positive: {} Hz",
                sweep.step_hz
            )));
        }
        if sweep.start_hz >= sweep.stop_hz {
            return Err(ActuatorError::Config(format!(
                "Sweep span inverted: start {} Hz >= stop {} Hz",
                sweep.start_hz, sweep.stop_hz
            )));
        }

        let (mode, is_running) = self.status().await?;
        if is_running {
            self.off().await?;
        }
        if mode != SourceMode::Sweep {
            self.command_wait(":FREQ:MODE SWEEP").await?;
        }

        self.command_wait(":SWE:MODE STEP").await?;
        self.command_wait(":SWE:SPAC LIN").await?;
        // the instrument emits the first point one step above the start
        self.command_wait(&format!(":FREQ:START {}", sweep.start_hz - sweep.step_hz))
            .await?;
        self.command_wait(&format!(":FREQ:STOP {}", sweep.stop_hz))
            .await?;
        self.command_wait(&format!(":SWE:STEP:LIN {}", sweep.step_hz))
            .await?;

        if let Some(power) = power_dbm {
            self.command_wait(&format!(":POW {power:.2}")).await?;
        }
        self.command_wait("TRIG:FSW:SOUR EXT").await?;

        info!(
            "[{}] sweep configured: {} Hz -> {} Hz, step {} Hz",
            self.id, sweep.start_hz, sweep.stop_hz, sweep.step_hz
        );
        Ok(())
    }

    /// Switch on the output in sweep mode. No-op when already sweeping.
    pub async fn sweep_on(&mut self) -> ActuatorResult<()> {
        let (mode, is_running) = self.status().await?;
        if is_running {
            if mode == SourceMode::Sweep {
                return Ok(());
            }
            self.off().await?;
        }
        if mode != SourceMode::Sweep {
            self.command_wait(":FREQ:MODE SWEEP").await?;
        }
        self.command_wait(":OUTP:STAT ON").await
    }

    /// Abort the running sweep and rewind to the start frequency.
    pub async fn reset_sweep_position(&mut self) -> ActuatorResult<()> {
        self.command_wait(":ABOR:SWE").await
    }

    /// Set the external trigger edge for sweep and list stepping.
    pub async fn set_trigger_edge(&mut self, edge: TriggerEdge) -> ActuatorResult<()> {
        let (_, is_running) = self.status().await?;
        if is_running {
            self.off().await?;
        }
        self.command_wait(&format!(":TRIG1:SLOP {}", edge.as_scpi()))
            .await
    }

    /// Read back the external trigger edge.
    pub async fn trigger_edge(&mut self) -> ActuatorResult<TriggerEdge> {
        let response = self.query(":TRIG1:SLOP?").await?;
        TriggerEdge::from_scpi(&response)
    }
}

fn csv(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn csv_fmt(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.2}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockMwAdapter;

    async fn open_source() -> (MwSource, MockMwAdapter) {
        let mock = MockMwAdapter::new();
        let mut source = MwSource::new(
            "mw_test",
            Box::new(mock.clone()),
            Duration::from_secs(1),
        );
        source.open().await.unwrap();
        (source, mock)
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(SourceMode::from_scpi("CW").unwrap(), SourceMode::Cw);
        assert_eq!(SourceMode::from_scpi("cw\n").unwrap(), SourceMode::Cw);
        assert_eq!(SourceMode::from_scpi("SWE").unwrap(), SourceMode::Sweep);
        assert_eq!(SourceMode::from_scpi("list").unwrap(), SourceMode::List);
        assert!(SourceMode::from_scpi("garbage").is_err());
    }

    #[tokio::test]
    async fn test_open_identifies_model() {
        let (source, _mock) = open_source().await;
        assert_eq!(source.model(), "SMB100A");
        assert!(source.is_open());
    }

    #[tokio::test]
    async fn test_open_failure_is_connection_error() {
        let mock = MockMwAdapter::new();
        mock.inject_next_failure();
        let mut source = MwSource::new("mw_test", Box::new(mock), Duration::from_secs(1));
        let err = source.open().await.unwrap_err();
        assert!(matches!(err, ActuatorError::Connection(_)));
    }

    #[tokio::test]
    async fn test_set_cw_round_trip() {
        let (mut source, mock) = open_source().await;
        source.set_cw(Some(2.87e9), Some(-10.0)).await.unwrap();
        source.cw_on().await.unwrap();

        assert_eq!(mock.frequency_hz(), 2.87e9);
        assert_eq!(mock.power_dbm(), -10.0);
        assert!(mock.output_on());

        let reading = source.frequency().await.unwrap();
        assert_eq!(reading, FrequencyReading::Cw(2.87e9));
        assert_eq!(source.power().await.unwrap(), -10.0);
    }

    #[tokio::test]
    async fn test_off_when_already_off_sends_nothing() {
        let (mut source, mock) = open_source().await;
        source.off().await.unwrap();
        assert!(!mock
            .call_log()
            .iter()
            .any(|entry| entry.contains("OUTP:STAT OFF")));
    }

    #[tokio::test]
    async fn test_cw_on_is_idempotent() {
        let (mut source, mock) = open_source().await;
        source.cw_on().await.unwrap();
        let commands_before = mock.call_log().len();
        source.cw_on().await.unwrap();
        // second call only checks status, sends no OUTP:STAT ON
        let new_entries = &mock.call_log()[commands_before..];
        assert!(!new_entries.iter().any(|e| e.contains("OUTP:STAT ON")));
    }

    #[tokio::test]
    async fn test_sweep_configuration_and_readback() {
        let (mut source, _mock) = open_source().await;
        let sweep = SweepSettings {
            start_hz: 1.0e9,
            stop_hz: 2.0e9,
            step_hz: 1.0e6,
        };
        source.set_sweep(sweep, Some(-5.0)).await.unwrap();
        source.sweep_on().await.unwrap();

        let reading = source.frequency().await.unwrap();
        assert_eq!(reading, FrequencyReading::Sweep(sweep));
    }

    #[tokio::test]
    async fn test_sweep_rejects_bad_span() {
        let (mut source, _mock) = open_source().await;
        let inverted = SweepSettings {
            start_hz: 2.0e9,
            stop_hz: 1.0e9,
            step_hz: 1.0e6,
        };
        assert!(matches!(
            source.set_sweep(inverted, None).await,
            Err(ActuatorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_list_round_trip() {
        let (mut source, _mock) = open_source().await;
        let freqs = [1.0e9, 1.5e9, 2.0e9];
        source.set_list(&freqs, &[-20.0]).await.unwrap();
        source.list_on().await.unwrap();

        match source.frequency().await.unwrap() {
            FrequencyReading::List(read) => assert_eq!(read, freqs),
            other => panic!("expected list reading, got {other:?}"),
        }
        assert_eq!(source.list_powers().await.unwrap(), vec![-20.0; 3]);
    }

    #[tokio::test]
    async fn test_list_rejects_mismatched_lengths() {
        let (mut source, _mock) = open_source().await;
        let result = source.set_list(&[1.0e9, 2.0e9], &[-10.0, -9.0, -8.0]).await;
        assert!(matches!(result, Err(ActuatorError::Config(_))));
    }

    #[tokio::test]
    async fn test_trigger_edge_round_trip() {
        let (mut source, _mock) = open_source().await;
        source.set_trigger_edge(TriggerEdge::Falling).await.unwrap();
        assert_eq!(source.trigger_edge().await.unwrap(), TriggerEdge::Falling);
        source.set_trigger_edge(TriggerEdge::Rising).await.unwrap();
        assert_eq!(source.trigger_edge().await.unwrap(), TriggerEdge::Rising);
    }

    #[tokio::test]
    async fn test_query_timeout_does_not_hang() {
        let (mut source, mock) = open_source().await;
        mock.inject_next_hang();
        let err = source.cw_frequency().await.unwrap_err();
        assert!(matches!(err, ActuatorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut source, _mock) = open_source().await;
        source.close().await.unwrap();
        source.close().await.unwrap();
        assert!(!source.is_open());

        let err = source.cw_frequency().await.unwrap_err();
        assert!(matches!(err, ActuatorError::NotConnected));
    }
}
