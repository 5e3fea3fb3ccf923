//! Mock adapters for testing without hardware.
//!
//! Two simulated instruments implement [`ScpiAdapter`]:
//! - [`MockMwAdapter`] answers the SMA/SMB microwave source command set
//! - [`MockHmpAdapter`] answers the HMP power supply command set
//!
//! Both provide:
//! - Simulated I/O latency
//! - Single-shot failure injection
//! - Single-shot hang injection (for timeout tests)
//! - Call logging for test verification
//!
//! The mocks are `Clone` with shared interior state: tests keep one clone for
//! inspection and hand another to the driver under test.

use crate::adapters::ScpiAdapter;
use crate::error::{ActuatorError, ActuatorResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared test knobs: connection flag, latency, injection, call log.
#[derive(Clone)]
struct MockCore {
    connected: Arc<AtomicBool>,
    latency: Arc<Mutex<Duration>>,
    timeout: Arc<Mutex<Duration>>,
    fail_next: Arc<AtomicBool>,
    hang_next: Arc<AtomicBool>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockCore {
    fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            latency: Arc::new(Mutex::new(Duration::ZERO)),
            timeout: Arc::new(Mutex::new(Duration::from_secs(10))),
            fail_next: Arc::new(AtomicBool::new(false)),
            hang_next: Arc::new(AtomicBool::new(false)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn log(&self, entry: String) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(entry);
        }
    }

    /// Latency, hang and failure checks shared by every operation.
    async fn pre_op(&self, entry: String) -> ActuatorResult<()> {
        self.log(entry);

        if self.hang_next.swap(false, Ordering::SeqCst) {
            // outlives any sane driver timeout; the caller's
            // tokio::time::timeout cancels this future
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let latency = self.latency.lock().map(|l| *l).unwrap_or(Duration::ZERO);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ActuatorError::Transport("Injected failure".to_string()));
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ActuatorError::NotConnected);
        }
        Ok(())
    }
}

/// Strip the optional leading colon and surrounding whitespace.
fn normalize(cmd: &str) -> &str {
    cmd.trim().trim_start_matches(':')
}

/// Parse the first numeric token after the command mnemonic.
fn arg_f64(cmd: &str) -> ActuatorResult<f64> {
    let arg = cmd
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ActuatorError::Transport(format!("Missing argument in '{cmd}'")))?;
    arg.parse::<f64>()
        .map_err(|e| ActuatorError::parse(cmd, e))
}

fn parse_csv_f64(cmd: &str) -> ActuatorResult<Vec<f64>> {
    let (_, args) = cmd
        .split_once(' ')
        .ok_or_else(|| ActuatorError::Transport(format!("Missing argument in '{cmd}'")))?;
    args.split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| ActuatorError::parse(v, e)))
        .collect()
}

fn join_csv(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Microwave source mock
// ============================================================================

/// Simulated SMB100A register file.
#[derive(Debug, Clone)]
struct MwState {
    mode: String,
    output_on: bool,
    freq_hz: f64,
    power_dbm: f64,
    sweep_start_hz: f64,
    sweep_stop_hz: f64,
    sweep_step_hz: f64,
    list_freqs: Vec<f64>,
    list_powers: Vec<f64>,
    trig_slope: String,
}

impl Default for MwState {
    fn default() -> Self {
        // *RST defaults of an SMB100A
        Self {
            mode: "CW".to_string(),
            output_on: false,
            freq_hz: 1.0e9,
            power_dbm: -30.0,
            sweep_start_hz: 1.0e9,
            sweep_stop_hz: 2.0e9,
            sweep_step_hz: 1.0e6,
            list_freqs: Vec::new(),
            list_powers: Vec::new(),
            trig_slope: "POS".to_string(),
        }
    }
}

/// Mock SMA/SMB microwave source.
#[derive(Clone)]
pub struct MockMwAdapter {
    core: MockCore,
    state: Arc<Mutex<MwState>>,
}

impl Default for MockMwAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMwAdapter {
    /// Create a disconnected mock source with *RST defaults.
    pub fn new() -> Self {
        Self {
            core: MockCore::new(),
            state: Arc::new(Mutex::new(MwState::default())),
        }
    }

    /// Set simulated latency applied to every operation.
    pub fn with_latency(self, latency: Duration) -> Self {
        if let Ok(mut l) = self.core.latency.lock() {
            *l = latency;
        }
        self
    }

    /// Fail the next operation with a transport error.
    pub fn inject_next_failure(&self) {
        self.core.fail_next.store(true, Ordering::SeqCst);
    }

    /// Make the next operation hang until cancelled by the caller's timeout.
    pub fn inject_next_hang(&self) {
        self.core.hang_next.store(true, Ordering::SeqCst);
    }

    /// Commands and queries seen so far.
    pub fn call_log(&self) -> Vec<String> {
        self.core.call_log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn state(&self) -> ActuatorResult<std::sync::MutexGuard<'_, MwState>> {
        self.state
            .lock()
            .map_err(|_| ActuatorError::Transport("Mock state poisoned".to_string()))
    }

    /// Current CW frequency register, for test assertions.
    pub fn frequency_hz(&self) -> f64 {
        self.state().map(|s| s.freq_hz).unwrap_or(f64::NAN)
    }

    /// Current power register, for test assertions.
    pub fn power_dbm(&self) -> f64 {
        self.state().map(|s| s.power_dbm).unwrap_or(f64::NAN)
    }

    /// Current RF output state, for test assertions.
    pub fn output_on(&self) -> bool {
        self.state().map(|s| s.output_on).unwrap_or(false)
    }

    /// Current frequency mode ("CW", "SWE" or "LIST"), for test assertions.
    pub fn mode(&self) -> String {
        self.state().map(|s| s.mode.clone()).unwrap_or_default()
    }

    fn apply_write(&self, cmd: &str) -> ActuatorResult<()> {
        let mut state = self.state()?;
        let c = normalize(cmd);

        if c == "*CLS" || c == "*WAI" || c == "SYST:REM" {
            return Ok(());
        }
        if c == "*RST" {
            *state = MwState::default();
            return Ok(());
        }
        if let Some(arg) = c.strip_prefix("FREQ:MODE ") {
            state.mode = match arg.trim() {
                "CW" => "CW".to_string(),
                "SWEEP" | "SWE" => "SWE".to_string(),
                "LIST" => "LIST".to_string(),
                other => {
                    return Err(ActuatorError::Transport(format!(
                        "Unknown frequency mode '{other}'"
                    )))
                }
            };
            return Ok(());
        }
        if let Some(arg) = c.strip_prefix("OUTP:STAT ") {
            state.output_on = arg.trim() == "ON";
            return Ok(());
        }
        if c.starts_with("FREQ:START ") {
            state.sweep_start_hz = arg_f64(c)?;
            return Ok(());
        }
        if c.starts_with("FREQ:STOP ") {
            state.sweep_stop_hz = arg_f64(c)?;
            return Ok(());
        }
        if c.starts_with("SWE:STEP:LIN ") {
            // the mnemonic contains no space, so arg_f64 still splits right
            let (_, arg) = c.split_once(' ').unwrap_or((c, "0"));
            state.sweep_step_hz = arg
                .trim()
                .parse::<f64>()
                .map_err(|e| ActuatorError::parse(c, e))?;
            return Ok(());
        }
        if c.starts_with("FREQ ") {
            state.freq_hz = arg_f64(c)?;
            return Ok(());
        }
        if c.starts_with("POW ") {
            state.power_dbm = arg_f64(c)?;
            return Ok(());
        }
        if c.starts_with("LIST:FREQ ") {
            state.list_freqs = parse_csv_f64(c)?;
            return Ok(());
        }
        if c.starts_with("LIST:POW ") {
            state.list_powers = parse_csv_f64(c)?;
            return Ok(());
        }
        if let Some(arg) = c.strip_prefix("TRIG1:SLOP ") {
            state.trig_slope = arg.trim().to_string();
            return Ok(());
        }
        // accepted configuration writes with no mock-visible effect
        if c.starts_with("LIST:SEL")
            || c == "LIST:MODE STEP"
            || c == "LIST:TRIG:SOUR EXT"
            || c == "LIST:RES"
            || c == "SWE:MODE STEP"
            || c == "SWE:SPAC LIN"
            || c == "TRIG:FSW:SOUR EXT"
            || c == "ABOR:SWE"
        {
            return Ok(());
        }

        Err(ActuatorError::Transport(format!(
            "Mock MW source: unhandled command '{cmd}'"
        )))
    }

    fn answer(&self, cmd: &str) -> ActuatorResult<String> {
        let state = self.state()?;
        let c = normalize(cmd);

        let response = match c {
            "*IDN?" => "Rohde&Schwarz,SMB100A,1406.6000k02/180105,3.1.19.15".to_string(),
            "*OPC?" => "1".to_string(),
            "FREQ:MODE?" => state.mode.clone(),
            "OUTP:STAT?" => {
                if state.output_on {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            "FREQ?" => state.freq_hz.to_string(),
            "POW?" => state.power_dbm.to_string(),
            "FREQ:STAR?" => state.sweep_start_hz.to_string(),
            "FREQ:STOP?" => state.sweep_stop_hz.to_string(),
            "SWE:STEP?" => state.sweep_step_hz.to_string(),
            "LIST:FREQ?" => join_csv(&state.list_freqs),
            "LIST:POW?" => join_csv(&state.list_powers),
            "TRIG1:SLOP?" => state.trig_slope.clone(),
            _ => {
                return Err(ActuatorError::Transport(format!(
                    "Mock MW source: unhandled query '{cmd}'"
                )))
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl ScpiAdapter for MockMwAdapter {
    async fn connect(&mut self) -> ActuatorResult<()> {
        self.core.log("connect".to_string());
        if self.core.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ActuatorError::Connection("Injected failure".to_string()));
        }
        self.core.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> ActuatorResult<()> {
        self.core.log("disconnect".to_string());
        self.core.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&mut self, cmd: &str) -> ActuatorResult<()> {
        self.core.pre_op(format!("write: {cmd}")).await?;
        self.apply_write(cmd)
    }

    async fn query(&mut self, cmd: &str) -> ActuatorResult<String> {
        self.core.pre_op(format!("query: {cmd}")).await?;
        self.answer(cmd)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if let Ok(mut t) = self.core.timeout.lock() {
            *t = timeout;
        }
    }

    fn timeout(&self) -> Duration {
        self.core
            .timeout
            .lock()
            .map(|t| *t)
            .unwrap_or(Duration::from_secs(10))
    }

    fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::SeqCst)
    }

    fn adapter_type(&self) -> &str {
        "mock_mw"
    }
}

// ============================================================================
// Power supply mock
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct HmpChannel {
    voltage_set: f64,
    current_set: f64,
    output_on: bool,
    ovp: f64,
    fuse_on: bool,
}

#[derive(Debug, Clone)]
struct HmpState {
    selected: usize,
    channels: [HmpChannel; 3],
    errors: Vec<String>,
}

impl Default for HmpState {
    fn default() -> Self {
        Self {
            selected: 1,
            channels: [HmpChannel::default(); 3],
            errors: Vec::new(),
        }
    }
}

/// Mock HMP2030 power supply.
#[derive(Clone)]
pub struct MockHmpAdapter {
    core: MockCore,
    state: Arc<Mutex<HmpState>>,
}

impl Default for MockHmpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHmpAdapter {
    /// Create a disconnected mock supply with all outputs off.
    pub fn new() -> Self {
        Self {
            core: MockCore::new(),
            state: Arc::new(Mutex::new(HmpState::default())),
        }
    }

    /// Fail the next operation with a transport error.
    pub fn inject_next_failure(&self) {
        self.core.fail_next.store(true, Ordering::SeqCst);
    }

    /// Commands and queries seen so far.
    pub fn call_log(&self) -> Vec<String> {
        self.core.call_log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn state(&self) -> ActuatorResult<std::sync::MutexGuard<'_, HmpState>> {
        self.state
            .lock()
            .map_err(|_| ActuatorError::Transport("Mock state poisoned".to_string()))
    }

    /// Voltage register of a channel (1-3), for test assertions.
    pub fn voltage_set(&self, channel: usize) -> f64 {
        self.state()
            .map(|s| s.channels[channel - 1].voltage_set)
            .unwrap_or(f64::NAN)
    }

    /// Output state of a channel (1-3), for test assertions.
    pub fn output_on(&self, channel: usize) -> bool {
        self.state()
            .map(|s| s.channels[channel - 1].output_on)
            .unwrap_or(false)
    }

    fn apply_write(&self, cmd: &str) -> ActuatorResult<()> {
        let mut state = self.state()?;
        let c = normalize(cmd);

        if c == "*RST" {
            *state = HmpState::default();
            return Ok(());
        }
        if c == "*CLS" || c == "SYST:REM" || c == "SYST:BEEP" || c == "FUSE ON" {
            if c == "FUSE ON" {
                let sel = state.selected;
                state.channels[sel - 1].fuse_on = true;
            }
            return Ok(());
        }
        if let Some(arg) = c.strip_prefix("INST OUT") {
            let channel: usize = arg
                .trim()
                .parse()
                .map_err(|e| ActuatorError::parse(c, e))?;
            if !(1..=3).contains(&channel) {
                state.errors.push(format!("invalid channel {channel}"));
                return Err(ActuatorError::Transport(format!(
                    "Mock HMP: invalid channel {channel}"
                )));
            }
            state.selected = channel;
            return Ok(());
        }
        if c.starts_with("VOLT:PROT ") {
            let sel = state.selected;
            let (_, arg) = c.split_once(' ').unwrap_or((c, "0"));
            state.channels[sel - 1].ovp = arg
                .trim()
                .parse::<f64>()
                .map_err(|e| ActuatorError::parse(c, e))?;
            return Ok(());
        }
        if c.starts_with("VOLT ") {
            let sel = state.selected;
            state.channels[sel - 1].voltage_set = arg_f64(c)?;
            return Ok(());
        }
        if c.starts_with("CURR ") {
            let sel = state.selected;
            state.channels[sel - 1].current_set = arg_f64(c)?;
            return Ok(());
        }
        if let Some(arg) = c.strip_prefix("OUTP ") {
            let sel = state.selected;
            state.channels[sel - 1].output_on = arg.trim() == "ON";
            return Ok(());
        }

        Err(ActuatorError::Transport(format!(
            "Mock HMP: unhandled command '{cmd}'"
        )))
    }

    fn answer(&self, cmd: &str) -> ActuatorResult<String> {
        let mut state = self.state()?;
        let c = normalize(cmd);
        let sel = state.selected;

        let response = match c {
            "*IDN?" => "ROHDE&SCHWARZ,HMP2030,104402,HW50020001/SW2.40".to_string(),
            "*OPC?" => "1".to_string(),
            "INST:NSEL?" => sel.to_string(),
            "VOLT?" => state.channels[sel - 1].voltage_set.to_string(),
            "CURR?" => state.channels[sel - 1].current_set.to_string(),
            // measured values track the setpoint when the output is on
            "MEAS:VOLT?" => {
                let ch = state.channels[sel - 1];
                if ch.output_on { ch.voltage_set } else { 0.0 }.to_string()
            }
            "MEAS:CURR?" => {
                let ch = state.channels[sel - 1];
                if ch.output_on { ch.current_set } else { 0.0 }.to_string()
            }
            "SYST:ERR?" => match state.errors.pop() {
                Some(err) => format!("-100,\"{err}\""),
                None => "0,\"No error\"".to_string(),
            },
            _ => {
                if let Some(rest) = c.strip_prefix("STAT:QUES:INST:ISUM") {
                    // constant-voltage condition for every channel
                    let _channel = rest.trim_end_matches(":COND?");
                    "2".to_string()
                } else {
                    return Err(ActuatorError::Transport(format!(
                        "Mock HMP: unhandled query '{cmd}'"
                    )));
                }
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl ScpiAdapter for MockHmpAdapter {
    async fn connect(&mut self) -> ActuatorResult<()> {
        self.core.log("connect".to_string());
        if self.core.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ActuatorError::Connection("Injected failure".to_string()));
        }
        self.core.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> ActuatorResult<()> {
        self.core.log("disconnect".to_string());
        self.core.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&mut self, cmd: &str) -> ActuatorResult<()> {
        self.core.pre_op(format!("write: {cmd}")).await?;
        self.apply_write(cmd)
    }

    async fn query(&mut self, cmd: &str) -> ActuatorResult<String> {
        self.core.pre_op(format!("query: {cmd}")).await?;
        self.answer(cmd)
    }

    fn set_timeout(&mut self, timeout: Duration) {
        if let Ok(mut t) = self.core.timeout.lock() {
            *t = timeout;
        }
    }

    fn timeout(&self) -> Duration {
        self.core
            .timeout
            .lock()
            .map(|t| *t)
            .unwrap_or(Duration::from_secs(10))
    }

    fn is_connected(&self) -> bool {
        self.core.connected.load(Ordering::SeqCst)
    }

    fn adapter_type(&self) -> &str {
        "mock_hmp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mw_mock_requires_connection() {
        let mut adapter = MockMwAdapter::new();
        let result = adapter.query("*IDN?").await;
        assert!(matches!(result, Err(ActuatorError::NotConnected)));
    }

    #[tokio::test]
    async fn test_mw_mock_identify() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        let idn = adapter.query("*IDN?").await.unwrap();
        assert!(idn.contains("SMB100A"));
    }

    #[tokio::test]
    async fn test_mw_mock_frequency_round_trip() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        adapter.write(":FREQ 2870000000").await.unwrap();
        let response = adapter.query(":FREQ?").await.unwrap();
        assert_eq!(response.parse::<f64>().unwrap(), 2.87e9);
    }

    #[tokio::test]
    async fn test_mw_mock_mode_and_output() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        assert_eq!(adapter.query("OUTP:STAT?").await.unwrap(), "0");

        adapter.write(":FREQ:MODE SWEEP").await.unwrap();
        assert_eq!(adapter.query(":FREQ:MODE?").await.unwrap(), "SWE");

        adapter.write(":OUTP:STAT ON").await.unwrap();
        assert_eq!(adapter.query("OUTP:STAT?").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_mw_mock_rst_restores_defaults() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        adapter.write(":FREQ 5e9").await.unwrap();
        adapter.write("*RST").await.unwrap();
        assert_eq!(adapter.frequency_hz(), 1.0e9);
        assert!(!adapter.output_on());
    }

    #[tokio::test]
    async fn test_mw_mock_list_round_trip() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        adapter
            .write("LIST:FREQ 1000000000, 2000000000, 3000000000")
            .await
            .unwrap();
        let freqs = adapter.query(":LIST:FREQ?").await.unwrap();
        assert_eq!(freqs, "1000000000,2000000000,3000000000");
    }

    #[tokio::test]
    async fn test_mw_mock_failure_injection_is_single_shot() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        adapter.inject_next_failure();
        assert!(adapter.query("*IDN?").await.is_err());
        assert!(adapter.query("*IDN?").await.is_ok());
    }

    #[tokio::test]
    async fn test_mw_mock_unknown_command_rejected() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        assert!(adapter.write(":BOGUS 12").await.is_err());
        assert!(adapter.query(":BOGUS?").await.is_err());
    }

    #[tokio::test]
    async fn test_mw_mock_call_log() {
        let mut adapter = MockMwAdapter::new();
        adapter.connect().await.unwrap();
        adapter.write("*CLS").await.unwrap();
        adapter.query("*OPC?").await.unwrap();
        let log = adapter.call_log();
        assert_eq!(log, vec!["connect", "write: *CLS", "query: *OPC?"]);
    }

    #[tokio::test]
    async fn test_hmp_mock_channel_select_and_voltage() {
        let mut adapter = MockHmpAdapter::new();
        adapter.connect().await.unwrap();
        adapter.write("INST OUT2").await.unwrap();
        assert_eq!(adapter.query("INST:NSEL?").await.unwrap(), "2");

        adapter.write("VOLT 12.5").await.unwrap();
        assert_eq!(adapter.voltage_set(2), 12.5);
        assert_eq!(adapter.voltage_set(1), 0.0);
    }

    #[tokio::test]
    async fn test_hmp_mock_measured_voltage_follows_output() {
        let mut adapter = MockHmpAdapter::new();
        adapter.connect().await.unwrap();
        adapter.write("VOLT 5.0").await.unwrap();
        assert_eq!(adapter.query("MEAS:VOLT?").await.unwrap(), "0");

        adapter.write("OUTP ON").await.unwrap();
        assert_eq!(adapter.query("MEAS:VOLT?").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn test_hmp_mock_invalid_channel() {
        let mut adapter = MockHmpAdapter::new();
        adapter.connect().await.unwrap();
        assert!(adapter.write("INST OUT4").await.is_err());
        let err = adapter.query("SYST:ERR?").await.unwrap();
        assert!(err.contains("invalid channel"));
    }
}
