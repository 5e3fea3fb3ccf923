//! VISA adapter for GPIB/USB/Ethernet/serial instruments.
//!
//! Wraps the `visa-rs` crate behind the [`ScpiAdapter`] trait. VISA calls are
//! synchronous, so every exchange runs on Tokio's blocking thread pool to keep
//! the async runtime responsive.
//!
//! Supports resource strings like:
//! - "GPIB0::28::INSTR" (GPIB interface)
//! - "TCPIP0::192.168.1.50::INSTR" (Ethernet/LXI)
//! - "ASRL3::INSTR" (serial, used by the HMP supplies)

use crate::adapters::ScpiAdapter;
use crate::config::ConnectionConfig;
use crate::error::{ActuatorError, ActuatorResult};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use visa_rs::{DefaultRM, Instrument, VISA};

/// VISA transport session for one instrument.
pub struct VisaAdapter {
    /// VISA resource string (e.g. "TCPIP0::192.168.1.50::INSTR")
    resource: String,

    /// Read/write timeout
    timeout: Duration,

    /// Line terminator appended to every command ("\n" for SCPI)
    line_terminator: String,

    /// Open VISA session, behind Arc<Mutex> so blocking tasks can borrow it
    instrument: Option<Arc<Mutex<Box<dyn Instrument>>>>,
}

impl VisaAdapter {
    /// Create an unconnected adapter from host-supplied connection parameters.
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            resource: config.resource.clone(),
            timeout: config.timeout,
            line_terminator: "\n".to_string(),
            instrument: None,
        }
    }

    /// Override the line terminator (some serial instruments want "\r\n").
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    fn session(&self) -> ActuatorResult<Arc<Mutex<Box<dyn Instrument>>>> {
        self.instrument.clone().ok_or(ActuatorError::NotConnected)
    }
}

#[async_trait]
impl ScpiAdapter for VisaAdapter {
    async fn connect(&mut self) -> ActuatorResult<()> {
        let resource = self.resource.clone();
        let timeout_ms = self.timeout.as_millis() as u32;

        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new()
                .map_err(|e| ActuatorError::Connection(format!("VISA resource manager: {e}")))?;
            let instr = rm.open(&resource, timeout_ms, 0).map_err(|e| {
                ActuatorError::Connection(format!("Failed to open VISA resource '{resource}': {e}"))
            })?;
            Ok::<Box<dyn Instrument>, ActuatorError>(instr)
        })
        .await
        .map_err(|e| ActuatorError::Connection(format!("VISA open task panicked: {e}")))??;

        self.instrument = Some(Arc::new(Mutex::new(instrument)));
        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            self.resource,
            self.timeout.as_millis()
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> ActuatorResult<()> {
        if self.instrument.take().is_some() {
            debug!("VISA resource '{}' closed", self.resource);
        }
        Ok(())
    }

    async fn write(&mut self, cmd: &str) -> ActuatorResult<()> {
        let session = self.session()?;
        let payload = format!("{}{}", cmd, self.line_terminator);
        let cmd_for_log = cmd.to_string();
        let timeout_ms = self.timeout.as_millis() as u32;

        tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            guard
                .set_timeout(timeout_ms)
                .map_err(|e| ActuatorError::Transport(format!("Failed to set VISA timeout: {e}")))?;
            guard.write(&payload).map_err(|e| {
                ActuatorError::Transport(format!("VISA write failed for '{cmd_for_log}': {e}"))
            })?;
            debug!("VISA write sent: {}", cmd_for_log.trim());
            Ok(())
        })
        .await
        .map_err(|e| ActuatorError::Transport(format!("VISA write task panicked: {e}")))?
    }

    async fn query(&mut self, cmd: &str) -> ActuatorResult<String> {
        let session = self.session()?;
        let payload = format!("{}{}", cmd, self.line_terminator);
        let cmd_for_log = cmd.to_string();
        let timeout_ms = self.timeout.as_millis() as u32;

        tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            guard
                .set_timeout(timeout_ms)
                .map_err(|e| ActuatorError::Transport(format!("Failed to set VISA timeout: {e}")))?;
            let response = guard.query(&payload).map_err(|e| {
                ActuatorError::Transport(format!("VISA query failed for '{cmd_for_log}': {e}"))
            })?;
            let response = response.trim().to_string();
            debug!("VISA query '{}' -> '{}'", cmd_for_log.trim(), response);
            Ok(response)
        })
        .await
        .map_err(|e| ActuatorError::Transport(format!("VISA query task panicked: {e}")))?
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_connected(&self) -> bool {
        self.instrument.is_some()
    }

    fn adapter_type(&self) -> &str {
        "visa"
    }

    fn info(&self) -> String {
        format!(
            "VisaAdapter({} @ {}ms timeout)",
            self.resource,
            self.timeout.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(resource: &str) -> ConnectionConfig {
        ConnectionConfig {
            resource: resource.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_visa_adapter_creation() {
        let adapter = VisaAdapter::new(&config("GPIB0::28::INSTR"));
        assert_eq!(adapter.adapter_type(), "visa");
        assert!(!adapter.is_connected());
        assert_eq!(adapter.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_line_terminator_override() {
        let adapter =
            VisaAdapter::new(&config("ASRL3::INSTR")).with_line_terminator("\r\n");
        assert_eq!(adapter.line_terminator, "\r\n");
    }

    #[test]
    fn test_info_string() {
        let adapter = VisaAdapter::new(&config("TCPIP0::192.168.1.50::INSTR"));
        let info = adapter.info();
        assert!(info.contains("TCPIP0::192.168.1.50::INSTR"));
        assert!(info.contains("5000ms"));
    }
}
