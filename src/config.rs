//! Configuration loading using Figment.
//!
//! Strongly-typed settings loaded from:
//! 1. `rsmw.toml` (base configuration)
//! 2. Environment variables (prefixed with `RSMW_`)
//!
//! The crate treats these values as opaque host-supplied input: connection
//! parameters, timeouts, and instrument bounds come from here, never from
//! hard-coded assumptions inside the drivers.
//!
//! # Example
//!
//! ```toml
//! [mw_source.connection]
//! resource = "TCPIP0::192.168.1.50::INSTR"
//! timeout = "10s"
//!
//! [mw_source]
//! min_frequency_hz = 9e3
//! max_frequency_hz = 6e9
//! default_power_dbm = -10.0
//!
//! [power_supply.connection]
//! resource = "ASRL3::INSTR"
//!
//! [power_supply]
//! channel = 2
//! voltage_max = 32.0
//! ```
//!
//! Environment overrides use double underscores for nesting:
//!
//! ```text
//! RSMW_MW_SOURCE__MAX_FREQUENCY_HZ=3e9
//! RSMW_POWER_SUPPLY__CHANNEL=3
//! ```

use crate::error::{ActuatorError, ActuatorResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Transport session parameters for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// VISA resource string (e.g. "TCPIP0::192.168.1.50::INSTR",
    /// "GPIB0::28::INSTR", "ASRL3::INSTR")
    #[serde(default)]
    pub resource: String,
    /// Bounded I/O timeout for every command/query
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            resource: String::new(),
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> Duration {
    // matches the original wrapper's 10 s VISA timeout
    Duration::from_secs(10)
}

/// SMA/SMB microwave source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MwSourceConfig {
    /// Transport session parameters
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Lower frequency bound in Hz
    #[serde(default = "default_min_frequency")]
    pub min_frequency_hz: f64,
    /// Upper frequency bound in Hz
    #[serde(default = "default_max_frequency")]
    pub max_frequency_hz: f64,
    /// Power applied when none is specified, in dBm
    #[serde(default)]
    pub default_power_dbm: f64,
    /// Reporting resolution used to decide that a move settled, in Hz
    #[serde(default = "default_epsilon")]
    pub epsilon_hz: f64,
}

impl Default for MwSourceConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            min_frequency_hz: default_min_frequency(),
            max_frequency_hz: default_max_frequency(),
            default_power_dbm: 0.0,
            epsilon_hz: default_epsilon(),
        }
    }
}

fn default_min_frequency() -> f64 {
    9.0e3
}

fn default_max_frequency() -> f64 {
    // SMB100A upper limit; SMA100B models reach higher and override this
    6.0e9
}

fn default_epsilon() -> f64 {
    0.01
}

/// HMP power supply settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSupplyConfig {
    /// Transport session parameters
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Output channel driven by the actuator (1-3 on the HMP2030)
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Maximum voltage per channel, in V
    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,
    /// Maximum current per channel, in A
    #[serde(default = "default_current_max")]
    pub current_max: f64,
}

impl Default for PowerSupplyConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            channel: default_channel(),
            voltage_max: default_voltage_max(),
            current_max: default_current_max(),
        }
    }
}

fn default_channel() -> u8 {
    1
}

fn default_voltage_max() -> f64 {
    32.0
}

fn default_current_max() -> f64 {
    5.0
}

/// Top-level settings for the crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// SMA/SMB microwave source
    #[serde(default)]
    pub mw_source: MwSourceConfig,
    /// HMP power supply
    #[serde(default)]
    pub power_supply: PowerSupplyConfig,
}

impl Settings {
    /// Load settings from `rsmw.toml` and `RSMW_` environment variables.
    pub fn load() -> ActuatorResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file("rsmw.toml")))
    }

    /// Load settings from an explicit TOML file plus environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> ActuatorResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> ActuatorResult<Self> {
        let settings: Settings = figment
            .merge(Env::prefixed("RSMW_").split("__"))
            .extract()
            .map_err(|e| ActuatorError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation of values that parse but are logically wrong.
    pub fn validate(&self) -> ActuatorResult<()> {
        if self.mw_source.min_frequency_hz >= self.mw_source.max_frequency_hz {
            return Err(ActuatorError::Config(format!(
                "Frequency bounds inverted: min {} Hz >= max {} Hz",
                self.mw_source.min_frequency_hz, self.mw_source.max_frequency_hz
            )));
        }
        if self.mw_source.min_frequency_hz < 0.0 {
            return Err(ActuatorError::Config(format!(
                "Negative frequency bound: {} Hz",
                self.mw_source.min_frequency_hz
            )));
        }
        if self.mw_source.epsilon_hz <= 0.0 {
            return Err(ActuatorError::Config(format!(
                "Epsilon must be positive: {} Hz",
                self.mw_source.epsilon_hz
            )));
        }
        if self.mw_source.connection.timeout.is_zero()
            || self.power_supply.connection.timeout.is_zero()
        {
            return Err(ActuatorError::Config("Timeout must be non-zero".into()));
        }
        if !(1..=3).contains(&self.power_supply.channel) {
            return Err(ActuatorError::Config(format!(
                "Invalid power supply channel {}. Choose 1, 2 or 3.",
                self.power_supply.channel
            )));
        }
        if self.power_supply.voltage_max <= 0.0 || self.power_supply.current_max <= 0.0 {
            return Err(ActuatorError::Config(
                "Power supply limits must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.mw_source.min_frequency_hz, 9.0e3);
        assert_eq!(settings.mw_source.max_frequency_hz, 6.0e9);
        assert_eq!(settings.mw_source.epsilon_hz, 0.01);
        assert_eq!(settings.mw_source.connection.timeout, Duration::from_secs(10));
        assert_eq!(settings.power_supply.channel, 1);
        assert_eq!(settings.power_supply.voltage_max, 32.0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [mw_source.connection]
            resource = "TCPIP0::192.168.1.50::INSTR"
            timeout = "2s"

            [mw_source]
            max_frequency_hz = 3.0e9
            default_power_dbm = -10.0

            [power_supply]
            channel = 2
            "#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(
            settings.mw_source.connection.resource,
            "TCPIP0::192.168.1.50::INSTR"
        );
        assert_eq!(settings.mw_source.connection.timeout, Duration::from_secs(2));
        assert_eq!(settings.mw_source.max_frequency_hz, 3.0e9);
        assert_eq!(settings.mw_source.default_power_dbm, -10.0);
        // unspecified values keep their defaults
        assert_eq!(settings.mw_source.min_frequency_hz, 9.0e3);
        assert_eq!(settings.power_supply.channel, 2);
    }

    #[test]
    fn test_toml_snippet_parses_standalone() {
        let config: MwSourceConfig = toml::from_str(
            r#"
            min_frequency_hz = 1.0e6
            max_frequency_hz = 2.0e9
            "#,
        )
        .unwrap();
        assert_eq!(config.min_frequency_hz, 1.0e6);
        assert_eq!(config.max_frequency_hz, 2.0e9);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut settings = Settings::default();
        settings.mw_source.min_frequency_hz = 7.0e9;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ActuatorError::Config(_)));
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut settings = Settings::default();
        settings.power_supply.channel = 4;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut settings = Settings::default();
        settings.mw_source.connection.timeout = Duration::ZERO;
        assert!(settings.validate().is_err());
    }
}
