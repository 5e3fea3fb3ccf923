//! Actuator control for Rohde & Schwarz lab instruments.
//!
//! This library exposes SMA/SMB-series microwave sources (CW frequency and
//! power) and HMP-series power supplies (channel voltage) as actuators: values
//! a host DAQ framework can move and read back through the
//! [`actuator::Actuator`] trait. Instrument I/O goes through the
//! [`adapters::ScpiAdapter`] seam, with a VISA implementation behind the
//! `instrument_visa` feature and mock adapters for hardware-free testing.
//!
//! # Data Flow
//!
//! ```text
//! Host framework → Actuator::move_abs/current_value → MwSource/Hmp2030
//!                → ScpiAdapter (VISA or mock) → instrument → response
//! ```

pub mod actuator;
pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;

pub use error::{ActuatorError, ActuatorResult};
