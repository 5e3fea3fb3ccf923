//! Instrument command layers.
//!
//! Thin drivers translating typed operations into the SCPI command set of a
//! specific instrument family. Each driver exclusively owns its
//! [`crate::adapters::ScpiAdapter`] session and bounds every exchange with the
//! configured timeout.

pub mod hmp2030;
pub mod mw_source;

pub use hmp2030::Hmp2030;
pub use mw_source::{FrequencyReading, MwSource, SourceMode, SweepSettings, TriggerEdge};
