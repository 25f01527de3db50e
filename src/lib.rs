//! RAT link - control and telemetry link for a pipe-inspection robot
//!
//! The operator sends a 2-byte command word; the device applies it and
//! answers with two 4-byte telemetry frames. One exchange at a time, over
//! a single TCP connection.
//!
//! ```text
//! Operator                         Device
//!    │ ── command (2 bytes, BE) ──▶  │ apply (CommandSink)
//!    │                               │ sample (SensorSource)
//!    │ ◀── sensor (4 bytes) ──────── │
//!    │ ◀── status (4 bytes) ──────── │
//! ```

pub mod config;
pub mod core;
pub mod devices;
pub mod endpoint;
pub mod error;
pub mod link;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::collaborators::{CommandSink, LogPresentation, PresentationSink, SensorSource};
pub use crate::core::types::{Action, CommandWord, TelemetryFrame};
pub use endpoint::{DeviceEndpoint, OperatorEndpoint};
pub use error::{Error, Result};
pub use link::{ConnectOptions, LinkSession, PolicyState, ReconnectPolicy};
