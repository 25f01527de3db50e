//! The two roles on either end of the link
//!
//! - [`device`]: accepts one operator at a time and answers every command
//!   with telemetry
//! - [`operator`]: owns the command word and drives send/receive cycles

pub mod device;
pub mod operator;

pub use device::{DeviceEndpoint, DeviceStats, SessionEnd};
pub use operator::OperatorEndpoint;
