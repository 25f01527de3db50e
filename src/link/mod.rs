//! The control-and-telemetry link
//!
//! - [`wire`]: fixed-length frame codec
//! - [`session`]: one connection, its role and lifecycle
//! - [`reconnect`]: operator-side reconnection policy

pub mod reconnect;
pub mod session;
pub mod wire;

pub use reconnect::{Backoff, PolicyState, ReconnectPolicy};
pub use session::{ConnectOptions, LinkListener, LinkSession, LinkState, Role};
