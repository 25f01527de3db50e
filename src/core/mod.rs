//! Core abstractions shared by both ends of the link.
//!
//! - [`types`]: Command words, actions and telemetry frames
//! - [`collaborators`]: Traits for the command sink, sensor source and
//!   presentation sink that sit outside the link

pub mod collaborators;
pub mod types;
