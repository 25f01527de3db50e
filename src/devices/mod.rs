//! Device implementations

pub mod simulated;

pub use simulated::SimulatedRat;
