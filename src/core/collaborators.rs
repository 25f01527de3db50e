//! Traits for the collaborators on either side of the link

use crate::core::types::{CommandWord, TelemetryFrame};
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Device-side actuator control
pub trait CommandSink: Send {
    /// Apply a received command word to the device
    fn apply_command(&mut self, cmd: CommandWord) -> Result<()>;
}

/// Device-side sensor sampling
pub trait SensorSource: Send {
    /// Sample sensors for one request/response cycle
    ///
    /// Must always return both payloads.
    fn read_telemetry(&mut self) -> Result<TelemetryFrame>;
}

/// Operator-side UI update hooks
pub trait PresentationSink {
    /// Telemetry arrived for the last command
    fn on_telemetry(&mut self, frame: &TelemetryFrame);

    /// The in-memory command word changed
    fn on_command_changed(&mut self, cmd: CommandWord);
}

// A single device object usually acts as both sink and source; sharing it
// behind a mutex lets the endpoint own one handle for each role.

impl<T: CommandSink> CommandSink for Arc<Mutex<T>> {
    fn apply_command(&mut self, cmd: CommandWord) -> Result<()> {
        self.lock().apply_command(cmd)
    }
}

impl<T: SensorSource> SensorSource for Arc<Mutex<T>> {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame> {
        self.lock().read_telemetry()
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn apply_command(&mut self, cmd: CommandWord) -> Result<()> {
        (**self).apply_command(cmd)
    }
}

impl<T: SensorSource + ?Sized> SensorSource for Box<T> {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame> {
        (**self).read_telemetry()
    }
}

/// Presentation sink that writes everything to the log
#[derive(Debug, Default)]
pub struct LogPresentation;

impl PresentationSink for LogPresentation {
    fn on_telemetry(&mut self, frame: &TelemetryFrame) {
        log::info!(
            "Telemetry: sensor={:02x?} status={:02x?}",
            frame.sensor,
            frame.status
        );
    }

    fn on_command_changed(&mut self, cmd: CommandWord) {
        log::info!("Command: {} ({:#06x})", cmd, cmd.bits());
    }
}
