//! Simulated RAT for running the device endpoint without hardware
//!
//! Integrates each command as one motion step along a straight tube and
//! reports telemetry in the layout the firmware uses:
//!
//! - **Sensor**: distance to the tube end in millimetres, big-endian u32
//! - **Status**: `[flags, speed, yaw / 5, pitch / 5]` with flags bit0 =
//!   moving, bit1 = reversing, bit2 = scanning

use crate::core::collaborators::{CommandSink, SensorSource};
use crate::core::types::{
    CommandWord, DIR_BACKWARD, DIR_FORWARD, PITCH_DOWN, PITCH_UP, SEQ_SCAN, SPEED_DEC, SPEED_INC,
    TelemetryFrame, YAW_LEFT, YAW_RIGHT,
};
use crate::error::Result;

/// Highest speed level
pub const MAX_SPEED: u8 = 10;
/// Camera step per command, degrees
pub const CAMERA_STEP_DEG: i16 = 5;
/// Camera travel limit, degrees
pub const CAMERA_LIMIT_DEG: i16 = 90;
/// Distance covered per command per speed level
pub const STEP_MM_PER_SPEED: u32 = 10;

pub const STATUS_MOVING: u8 = 0x01;
pub const STATUS_REVERSING: u8 = 0x02;
pub const STATUS_SCANNING: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Drive {
    #[default]
    Stopped,
    Forward,
    Backward,
}

/// Simulated device state
#[derive(Debug, Clone)]
pub struct SimulatedRat {
    tube_length_mm: u32,
    position_mm: u32,
    drive: Drive,
    speed: u8,
    yaw_deg: i16,
    pitch_deg: i16,
    scanning: bool,
    scans: u32,
    commands: u64,
}

impl SimulatedRat {
    /// RAT at the mouth of a tube of the given length
    pub fn new(tube_length_mm: u32) -> Self {
        Self {
            tube_length_mm,
            position_mm: 0,
            drive: Drive::Stopped,
            speed: 0,
            yaw_deg: 0,
            pitch_deg: 0,
            scanning: false,
            scans: 0,
            commands: 0,
        }
    }

    pub fn position_mm(&self) -> u32 {
        self.position_mm
    }

    pub fn drive(&self) -> Drive {
        self.drive
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Camera (yaw, pitch) in degrees
    pub fn camera(&self) -> (i16, i16) {
        (self.yaw_deg, self.pitch_deg)
    }

    /// Scan sequences started
    pub fn scans(&self) -> u32 {
        self.scans
    }

    /// Commands applied
    pub fn commands(&self) -> u64 {
        self.commands
    }

    fn step_camera(angle: i16, cmd: CommandWord, positive: u16, negative: u16) -> i16 {
        let delta = match (cmd.contains(positive), cmd.contains(negative)) {
            (true, false) => CAMERA_STEP_DEG,
            (false, true) => -CAMERA_STEP_DEG,
            _ => 0,
        };
        (angle + delta).clamp(-CAMERA_LIMIT_DEG, CAMERA_LIMIT_DEG)
    }

    fn advance(&mut self) {
        let step = u32::from(self.speed) * STEP_MM_PER_SPEED;
        self.position_mm = match self.drive {
            Drive::Stopped => self.position_mm,
            Drive::Forward => (self.position_mm + step).min(self.tube_length_mm),
            Drive::Backward => self.position_mm.saturating_sub(step),
        };
    }

    fn status_flags(&self) -> u8 {
        let mut flags = 0;
        if self.drive != Drive::Stopped && self.speed > 0 {
            flags |= STATUS_MOVING;
        }
        if self.drive == Drive::Backward {
            flags |= STATUS_REVERSING;
        }
        if self.scanning {
            flags |= STATUS_SCANNING;
        }
        flags
    }
}

impl Default for SimulatedRat {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CommandSink for SimulatedRat {
    fn apply_command(&mut self, cmd: CommandWord) -> Result<()> {
        self.commands += 1;

        // Conflicting drive flags stop the RAT
        self.drive = match (cmd.contains(DIR_FORWARD), cmd.contains(DIR_BACKWARD)) {
            (true, false) => Drive::Forward,
            (false, true) => Drive::Backward,
            _ => Drive::Stopped,
        };

        match (cmd.contains(SPEED_INC), cmd.contains(SPEED_DEC)) {
            (true, false) => self.speed = (self.speed + 1).min(MAX_SPEED),
            (false, true) => self.speed = self.speed.saturating_sub(1),
            _ => {}
        }

        self.yaw_deg = Self::step_camera(self.yaw_deg, cmd, YAW_RIGHT, YAW_LEFT);
        self.pitch_deg = Self::step_camera(self.pitch_deg, cmd, PITCH_UP, PITCH_DOWN);

        let scan = cmd.contains(SEQ_SCAN);
        if scan && !self.scanning {
            self.scans += 1;
            log::info!("Scan sequence #{} started at {} mm", self.scans, self.position_mm);
        }
        self.scanning = scan;

        self.advance();
        log::debug!(
            "Applied {}: drive={:?} speed={} camera=({}, {}) position={} mm",
            cmd,
            self.drive,
            self.speed,
            self.yaw_deg,
            self.pitch_deg,
            self.position_mm
        );
        Ok(())
    }
}

impl SensorSource for SimulatedRat {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame> {
        let distance = self.tube_length_mm - self.position_mm;
        let status = [
            self.status_flags(),
            self.speed,
            (self.yaw_deg / CAMERA_STEP_DEG) as i8 as u8,
            (self.pitch_deg / CAMERA_STEP_DEG) as i8 as u8,
        ];
        Ok(TelemetryFrame::new(distance.to_be_bytes(), status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Action;

    fn apply(rat: &mut SimulatedRat, word: CommandWord) -> TelemetryFrame {
        rat.apply_command(word).unwrap();
        rat.read_telemetry().unwrap()
    }

    #[test]
    fn test_idle_rat_reports_full_tube() {
        let mut rat = SimulatedRat::new(2_000);
        let frame = apply(&mut rat, CommandWord::IDLE);
        assert_eq!(frame.sensor_u32(), 2_000);
        assert_eq!(frame.status, [0, 0, 0, 0]);
    }

    #[test]
    fn test_forward_motion_shortens_distance() {
        let mut rat = SimulatedRat::new(1_000);
        let word = CommandWord::IDLE.apply(Action::Forward).apply(Action::SpeedUp);

        apply(&mut rat, word); // speed 1
        let frame = apply(&mut rat, word); // speed 2

        assert_eq!(rat.speed(), 2);
        assert_eq!(rat.position_mm(), 30);
        assert_eq!(frame.sensor_u32(), 970);
        assert_eq!(frame.status[0], STATUS_MOVING);
        assert_eq!(frame.status[1], 2);
    }

    #[test]
    fn test_position_is_clamped_to_tube() {
        let mut rat = SimulatedRat::new(50);
        let word = CommandWord::IDLE.apply(Action::Forward).apply(Action::SpeedUp);
        for _ in 0..MAX_SPEED + 5 {
            apply(&mut rat, word);
        }
        assert_eq!(rat.speed(), MAX_SPEED);
        assert_eq!(rat.read_telemetry().unwrap().sensor_u32(), 0);

        let back = word.apply(Action::Backward);
        for _ in 0..5 {
            apply(&mut rat, back);
        }
        assert_eq!(rat.position_mm(), 0);
        assert_eq!(
            rat.read_telemetry().unwrap().status[0],
            STATUS_MOVING | STATUS_REVERSING
        );
    }

    #[test]
    fn test_conflicting_drive_stops() {
        let mut rat = SimulatedRat::default();
        apply(&mut rat, CommandWord::from_bits(DIR_FORWARD | SPEED_INC));
        apply(&mut rat, CommandWord::from_bits(DIR_FORWARD | DIR_BACKWARD));
        assert_eq!(rat.drive(), Drive::Stopped);
        assert_eq!(rat.speed(), 1);
    }

    #[test]
    fn test_camera_steps_and_limits() {
        let mut rat = SimulatedRat::default();
        for _ in 0..30 {
            apply(&mut rat, CommandWord::from_bits(YAW_LEFT | PITCH_UP));
        }
        let frame = apply(&mut rat, CommandWord::IDLE);
        assert_eq!(rat.camera(), (-CAMERA_LIMIT_DEG, CAMERA_LIMIT_DEG));
        assert_eq!(frame.status[2] as i8, -18);
        assert_eq!(frame.status[3] as i8, 18);
    }

    #[test]
    fn test_scan_counted_once_per_trigger() {
        let mut rat = SimulatedRat::default();
        let scan = CommandWord::IDLE.apply(Action::Scan);

        let frame = apply(&mut rat, scan);
        assert_eq!(frame.status[0] & STATUS_SCANNING, STATUS_SCANNING);
        apply(&mut rat, scan.apply(Action::YawRight));
        assert_eq!(rat.scans(), 1);

        apply(&mut rat, CommandWord::IDLE);
        apply(&mut rat, scan);
        assert_eq!(rat.scans(), 2);
        assert_eq!(rat.commands(), 4);
    }
}
