//! Core data types for commands and telemetry.
//!
//! - [`CommandWord`]: 16-bit flag word sent operator -> device
//! - [`Action`]: one discrete operator input, applied with [`CommandWord::apply`]
//! - [`TelemetryFrame`]: sensor + status payloads sent device -> operator

use std::fmt;
use std::str::FromStr;

/// Reverse drive
pub const DIR_BACKWARD: u16 = 0x0001;
/// Forward drive
pub const DIR_FORWARD: u16 = 0x0002;
/// Increase drive speed
pub const SPEED_INC: u16 = 0x0004;
/// Decrease drive speed
pub const SPEED_DEC: u16 = 0x0008;
/// Rotate camera right
pub const YAW_RIGHT: u16 = 0x0010;
/// Rotate camera left
pub const YAW_LEFT: u16 = 0x0020;
/// Tilt camera up
pub const PITCH_UP: u16 = 0x0040;
/// Tilt camera down
pub const PITCH_DOWN: u16 = 0x0080;
/// Start a scan sequence
pub const SEQ_SCAN: u16 = 0x0100;

/// All defined flag bits
pub const KNOWN_BITS: u16 = 0x01FF;

/// Flag names in bit order, used for display
const FLAG_NAMES: [(u16, &str); 9] = [
    (DIR_BACKWARD, "BACKWARD"),
    (DIR_FORWARD, "FORWARD"),
    (SPEED_INC, "SPEED_INC"),
    (SPEED_DEC, "SPEED_DEC"),
    (YAW_RIGHT, "YAW_RIGHT"),
    (YAW_LEFT, "YAW_LEFT"),
    (PITCH_UP, "PITCH_UP"),
    (PITCH_DOWN, "PITCH_DOWN"),
    (SEQ_SCAN, "SEQ_SCAN"),
];

/// Group of mutually exclusive flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Drive,
    Speed,
    Yaw,
    Pitch,
    Scan,
}

impl Axis {
    /// Every axis in flag order
    pub const ALL: [Axis; 5] = [Axis::Drive, Axis::Speed, Axis::Yaw, Axis::Pitch, Axis::Scan];

    /// Bits belonging to this axis
    pub const fn mask(self) -> u16 {
        match self {
            Axis::Drive => DIR_BACKWARD | DIR_FORWARD,
            Axis::Speed => SPEED_INC | SPEED_DEC,
            Axis::Yaw => YAW_RIGHT | YAW_LEFT,
            Axis::Pitch => PITCH_UP | PITCH_DOWN,
            Axis::Scan => SEQ_SCAN,
        }
    }
}

/// A discrete operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Forward,
    Backward,
    SpeedUp,
    SpeedDown,
    YawRight,
    YawLeft,
    PitchUp,
    PitchDown,
    Scan,
}

impl Action {
    /// Every action in flag order
    pub const ALL: [Action; 9] = [
        Action::Backward,
        Action::Forward,
        Action::SpeedUp,
        Action::SpeedDown,
        Action::YawRight,
        Action::YawLeft,
        Action::PitchUp,
        Action::PitchDown,
        Action::Scan,
    ];

    /// Flag this action sets
    pub const fn flag(self) -> u16 {
        match self {
            Action::Backward => DIR_BACKWARD,
            Action::Forward => DIR_FORWARD,
            Action::SpeedUp => SPEED_INC,
            Action::SpeedDown => SPEED_DEC,
            Action::YawRight => YAW_RIGHT,
            Action::YawLeft => YAW_LEFT,
            Action::PitchUp => PITCH_UP,
            Action::PitchDown => PITCH_DOWN,
            Action::Scan => SEQ_SCAN,
        }
    }

    /// Axis this action belongs to
    pub const fn axis(self) -> Axis {
        match self {
            Action::Backward | Action::Forward => Axis::Drive,
            Action::SpeedUp | Action::SpeedDown => Axis::Speed,
            Action::YawRight | Action::YawLeft => Axis::Yaw,
            Action::PitchUp | Action::PitchDown => Axis::Pitch,
            Action::Scan => Axis::Scan,
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Action::Forward),
            "backward" => Ok(Action::Backward),
            "faster" | "speed-up" => Ok(Action::SpeedUp),
            "slower" | "speed-down" => Ok(Action::SpeedDown),
            "yaw-right" => Ok(Action::YawRight),
            "yaw-left" => Ok(Action::YawLeft),
            "pitch-up" => Ok(Action::PitchUp),
            "pitch-down" => Ok(Action::PitchDown),
            "scan" => Ok(Action::Scan),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// 16-bit command word exchanged on the wire
///
/// Any `u16` is representable so that a received word is passed on exactly
/// as sent. Words built through [`CommandWord::apply`] are always resolved:
/// no axis carries both of its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandWord(u16);

impl CommandWord {
    /// No flags set
    pub const IDLE: CommandWord = CommandWord(0);

    /// Wrap raw bits without any resolution
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether `flag` is set
    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    /// Apply one operator action
    ///
    /// The action's flag is set and its partner on the same axis cleared;
    /// other axes are untouched. A scan replaces the whole word.
    #[must_use]
    pub const fn apply(self, action: Action) -> Self {
        match action {
            Action::Scan => Self(SEQ_SCAN),
            _ => {
                let axis = action.axis().mask();
                Self((self.0 & !axis) | action.flag())
            }
        }
    }

    /// Axes with both flags set
    pub fn conflicting_axes(self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|axis| axis.mask().count_ones() > 1 && self.0 & axis.mask() == axis.mask())
            .collect()
    }

    /// True when no axis has both flags set
    pub fn is_resolved(self) -> bool {
        self.conflicting_axes().is_empty()
    }

    /// Bits outside the defined flag set
    pub const fn unknown_bits(self) -> u16 {
        self.0 & !KNOWN_BITS
    }
}

impl fmt::Display for CommandWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "IDLE");
        }
        let mut first = true;
        for (flag, name) in FLAG_NAMES {
            if self.0 & flag != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if self.unknown_bits() != 0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{:#06x}", self.unknown_bits())?;
        }
        Ok(())
    }
}

impl From<u16> for CommandWord {
    fn from(bits: u16) -> Self {
        Self(bits)
    }
}

impl From<CommandWord> for u16 {
    fn from(word: CommandWord) -> Self {
        word.0
    }
}

/// Size of each telemetry payload in bytes
pub const TELEMETRY_FIELD_LEN: usize = 4;

/// Sensor and status payloads produced by the device for one cycle
///
/// Payload encodings belong to the device firmware; the link treats them as
/// opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TelemetryFrame {
    pub sensor: [u8; TELEMETRY_FIELD_LEN],
    pub status: [u8; TELEMETRY_FIELD_LEN],
}

impl TelemetryFrame {
    /// Create from raw payloads
    pub const fn new(sensor: [u8; TELEMETRY_FIELD_LEN], status: [u8; TELEMETRY_FIELD_LEN]) -> Self {
        Self { sensor, status }
    }

    /// Sensor payload read as a big-endian u32
    pub const fn sensor_u32(&self) -> u32 {
        u32::from_be_bytes(self.sensor)
    }

    /// Status payload read as a big-endian u32
    pub const fn status_u32(&self) -> u32 {
        u32::from_be_bytes(self.status)
    }
}
