pub mod header;
pub mod reader;
pub mod session_info;

use serde::{Deserialize, Serialize};

use crate::LapscopeError;

pub use header::{DiskHeader, TelemetryHeader};
pub use reader::{IbtReader, RecordCursor, Samples};
pub use session_info::SessionInfo;

pub const SESSION_TIME: &str = "SessionTime";
pub const LAP: &str = "Lap";
pub const LAP_DIST_PCT: &str = "LapDistPct";
pub const LAP_LAST_LAP_TIME: &str = "LapLastLapTime";
pub const LAP_COMPLETED: &str = "LapCompleted";
pub const PLAYER_INCIDENTS: &str = "PlayerIncidents";
/// Optional; the session best the sim reports
pub const LAP_BEST_LAP_TIME: &str = "LapBestLapTime";

pub const SPEED: &str = "Speed";
pub const YAW_RATE: &str = "YawRate";
pub const STEERING_WHEEL_ANGLE: &str = "SteeringWheelAngle";
pub const IS_ON_TRACK: &str = "IsOnTrack";

/// Channels every file must carry before any sample is decoded.
pub const REQUIRED_CHANNELS: [&str; 6] = [
    SESSION_TIME,
    LAP,
    LAP_DIST_PCT,
    LAP_LAST_LAP_TIME,
    LAP_COMPLETED,
    PLAYER_INCIDENTS,
];

/// Channels the incident detector reads on top of the required ones.
pub const MOTION_CHANNELS: [&str; 4] = [SPEED, YAW_RATE, STEERING_WHEEL_ANGLE, IS_ON_TRACK];

/// Scalar type of a channel as stored in the descriptor table.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VarType {
    Char,
    Bool,
    Int,
    Bitfield,
    Float,
    Double,
}

impl VarType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(VarType::Char),
            1 => Some(VarType::Bool),
            2 => Some(VarType::Int),
            3 => Some(VarType::Bitfield),
            4 => Some(VarType::Float),
            5 => Some(VarType::Double),
            _ => None,
        }
    }

    /// Width in bytes of a single element.
    pub fn width(&self) -> usize {
        match self {
            VarType::Char | VarType::Bool => 1,
            VarType::Int | VarType::Bitfield | VarType::Float => 4,
            VarType::Double => 8,
        }
    }
}

/// One entry of the channel descriptor table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChannelDescriptor {
    pub name: String,
    pub var_type: VarType,
    /// Byte offset of the channel within a record
    pub offset: usize,
    /// Number of elements (1 for scalars)
    pub count: usize,
    pub count_as_time: bool,
    pub description: String,
    pub unit: String,
}

impl ChannelDescriptor {
    /// Total bytes the channel occupies inside a record.
    pub fn byte_len(&self) -> usize {
        self.var_type.width() * self.count
    }

    /// Decodes the full value of this channel from a record.
    ///
    /// The caller guarantees `record` is at least `offset + byte_len()` long,
    /// which the reader validates once when opening the file.
    pub fn decode(&self, record: &[u8]) -> ChannelValue {
        let raw = &record[self.offset..self.offset + self.byte_len()];
        if self.var_type == VarType::Char {
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            return ChannelValue::Char(String::from_utf8_lossy(&raw[..end]).into_owned());
        }
        if self.count == 1 {
            return decode_element(self.var_type, raw);
        }
        ChannelValue::Array(
            raw.chunks_exact(self.var_type.width())
                .map(|chunk| decode_element(self.var_type, chunk))
                .collect(),
        )
    }

    /// Decodes the first element of this channel as a number.
    pub fn decode_scalar(&self, record: &[u8]) -> f64 {
        let width = self.var_type.width();
        let raw = &record[self.offset..self.offset + width];
        decode_element(self.var_type, raw).as_f64().unwrap_or(0.)
    }
}

fn decode_element(var_type: VarType, raw: &[u8]) -> ChannelValue {
    use byteorder::{ByteOrder, LittleEndian};

    match var_type {
        VarType::Char => ChannelValue::Char(String::from_utf8_lossy(raw).into_owned()),
        VarType::Bool => ChannelValue::Bool(raw[0] != 0),
        VarType::Int => ChannelValue::Int(LittleEndian::read_i32(raw)),
        VarType::Bitfield => ChannelValue::Bitfield(LittleEndian::read_u32(raw)),
        VarType::Float => ChannelValue::Float(LittleEndian::read_f32(raw)),
        VarType::Double => ChannelValue::Double(LittleEndian::read_f64(raw)),
    }
}

/// A decoded channel value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ChannelValue {
    Char(String),
    Bool(bool),
    Int(i32),
    Bitfield(u32),
    Float(f32),
    Double(f64),
    Array(Vec<ChannelValue>),
}

impl ChannelValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Bool(v) => Some(if *v { 1. } else { 0. }),
            ChannelValue::Int(v) => Some(f64::from(*v)),
            ChannelValue::Bitfield(v) => Some(f64::from(*v)),
            ChannelValue::Float(v) => Some(f64::from(*v)),
            ChannelValue::Double(v) => Some(*v),
            ChannelValue::Char(_) | ChannelValue::Array(_) => None,
        }
    }
}

/// Vehicle motion channels used by the incident detector
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Motion {
    /// Speed, m/s
    pub speed: f32,
    /// Yaw change rate (rad/s)
    pub yaw_rate: f32,
    /// Steering wheel angle (rad)
    pub steering_wheel_angle: f32,
    pub is_on_track: bool,
}

/// Channel values decoded from a single record.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Index of the record this sample was decoded from
    pub tick: usize,
    /// Seconds since session start
    pub session_time: f64,
    /// Lap number
    pub lap: i32,
    /// Percentage distance around lap, normalized into [0, 1)
    pub lap_dist_pct: f32,
    /// Players last lap time as reported by the sim
    pub last_lap_time: f32,
    /// Players best lap time so far; 0 when the file lacks the channel
    pub best_lap_time: f32,
    /// Laps completed counter
    pub lap_completed: i32,
    /// Incident points counter
    pub player_incidents: i32,
    /// Only present when the file carries every motion channel
    pub motion: Option<Motion>,
}

/// Folds any reported lap distance into [0, 1).
///
/// The sim reports -1 while the car is not in the world and exactly 1.0 at
/// the line on some tracks.
pub fn normalize_lap_dist_pct(raw: f32) -> f32 {
    if !raw.is_finite() {
        return 0.;
    }
    let wrapped = raw.rem_euclid(1.);
    if wrapped >= 1. { 0. } else { wrapped }
}

pub(crate) fn require_channel<'a>(
    channels: &'a [ChannelDescriptor],
    name: &str,
) -> Result<&'a ChannelDescriptor, LapscopeError> {
    channels
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| LapscopeError::MissingChannel {
            channels: vec![name.to_string()],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn descriptor(var_type: VarType, offset: usize, count: usize) -> ChannelDescriptor {
        ChannelDescriptor {
            name: "Test".to_string(),
            var_type,
            offset,
            count,
            count_as_time: false,
            description: String::new(),
            unit: String::new(),
        }
    }

    #[test]
    fn test_decode_scalars() {
        let mut record = vec![0u8; 24];
        record[0..4].copy_from_slice(&42i32.to_le_bytes());
        record[4..8].copy_from_slice(&0.25f32.to_le_bytes());
        record[8..16].copy_from_slice(&1234.5f64.to_le_bytes());
        record[16] = 1;

        assert_eq!(descriptor(VarType::Int, 0, 1).decode(&record), ChannelValue::Int(42));
        assert_eq!(
            descriptor(VarType::Float, 4, 1).decode(&record),
            ChannelValue::Float(0.25)
        );
        assert_eq!(descriptor(VarType::Double, 8, 1).decode_scalar(&record), 1234.5);
        assert_eq!(descriptor(VarType::Bool, 16, 1).decode_scalar(&record), 1.);
    }

    #[test]
    fn test_decode_array_and_char() {
        let mut record = vec![0u8; 16];
        record[0..4].copy_from_slice(&1.5f32.to_le_bytes());
        record[4..8].copy_from_slice(&(-2.5f32).to_le_bytes());
        record[8..11].copy_from_slice(b"abc");

        assert_eq!(
            descriptor(VarType::Float, 0, 2).decode(&record),
            ChannelValue::Array(vec![ChannelValue::Float(1.5), ChannelValue::Float(-2.5)])
        );
        assert_eq!(
            descriptor(VarType::Char, 8, 8).decode(&record),
            ChannelValue::Char("abc".to_string())
        );
        assert_eq!(descriptor(VarType::Char, 8, 8).decode(&record).as_f64(), None);
    }

    #[test]
    fn test_normalize_edges() {
        assert_eq!(normalize_lap_dist_pct(1.0), 0.);
        assert_eq!(normalize_lap_dist_pct(-1.0), 0.);
        assert_eq!(normalize_lap_dist_pct(f32::NAN), 0.);
        assert_eq!(normalize_lap_dist_pct(0.42), 0.42);
    }

    proptest! {
        #[test]
        fn test_normalized_pct_in_unit_range(raw in proptest::num::f32::ANY) {
            let pct = normalize_lap_dist_pct(raw);
            prop_assert!((0. ..1.).contains(&pct));
        }
    }
}
