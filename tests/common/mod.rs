// Synthetic IBT files for integration tests and benches
//
// Layout written by `IbtBuilder::write`:
//   [telemetry header | disk header | channel table | session info | records]

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};
use tempfile::TempDir;

pub const CHAR: i32 = 0;
pub const BOOL: i32 = 1;
pub const INT: i32 = 2;
pub const BITFIELD: i32 = 3;
pub const FLOAT: i32 = 4;
pub const DOUBLE: i32 = 5;

pub const SESSION_INFO: &str = "---\nWeekendInfo:\n TrackName: spa up\n TrackDisplayName: Circuit de Spa-Francorchamps\nSessionInfo:\n Sessions:\n - SessionNum: 0\n   SessionType: Offline Testing\nDriverInfo:\n Drivers:\n - CarScreenName: Mazda MX-5 Cup\n";

#[derive(Clone, Debug)]
pub struct Channel {
    pub name: String,
    pub var_type: i32,
    pub count: i32,
}

impl Channel {
    pub fn new(name: &str, var_type: i32) -> Self {
        Self {
            name: name.to_string(),
            var_type,
            count: 1,
        }
    }

    fn width(&self) -> usize {
        let element = match self.var_type {
            CHAR | BOOL => 1,
            DOUBLE => 8,
            _ => 4,
        };
        element * self.count as usize
    }
}

/// Channels the analysis pipeline needs, typed the way the sim writes them.
pub fn required_channels() -> Vec<Channel> {
    vec![
        Channel::new("SessionTime", DOUBLE),
        Channel::new("Lap", INT),
        Channel::new("LapDistPct", FLOAT),
        Channel::new("LapLastLapTime", FLOAT),
        Channel::new("LapCompleted", INT),
        Channel::new("PlayerIncidents", INT),
    ]
}

pub fn motion_channels() -> Vec<Channel> {
    vec![
        Channel::new("Speed", FLOAT),
        Channel::new("YawRate", FLOAT),
        Channel::new("SteeringWheelAngle", FLOAT),
        Channel::new("IsOnTrack", BOOL),
    ]
}

pub fn full_channels() -> Vec<Channel> {
    let mut channels = required_channels();
    channels.extend(motion_channels());
    channels
}

/// Values of one record, looked up by channel name when written.
#[derive(Clone, Debug)]
pub struct Row {
    pub session_time: f64,
    pub lap: i32,
    pub lap_dist_pct: f32,
    pub last_lap_time: f32,
    pub lap_completed: i32,
    pub player_incidents: i32,
    pub best_lap_time: f32,
    pub speed: f32,
    pub yaw_rate: f32,
    pub steering_wheel_angle: f32,
    pub is_on_track: bool,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            session_time: 0.,
            lap: 1,
            lap_dist_pct: 0.,
            last_lap_time: 0.,
            lap_completed: 0,
            player_incidents: 0,
            best_lap_time: 0.,
            speed: 40.,
            yaw_rate: 0.,
            steering_wheel_angle: 0.,
            is_on_track: true,
        }
    }
}

impl Row {
    fn value(&self, name: &str) -> f64 {
        match name {
            "SessionTime" => self.session_time,
            "Lap" => f64::from(self.lap),
            "LapDistPct" => f64::from(self.lap_dist_pct),
            "LapLastLapTime" => f64::from(self.last_lap_time),
            "LapCompleted" => f64::from(self.lap_completed),
            "PlayerIncidents" => f64::from(self.player_incidents),
            "LapBestLapTime" => f64::from(self.best_lap_time),
            "Speed" => f64::from(self.speed),
            "YawRate" => f64::from(self.yaw_rate),
            "SteeringWheelAngle" => f64::from(self.steering_wheel_angle),
            "IsOnTrack" => {
                if self.is_on_track {
                    1.
                } else {
                    0.
                }
            }
            _ => 0.,
        }
    }
}

/// Clean laps driven back to back at `tick_rate`.
///
/// Each lap's samples run from distance 0 up to just short of 1; the first
/// sample of the next lap carries the increment and the finished lap's time.
pub fn clean_laps(lap_times: &[f64], tick_rate: f64) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut lap_start = 0.;
    let mut last_lap_time = 0.;
    for (i, lap_time) in lap_times.iter().enumerate() {
        let ticks = (lap_time * tick_rate).round() as usize;
        for tick in 0..ticks {
            let elapsed = tick as f64 / tick_rate;
            rows.push(Row {
                session_time: lap_start + elapsed,
                lap: i as i32 + 1,
                lap_dist_pct: (elapsed / lap_time) as f32,
                last_lap_time: last_lap_time as f32,
                lap_completed: i as i32,
                ..Default::default()
            });
        }
        lap_start += lap_time;
        last_lap_time = *lap_time;
    }
    // closing sample on the line so the final lap is complete
    rows.push(Row {
        session_time: lap_start,
        lap: lap_times.len() as i32 + 1,
        lap_dist_pct: 0.,
        last_lap_time: last_lap_time as f32,
        lap_completed: lap_times.len() as i32,
        ..Default::default()
    });
    rows
}

pub struct IbtBuilder {
    pub version: i32,
    pub tick_rate: i32,
    pub channels: Vec<Channel>,
    pub rows: Vec<Row>,
    /// Declared record count; defaults to the number of rows
    pub record_count: Option<i32>,
    /// Bytes of an extra, incomplete record appended after the rows
    pub partial_tail: usize,
    pub session_info: String,
    pub session_lap_count: i32,
}

impl Default for IbtBuilder {
    fn default() -> Self {
        Self {
            version: 2,
            tick_rate: 60,
            channels: full_channels(),
            rows: Vec::new(),
            record_count: None,
            partial_tail: 0,
            session_info: SESSION_INFO.to_string(),
            session_lap_count: 0,
        }
    }
}

impl IbtBuilder {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn record_len(&self) -> usize {
        self.channels.iter().map(Channel::width).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header_len = 112 + 32;
        let table_len = self.channels.len() * 144;
        let session_info_offset = header_len + table_len;
        let record_offset = session_info_offset + self.session_info.len();
        let record_len = self.record_len();

        let mut out: Vec<u8> = Vec::new();
        let mut header = [0i32; 28];
        header[0] = self.version;
        header[1] = 1;
        header[2] = self.tick_rate;
        header[4] = self.session_info.len() as i32;
        header[5] = session_info_offset as i32;
        header[6] = self.channels.len() as i32;
        header[7] = header_len as i32;
        header[8] = 1;
        header[9] = record_len as i32;
        header[12] = self.rows.len() as i32;
        header[13] = record_offset as i32;
        for value in header {
            out.write_i32::<LittleEndian>(value).unwrap();
        }

        let first_time = self.rows.first().map_or(0., |r| r.session_time);
        let last_time = self.rows.last().map_or(0., |r| r.session_time);
        out.write_i64::<LittleEndian>(1_700_000_000).unwrap();
        out.write_f64::<LittleEndian>(first_time).unwrap();
        out.write_f64::<LittleEndian>(last_time).unwrap();
        out.write_i32::<LittleEndian>(self.session_lap_count).unwrap();
        out.write_i32::<LittleEndian>(self.record_count.unwrap_or(self.rows.len() as i32))
            .unwrap();

        let mut offset = 0;
        for channel in &self.channels {
            out.write_i32::<LittleEndian>(channel.var_type).unwrap();
            out.write_i32::<LittleEndian>(offset as i32).unwrap();
            out.write_i32::<LittleEndian>(channel.count).unwrap();
            out.write_all(&[0u8; 4]).unwrap();
            write_fixed(&mut out, &channel.name, 32);
            write_fixed(&mut out, &format!("{} channel", channel.name), 64);
            write_fixed(&mut out, "", 32);
            offset += channel.width();
        }

        out.write_all(self.session_info.as_bytes()).unwrap();

        for row in &self.rows {
            for channel in &self.channels {
                let value = row.value(&channel.name);
                for _ in 0..channel.count {
                    write_value(&mut out, channel.var_type, value);
                }
            }
        }
        out.extend(std::iter::repeat_n(0u8, self.partial_tail.min(record_len)));
        out
    }

    /// Writes the file into `dir` and returns its path.
    pub fn write(&self, dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }
}

fn write_fixed(out: &mut Vec<u8>, value: &str, len: usize) {
    let mut raw = vec![0u8; len];
    let bytes = value.as_bytes();
    let n = bytes.len().min(len - 1);
    raw[..n].copy_from_slice(&bytes[..n]);
    out.write_all(&raw).unwrap();
}

fn write_value(out: &mut Vec<u8>, var_type: i32, value: f64) {
    match var_type {
        CHAR | BOOL => out.write_u8(value as u8).unwrap(),
        INT => out.write_i32::<LittleEndian>(value as i32).unwrap(),
        BITFIELD => out.write_u32::<LittleEndian>(value as u32).unwrap(),
        FLOAT => out.write_f32::<LittleEndian>(value as f32).unwrap(),
        _ => out.write_f64::<LittleEndian>(value).unwrap(),
    }
}
