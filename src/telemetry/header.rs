// Fixed-layout IBT headers

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use super::{ChannelDescriptor, VarType};
use crate::LapscopeError;

pub const TELEMETRY_HEADER_LEN: usize = 112;
pub const DISK_HEADER_LEN: usize = 32;
pub const CHANNEL_DESCRIPTOR_LEN: usize = 144;
/// iRacing SDK header versions this reader understands
pub const SUPPORTED_VERSIONS: [i32; 2] = [1, 2];

const MAX_BUFFERS: usize = 4;
const NAME_LEN: usize = 32;
const DESC_LEN: usize = 64;
const UNIT_LEN: usize = 32;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VarBuffer {
    pub tick_count: i32,
    pub buf_offset: i32,
}

/// Primary header at the start of every IBT file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TelemetryHeader {
    pub version: i32,
    pub status: i32,
    /// Samples per second
    pub tick_rate: i32,
    pub session_info_update: i32,
    pub session_info_len: i32,
    pub session_info_offset: i32,
    /// Number of channel descriptors
    pub num_vars: i32,
    pub var_header_offset: i32,
    pub num_buf: i32,
    /// Length of one record in bytes
    pub buf_len: i32,
    pub var_buffers: [VarBuffer; MAX_BUFFERS],
}

impl TelemetryHeader {
    pub fn parse(raw: &[u8; TELEMETRY_HEADER_LEN]) -> Result<Self, LapscopeError> {
        let mut cursor = Cursor::new(&raw[..]);
        let mut ints = [0i32; TELEMETRY_HEADER_LEN / 4];
        cursor
            .read_i32_into::<LittleEndian>(&mut ints)
            .map_err(|e| LapscopeError::FileRead { source: e })?;

        let mut var_buffers = [VarBuffer::default(); MAX_BUFFERS];
        for (i, buffer) in var_buffers.iter_mut().enumerate() {
            let base = 12 + i * 4;
            *buffer = VarBuffer {
                tick_count: ints[base],
                buf_offset: ints[base + 1],
            };
        }

        let header = Self {
            version: ints[0],
            status: ints[1],
            tick_rate: ints[2],
            session_info_update: ints[3],
            session_info_len: ints[4],
            session_info_offset: ints[5],
            num_vars: ints[6],
            var_header_offset: ints[7],
            num_buf: ints[8],
            buf_len: ints[9],
            var_buffers,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), LapscopeError> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(LapscopeError::format(format!(
                "unsupported header version {}",
                self.version
            )));
        }
        if self.num_vars <= 0 {
            return Err(LapscopeError::format("file declares no channels"));
        }
        if self.buf_len <= 0 {
            return Err(LapscopeError::format("file declares an empty record length"));
        }
        if self.var_header_offset < 0 || self.record_offset() < 0 {
            return Err(LapscopeError::format("negative section offset"));
        }
        if self.session_info_offset < 0 || self.session_info_len < 0 {
            return Err(LapscopeError::format("negative session info bounds"));
        }
        Ok(())
    }

    /// Byte offset of the first record.
    pub fn record_offset(&self) -> i64 {
        i64::from(self.var_buffers[0].buf_offset)
    }

    pub fn record_len(&self) -> usize {
        self.buf_len as usize
    }

    pub fn channel_count(&self) -> usize {
        self.num_vars as usize
    }
}

/// Secondary header written only in recorded (disk) files.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DiskHeader {
    /// Unix timestamp of the recording start
    pub start_time: i64,
    pub session_start_time: f64,
    pub session_end_time: f64,
    pub session_lap_count: i32,
    /// Number of records declared; may exceed what a truncated file holds
    pub record_count: i32,
}

impl DiskHeader {
    pub fn parse(raw: &[u8; DISK_HEADER_LEN]) -> Result<Self, LapscopeError> {
        let mut cursor = Cursor::new(&raw[..]);
        let read = |e| LapscopeError::FileRead { source: e };
        Ok(Self {
            start_time: cursor.read_i64::<LittleEndian>().map_err(read)?,
            session_start_time: cursor.read_f64::<LittleEndian>().map_err(read)?,
            session_end_time: cursor.read_f64::<LittleEndian>().map_err(read)?,
            session_lap_count: cursor.read_i32::<LittleEndian>().map_err(read)?,
            record_count: cursor.read_i32::<LittleEndian>().map_err(read)?,
        })
    }
}

/// Parses one 144 byte channel descriptor.
pub fn parse_channel_descriptor(
    raw: &[u8; CHANNEL_DESCRIPTOR_LEN],
) -> Result<ChannelDescriptor, LapscopeError> {
    let mut cursor = Cursor::new(&raw[..]);
    let read = |e| LapscopeError::FileRead { source: e };
    let raw_type = cursor.read_i32::<LittleEndian>().map_err(read)?;
    let offset = cursor.read_i32::<LittleEndian>().map_err(read)?;
    let count = cursor.read_i32::<LittleEndian>().map_err(read)?;
    let count_as_time = cursor.read_i8().map_err(read)? != 0;
    // 3 bytes of padding
    let mut pad = [0u8; 3];
    cursor.read_exact(&mut pad).map_err(read)?;

    let name = read_fixed_str(&mut cursor, NAME_LEN)?;
    let description = read_fixed_str(&mut cursor, DESC_LEN)?;
    let unit = read_fixed_str(&mut cursor, UNIT_LEN)?;

    let var_type = VarType::from_raw(raw_type).ok_or_else(|| {
        LapscopeError::format(format!("unknown type {} for channel {}", raw_type, name))
    })?;
    if offset < 0 || count <= 0 {
        return Err(LapscopeError::format(format!(
            "invalid layout for channel {}: offset {}, count {}",
            name, offset, count
        )));
    }

    Ok(ChannelDescriptor {
        name,
        var_type,
        offset: offset as usize,
        count: count as usize,
        count_as_time,
        description,
        unit,
    })
}

fn read_fixed_str(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String, LapscopeError> {
    let mut buf = vec![0u8; len];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| LapscopeError::FileRead { source: e })?;
    let end = buf.iter().position(|b| *b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}
