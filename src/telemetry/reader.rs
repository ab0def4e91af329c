// IBT file reader
//
// Headers, the channel table and the session-info block are decoded eagerly in
// `IbtReader::open`. Records are streamed lazily: each call to `samples()` or
// `read_channel()` opens its own handle and seeks to the record buffer.

use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use super::{
    ChannelDescriptor, ChannelValue, Motion, REQUIRED_CHANNELS, Sample, SessionInfo,
    header::{
        CHANNEL_DESCRIPTOR_LEN, DISK_HEADER_LEN, DiskHeader, TELEMETRY_HEADER_LEN,
        TelemetryHeader, parse_channel_descriptor,
    },
    normalize_lap_dist_pct, require_channel,
};
use crate::LapscopeError;

pub struct IbtReader {
    path: PathBuf,
    header: TelemetryHeader,
    disk_header: DiskHeader,
    channels: Vec<ChannelDescriptor>,
    session_info_raw: String,
    session_info: SessionInfo,
}

impl IbtReader {
    /// Opens an IBT file and decodes everything before the record buffer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LapscopeError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| LapscopeError::FileOpen {
            path: path.clone(),
            source: e,
        })?;
        let file_len = file
            .metadata()
            .map_err(|e| LapscopeError::FileRead { source: e })?
            .len();
        let min_len = (TELEMETRY_HEADER_LEN + DISK_HEADER_LEN) as u64;
        if file_len < min_len {
            return Err(LapscopeError::format(format!(
                "file is {} bytes, shorter than the {} byte header",
                file_len, min_len
            )));
        }

        let mut source = BufReader::new(file);
        let mut raw_header = [0u8; TELEMETRY_HEADER_LEN];
        source
            .read_exact(&mut raw_header)
            .map_err(|e| LapscopeError::FileRead { source: e })?;
        let header = TelemetryHeader::parse(&raw_header)?;

        let mut raw_disk_header = [0u8; DISK_HEADER_LEN];
        source
            .read_exact(&mut raw_disk_header)
            .map_err(|e| LapscopeError::FileRead { source: e })?;
        let disk_header = DiskHeader::parse(&raw_disk_header)?;

        let channels = read_channel_table(&mut source, &header, file_len)?;
        let session_info_raw = read_session_info(&mut source, &header, file_len)?;
        let session_info = SessionInfo::parse(&session_info_raw);

        debug!(
            "Opened {:?}: version {}, {} channels, {} byte records at offset {}, {} records declared",
            path,
            header.version,
            channels.len(),
            header.buf_len,
            header.record_offset(),
            disk_header.record_count
        );

        Ok(Self {
            path,
            header,
            disk_header,
            channels,
            session_info_raw,
            session_info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &TelemetryHeader {
        &self.header
    }

    pub fn disk_header(&self) -> &DiskHeader {
        &self.disk_header
    }

    /// Channel descriptors in file order.
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.session_info
    }

    pub fn session_info_raw(&self) -> &str {
        &self.session_info_raw
    }

    /// Names from `names` that this file does not carry.
    pub fn missing_channels(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.channel(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_motion_channels(&self) -> bool {
        self.missing_channels(&super::MOTION_CHANNELS).is_empty()
    }

    /// Starts a new pass over the records, decoding one `Sample` per record.
    ///
    /// Fails before reading any record if a required channel is absent.
    pub fn samples(&self) -> Result<Samples, LapscopeError> {
        let missing = self.missing_channels(&REQUIRED_CHANNELS);
        if !missing.is_empty() {
            return Err(LapscopeError::MissingChannel { channels: missing });
        }
        let layout = RecordLayout::new(&self.channels)?;
        if layout.motion.is_none() {
            warn!(
                "{:?} lacks motion channels ({}), incidents will not be detected",
                self.path,
                self.missing_channels(&super::MOTION_CHANNELS).join(", ")
            );
        }
        Ok(Samples {
            records: self.records()?,
            layout,
        })
    }

    /// Decodes every complete record's value for a single channel.
    pub fn read_channel(&self, name: &str) -> Result<Vec<ChannelValue>, LapscopeError> {
        let descriptor = require_channel(&self.channels, name)?.clone();
        let mut records = self.records()?;
        let mut values = Vec::new();
        while let Some((_, record)) = records.next_record()? {
            values.push(descriptor.decode(record));
        }
        Ok(values)
    }

    fn records(&self) -> Result<Records, LapscopeError> {
        let mut file = File::open(&self.path).map_err(|e| LapscopeError::FileOpen {
            path: self.path.clone(),
            source: e,
        })?;
        let start = RecordCursor::start(&self.header);
        file.seek(SeekFrom::Start(start.offset))
            .map_err(|e| LapscopeError::FileRead { source: e })?;
        let limit = usize::try_from(self.disk_header.record_count)
            .ok()
            .filter(|count| *count > 0);
        Ok(Records {
            source: Some(BufReader::new(file)),
            cursor: start,
            limit,
            buf: vec![0u8; self.header.record_len()],
        })
    }
}

fn read_channel_table(
    source: &mut BufReader<File>,
    header: &TelemetryHeader,
    file_len: u64,
) -> Result<Vec<ChannelDescriptor>, LapscopeError> {
    let table_start = header.var_header_offset as u64;
    let table_end = table_start + (header.channel_count() * CHANNEL_DESCRIPTOR_LEN) as u64;
    if table_end > file_len {
        return Err(LapscopeError::format(format!(
            "channel table ends at byte {} past end of file ({} bytes)",
            table_end, file_len
        )));
    }
    source
        .seek(SeekFrom::Start(table_start))
        .map_err(|e| LapscopeError::FileRead { source: e })?;

    let mut channels = Vec::with_capacity(header.channel_count());
    let mut names = HashSet::new();
    let mut raw = [0u8; CHANNEL_DESCRIPTOR_LEN];
    for _ in 0..header.channel_count() {
        source
            .read_exact(&mut raw)
            .map_err(|e| LapscopeError::FileRead { source: e })?;
        let descriptor = parse_channel_descriptor(&raw)?;
        if descriptor.offset + descriptor.byte_len() > header.record_len() {
            return Err(LapscopeError::format(format!(
                "channel {} spans past the {} byte record",
                descriptor.name, header.buf_len
            )));
        }
        if !names.insert(descriptor.name.clone()) {
            return Err(LapscopeError::format(format!(
                "duplicate channel name {}",
                descriptor.name
            )));
        }
        channels.push(descriptor);
    }

    let declared: usize = channels.iter().map(|c| c.byte_len()).sum();
    if declared > header.record_len() {
        return Err(LapscopeError::format(format!(
            "channels declare {} bytes but records are {} bytes",
            declared, header.buf_len
        )));
    }
    Ok(channels)
}

fn read_session_info(
    source: &mut BufReader<File>,
    header: &TelemetryHeader,
    file_len: u64,
) -> Result<String, LapscopeError> {
    let start = header.session_info_offset as u64;
    let len = header.session_info_len as u64;
    if start + len > file_len {
        return Err(LapscopeError::format(format!(
            "session info block ends at byte {} past end of file ({} bytes)",
            start + len,
            file_len
        )));
    }
    source
        .seek(SeekFrom::Start(start))
        .map_err(|e| LapscopeError::FileRead { source: e })?;
    let mut raw = vec![0u8; len as usize];
    source
        .read_exact(&mut raw)
        .map_err(|e| LapscopeError::FileRead { source: e })?;
    Ok(String::from_utf8_lossy(&raw)
        .trim_end_matches('\0')
        .to_string())
}

/// Position of a record inside the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordCursor {
    /// Zero based record index
    pub index: usize,
    /// Byte offset of the record from the start of the file
    pub offset: u64,
    record_len: u64,
}

impl RecordCursor {
    pub fn start(header: &TelemetryHeader) -> Self {
        Self {
            index: 0,
            offset: header.record_offset().max(0) as u64,
            record_len: header.record_len() as u64,
        }
    }

    /// Cursor of the record following this one.
    pub fn next(&self) -> Self {
        Self {
            index: self.index + 1,
            offset: self.offset + self.record_len,
            record_len: self.record_len,
        }
    }
}

/// Raw record stream; yields borrowed record bytes with their cursor.
struct Records {
    source: Option<BufReader<File>>,
    cursor: RecordCursor,
    limit: Option<usize>,
    buf: Vec<u8>,
}

impl Records {
    fn next_record(&mut self) -> Result<Option<(RecordCursor, &[u8])>, LapscopeError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        if self.limit.is_some_and(|limit| self.cursor.index >= limit) {
            self.source = None;
            return Ok(None);
        }

        let filled = match fill_record(source, &mut self.buf) {
            Ok(filled) => filled,
            Err(e) => {
                self.source = None;
                return Err(LapscopeError::FileRead { source: e });
            }
        };
        if filled < self.buf.len() {
            if filled > 0 {
                debug!(
                    "Dropping truncated record {} ({} of {} bytes)",
                    self.cursor.index,
                    filled,
                    self.buf.len()
                );
            }
            // releases the file handle
            self.source = None;
            return Ok(None);
        }

        let cursor = self.cursor;
        self.cursor = cursor.next();
        Ok(Some((cursor, &self.buf)))
    }
}

/// Reads until `buf` is full or the source is exhausted, returning the byte count.
fn fill_record(source: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct MotionLayout {
    speed: ChannelDescriptor,
    yaw_rate: ChannelDescriptor,
    steering_wheel_angle: ChannelDescriptor,
    is_on_track: ChannelDescriptor,
}

/// Descriptors of the channels a `Sample` is built from.
struct RecordLayout {
    session_time: ChannelDescriptor,
    lap: ChannelDescriptor,
    lap_dist_pct: ChannelDescriptor,
    last_lap_time: ChannelDescriptor,
    lap_completed: ChannelDescriptor,
    player_incidents: ChannelDescriptor,
    best_lap_time: Option<ChannelDescriptor>,
    motion: Option<MotionLayout>,
}

impl RecordLayout {
    fn new(channels: &[ChannelDescriptor]) -> Result<Self, LapscopeError> {
        let find = |name: &str| require_channel(channels, name).cloned();
        let motion = match (
            find(super::SPEED),
            find(super::YAW_RATE),
            find(super::STEERING_WHEEL_ANGLE),
            find(super::IS_ON_TRACK),
        ) {
            (Ok(speed), Ok(yaw_rate), Ok(steering_wheel_angle), Ok(is_on_track)) => {
                Some(MotionLayout {
                    speed,
                    yaw_rate,
                    steering_wheel_angle,
                    is_on_track,
                })
            }
            _ => None,
        };
        Ok(Self {
            session_time: find(super::SESSION_TIME)?,
            lap: find(super::LAP)?,
            lap_dist_pct: find(super::LAP_DIST_PCT)?,
            last_lap_time: find(super::LAP_LAST_LAP_TIME)?,
            lap_completed: find(super::LAP_COMPLETED)?,
            player_incidents: find(super::PLAYER_INCIDENTS)?,
            best_lap_time: find(super::LAP_BEST_LAP_TIME).ok(),
            motion,
        })
    }

    fn decode(&self, cursor: RecordCursor, record: &[u8]) -> Sample {
        let motion = self.motion.as_ref().map(|m| Motion {
            speed: m.speed.decode_scalar(record) as f32,
            yaw_rate: m.yaw_rate.decode_scalar(record) as f32,
            steering_wheel_angle: m.steering_wheel_angle.decode_scalar(record) as f32,
            is_on_track: m.is_on_track.decode_scalar(record) != 0.,
        });
        Sample {
            tick: cursor.index,
            session_time: self.session_time.decode_scalar(record),
            lap: self.lap.decode_scalar(record) as i32,
            lap_dist_pct: normalize_lap_dist_pct(self.lap_dist_pct.decode_scalar(record) as f32),
            last_lap_time: self.last_lap_time.decode_scalar(record) as f32,
            lap_completed: self.lap_completed.decode_scalar(record) as i32,
            player_incidents: self.player_incidents.decode_scalar(record) as i32,
            best_lap_time: self
                .best_lap_time
                .as_ref()
                .map_or(0., |c| c.decode_scalar(record) as f32),
            motion,
        }
    }
}

/// Lazy, finite stream of samples from one pass over the record buffer.
///
/// A record cut short by the end of the file ends the stream without error.
pub struct Samples {
    records: Records,
    layout: RecordLayout,
}

impl Samples {
    /// Decodes the next sample together with the cursor of the record it came from.
    pub fn next_with_cursor(&mut self) -> Result<Option<(RecordCursor, Sample)>, LapscopeError> {
        let layout = &self.layout;
        Ok(self
            .records
            .next_record()?
            .map(|(cursor, record)| (cursor, layout.decode(cursor, record))))
    }

    /// Cursor of the next record to be decoded.
    pub fn cursor(&self) -> RecordCursor {
        self.records.cursor
    }

    pub fn has_motion(&self) -> bool {
        self.layout.motion.is_some()
    }
}

impl Iterator for Samples {
    type Item = Result<Sample, LapscopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_cursor()
            .map(|next| next.map(|(_, sample)| sample))
            .transpose()
    }
}
