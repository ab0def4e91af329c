use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    LapscopeError,
    analysis::{LapSegment, ResetEvent, SectorTime, SessionKind, SessionSummary},
    ingest::{SessionRecord, SessionReport},
    track_zones::ZonedEvent,
};

/// One line of a session file. Lines appear in the order
/// session, laps, resets, events, sectors, summary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum SessionOutput {
    Session(Box<SessionRecord>),
    Lap(LapSegment),
    Reset(ResetEvent),
    Event(ZonedEvent),
    Sector(SectorTime),
    Summary {
        summary: Box<SessionSummary>,
        classification: SessionKind,
    },
}

impl SessionOutput {
    pub fn from_report(report: &SessionReport) -> Vec<SessionOutput> {
        let mut lines = Vec::with_capacity(
            report.segments.len()
                + report.resets.len()
                + report.events.len()
                + report.sector_times.len()
                + 2,
        );
        lines.push(SessionOutput::Session(Box::new(report.session.clone())));
        lines.extend(report.segments.iter().cloned().map(SessionOutput::Lap));
        lines.extend(report.resets.iter().cloned().map(SessionOutput::Reset));
        lines.extend(report.events.iter().cloned().map(SessionOutput::Event));
        lines.extend(report.sector_times.iter().cloned().map(SessionOutput::Sector));
        lines.push(SessionOutput::Summary {
            summary: Box::new(report.summary.clone()),
            classification: report.classification,
        });
        lines
    }
}

/// Name of the session file written for `source` inside `output_dir`.
pub fn session_file_path(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    output_dir.join(format!("{}.jsonl", stem))
}

pub fn write_session(output_dir: &Path, report: &SessionReport) -> Result<PathBuf, LapscopeError> {
    std::fs::create_dir_all(output_dir).map_err(|e| LapscopeError::Writer { source: e })?;
    let path = session_file_path(output_dir, &report.session.file_path);
    serde_jsonlines::write_json_lines(&path, SessionOutput::from_report(report))
        .map_err(|e| LapscopeError::Writer { source: e })?;
    Ok(path)
}

pub fn read_session(path: &Path) -> Result<Vec<SessionOutput>, LapscopeError> {
    serde_jsonlines::json_lines(path)
        .map_err(|e| LapscopeError::FileRead { source: e })?
        .collect::<Result<Vec<SessionOutput>, std::io::Error>>()
        .map_err(|e| LapscopeError::FileRead { source: e })
}
