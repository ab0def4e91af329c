// Single-file analysis pipeline
//
// raw bytes -> IbtReader -> samples -> {LapSegmenter, IncidentDetector} -> summary
//
// Both passes consume the same sample, in order, during one read of the file.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    LapscopeError,
    analysis::{
        IncidentDetector, LapSegment, LapSegmenter, ResetEvent, SectorTime, SessionKind,
        SessionSummary, attach_incidents, classify_session, compute_sector_times, summarize,
    },
    config::AnalysisConfig,
    telemetry::{IbtReader, SessionInfo},
    track_zones::{
        DEFAULT_BUCKET_SIZE, Hotspot, ZoneLookup, ZonedEvent, hotspot_buckets, tag_events,
        zone_counts,
    },
};

/// Session level facts handed to storage alongside laps and events.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub file_path: PathBuf,
    /// Unix timestamp of the recording start
    pub start_time: i64,
    pub session_start_time: f64,
    pub session_end_time: f64,
    pub session_lap_count: i32,
    pub record_count: i32,
    pub tick_rate: i32,
    /// Complete records actually decoded
    pub samples_read: usize,
    pub first_sample_time: Option<f64>,
    pub last_sample_time: Option<f64>,
    pub info: SessionInfo,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub session: SessionRecord,
    pub segments: Vec<LapSegment>,
    pub resets: Vec<ResetEvent>,
    pub events: Vec<ZonedEvent>,
    pub summary: SessionSummary,
    pub classification: SessionKind,
    pub zone_counts: BTreeMap<String, usize>,
    pub hotspots: Vec<Hotspot>,
    /// Empty unless zones are known for the track
    pub sector_times: Vec<SectorTime>,
}

/// Decodes and analyzes one IBT file.
///
/// Fails without partial output when the file is malformed or lacks a
/// required channel.
pub fn analyze_file(
    path: &Path,
    config: &AnalysisConfig,
    zones: Option<&dyn ZoneLookup>,
) -> Result<SessionReport, LapscopeError> {
    let reader = IbtReader::open(path)?;
    let samples = reader.samples()?;
    let info = reader.session_info().clone();
    let track_zones = zones.zip(info.track_id.as_deref()).and_then(|(z, id)| z.track_zones(id));

    let mut segmenter = LapSegmenter::new(config.segmentation);
    let mut detector = IncidentDetector::new(config.detection);
    let mut samples_read = 0;
    let mut first_sample_time = None;
    let mut last_sample_time = None;
    let mut reported_best: Option<f32> = None;
    let mut trace = Vec::new();
    for sample in samples {
        let sample = sample?;
        segmenter.push(&sample);
        detector.push(&sample);
        if sample.best_lap_time > 0. {
            reported_best = Some(reported_best.map_or(sample.best_lap_time, |b| {
                b.min(sample.best_lap_time)
            }));
        }
        if track_zones.is_some() {
            trace.push((sample.session_time, sample.lap_dist_pct));
        }
        samples_read += 1;
        first_sample_time.get_or_insert(sample.session_time);
        last_sample_time = Some(sample.session_time);
    }

    let mut segmentation = segmenter.finish();
    let events = detector.finish();
    attach_incidents(&mut segmentation.segments, &events);

    let mut summary = summarize(&segmentation.segments, &events, &config.metrics);
    if let Some(best) = reported_best {
        summary.override_best_lap(f64::from(best));
    }
    let sector_times = track_zones.map_or_else(Vec::new, |z| {
        compute_sector_times(&trace, &segmentation.segments, z)
    });
    let classification =
        classify_session(&segmentation.segments, &segmentation.resets, &config.metrics);

    let zoned_events = tag_events(&events, info.track_id.as_deref(), zones);
    let disk_header = reader.disk_header();
    let session = SessionRecord {
        file_path: path.to_path_buf(),
        start_time: disk_header.start_time,
        session_start_time: disk_header.session_start_time,
        session_end_time: disk_header.session_end_time,
        session_lap_count: disk_header.session_lap_count,
        record_count: disk_header.record_count,
        tick_rate: reader.header().tick_rate,
        samples_read,
        first_sample_time,
        last_sample_time,
        info,
    };

    info!(
        "{:?}: {} samples, {} laps ({} timed, {} resets), {} events, best {:?}",
        path,
        samples_read,
        summary.lap_count,
        summary.complete_lap_count,
        summary.reset_count,
        events.len(),
        summary.best_lap
    );

    Ok(SessionReport {
        session,
        segments: segmentation.segments,
        resets: segmentation.resets,
        zone_counts: zone_counts(&zoned_events),
        hotspots: hotspot_buckets(&events, DEFAULT_BUCKET_SIZE),
        events: zoned_events,
        summary,
        classification,
        sector_times,
    })
}
