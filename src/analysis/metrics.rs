use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{
    incident_detector::{Event, EventType},
    lap_segmenter::{LapSegment, ResetEvent},
};

/// Session length above which a long clean run counts as a race simulation
const RACE_SIM_MIN_SESSION_S: f64 = 1200.;
const RACE_SIM_MIN_CONSECUTIVE_LAPS: usize = 10;
const CORNER_ISOLATION_MAX_RESET_SPREAD: f32 = 0.3;
pub const DEFAULT_WARMUP_MIN_LAP_S: f64 = 30.;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Complete laps faster than this are ignored
    pub min_valid_lap_time_s: f64,
    /// Complete laps slower than this are ignored; 0 disables the bound
    pub max_valid_lap_time_s: f64,
    /// A complete lap driven for longer than this leaves the tyres warm
    pub warmup_min_lap_s: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            min_valid_lap_time_s: 0.,
            max_valid_lap_time_s: 0.,
            warmup_min_lap_s: DEFAULT_WARMUP_MIN_LAP_S,
        }
    }
}

impl MetricsConfig {
    /// Whether a segment contributes to lap time statistics.
    pub fn is_valid_lap(&self, segment: &LapSegment) -> bool {
        if !segment.complete || segment.reset {
            return false;
        }
        let Some(duration) = segment.duration else {
            return false;
        };
        duration >= self.min_valid_lap_time_s
            && (self.max_valid_lap_time_s <= 0. || duration <= self.max_valid_lap_time_s)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub lap_count: usize,
    /// Laps that qualified for the lap time statistics
    pub complete_lap_count: usize,
    pub reset_count: usize,
    pub best_lap: Option<f64>,
    pub median_lap: Option<f64>,
    pub worst_lap: Option<f64>,
    /// Population standard deviation
    pub stddev_lap: Option<f64>,
    pub iqr_lap: Option<f64>,
    pub incidents_by_lap: BTreeMap<i32, usize>,
    /// Spins and off tracks only
    pub serious_incidents_by_lap: BTreeMap<i32, usize>,
    pub incidents_by_type: BTreeMap<EventType, usize>,
    pub player_incidents: i32,
    /// Valid laps driven on cold tyres
    pub outlaps: BTreeSet<i32>,
    pub clean: CleanLapStats,
    /// Session best reported by the sim, when the file carries it
    pub reported_best_lap: Option<f64>,
}

impl SessionSummary {
    /// Prefers the sim's own best lap over the computed one.
    ///
    /// Non-positive values mean the sim never timed a lap and are ignored.
    pub fn override_best_lap(&mut self, reported: f64) {
        if reported <= 0. {
            return;
        }
        self.reported_best_lap = Some(reported);
        self.best_lap = Some(reported);
    }
}

/// Statistics over laps that are valid, not outlaps, and free of incidents.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CleanLapStats {
    pub clean_lap_count: usize,
    pub best_lap: Option<f64>,
    pub median_lap: Option<f64>,
    pub stddev_lap: Option<f64>,
}

struct LapTimeStats {
    best: Option<f64>,
    median: Option<f64>,
    worst: Option<f64>,
    stddev: Option<f64>,
    iqr: Option<f64>,
}

impl LapTimeStats {
    /// `sorted` must be in ascending order.
    fn from_sorted(sorted: &[f64]) -> Self {
        match sorted {
            [] => Self {
                best: None,
                median: None,
                worst: None,
                stddev: None,
                iqr: None,
            },
            [only] => Self {
                best: Some(*only),
                median: Some(*only),
                worst: Some(*only),
                stddev: Some(0.),
                iqr: Some(0.),
            },
            sorted => Self {
                best: sorted.first().copied(),
                median: Some(percentile(sorted, 0.5)),
                worst: sorted.last().copied(),
                stddev: Some(population_stddev(sorted)),
                iqr: Some(percentile(sorted, 0.75) - percentile(sorted, 0.25)),
            },
        }
    }
}

fn sorted_lap_times<'a>(segments: impl Iterator<Item = &'a LapSegment>) -> Vec<f64> {
    segments
        .filter_map(|s| s.duration)
        .sorted_by(|a, b| a.total_cmp(b))
        .collect()
}

/// Lap numbers of valid laps started on cold tyres.
///
/// The first valid lap of a session is an outlap unless a full-length lap was
/// driven before it. A reset makes the next valid lap an outlap again, unless
/// the driver completes a full-length recovery lap first.
pub fn identify_outlaps(segments: &[LapSegment], config: &MetricsConfig) -> BTreeSet<i32> {
    let mut outlaps = BTreeSet::new();
    let mut cold = true;
    for segment in segments {
        if segment.reset {
            cold = true;
        } else if segment.complete && segment.elapsed() > config.warmup_min_lap_s {
            if cold && config.is_valid_lap(segment) {
                outlaps.insert(segment.lap_number);
            }
            cold = false;
        }
    }
    outlaps
}

pub fn clean_lap_stats(
    segments: &[LapSegment],
    events: &[Event],
    outlaps: &BTreeSet<i32>,
    config: &MetricsConfig,
) -> CleanLapStats {
    let clean = segments.iter().filter(|s| {
        config.is_valid_lap(s)
            && !outlaps.contains(&s.lap_number)
            && s.player_incidents == 0
            && !events
                .iter()
                .any(|e| e.event_type.is_serious() && s.contains(e.session_time))
    });
    let lap_times = sorted_lap_times(clean);
    let stats = LapTimeStats::from_sorted(&lap_times);
    CleanLapStats {
        clean_lap_count: lap_times.len(),
        best_lap: stats.best,
        median_lap: stats.median,
        stddev_lap: stats.stddev,
    }
}

/// Computes lap statistics and incident tallies for one session.
pub fn summarize(
    segments: &[LapSegment],
    events: &[Event],
    config: &MetricsConfig,
) -> SessionSummary {
    let lap_times = sorted_lap_times(segments.iter().filter(|s| config.is_valid_lap(s)));
    let stats = LapTimeStats::from_sorted(&lap_times);
    let outlaps = identify_outlaps(segments, config);
    let clean = clean_lap_stats(segments, events, &outlaps, config);

    SessionSummary {
        lap_count: segments.len(),
        complete_lap_count: lap_times.len(),
        reset_count: segments.iter().filter(|s| s.reset).count(),
        best_lap: stats.best,
        median_lap: stats.median,
        worst_lap: stats.worst,
        stddev_lap: stats.stddev,
        iqr_lap: stats.iqr,
        incidents_by_lap: events.iter().map(|e| e.lap_number).counts().into_iter().collect(),
        serious_incidents_by_lap: events
            .iter()
            .filter(|e| e.event_type.is_serious())
            .map(|e| e.lap_number)
            .counts()
            .into_iter()
            .collect(),
        incidents_by_type: events.iter().map(|e| e.event_type).counts().into_iter().collect(),
        player_incidents: segments.iter().map(|s| s.player_incidents).sum(),
        outlaps,
        clean,
        reported_best_lap: None,
    }
}

/// Linear interpolation between closest ranks; `sorted` must not be empty.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = (sorted.len() - 1) as f64 * pct;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

fn population_stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// What kind of practice a session looks like.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Mostly resets clustered around one part of the track
    CornerIsolation,
    HotLaps,
    /// Long uninterrupted run of clean laps
    RaceSim,
    Mixed,
}

pub fn classify_session(
    segments: &[LapSegment],
    resets: &[ResetEvent],
    config: &MetricsConfig,
) -> SessionKind {
    if segments.is_empty() {
        return SessionKind::Mixed;
    }
    let total = segments.len() as f64;
    let clean = segments.iter().filter(|s| config.is_valid_lap(s)).count();
    let clean_ratio = clean as f64 / total;
    let invalid_ratio = 1. - clean_ratio;

    if invalid_ratio > 0.6 && !resets.is_empty() {
        let spread = match resets.iter().map(|r| r.lap_dist_pct).minmax() {
            itertools::MinMaxResult::MinMax(min, max) => max - min,
            _ => 0.,
        };
        if spread < CORNER_ISOLATION_MAX_RESET_SPREAD {
            return SessionKind::CornerIsolation;
        }
    }

    if clean >= RACE_SIM_MIN_CONSECUTIVE_LAPS {
        let first = &segments[0];
        let last = &segments[segments.len() - 1];
        let longest_run = segments
            .iter()
            .chunk_by(|s| config.is_valid_lap(s))
            .into_iter()
            .filter(|(valid, _)| *valid)
            .map(|(_, run)| run.count())
            .max()
            .unwrap_or(0);
        if last.end_time - first.start_time > RACE_SIM_MIN_SESSION_S
            && longest_run >= RACE_SIM_MIN_CONSECUTIVE_LAPS
        {
            return SessionKind::RaceSim;
        }
    }

    if clean_ratio > 0.6 {
        return SessionKind::HotLaps;
    }
    SessionKind::Mixed
}
