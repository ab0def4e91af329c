use log::debug;
use serde::{Deserialize, Serialize};

use super::incident_detector::Event;
use crate::telemetry::Sample;

/// Default drop in LapDistPct between two samples treated as an active reset
pub const DEFAULT_RESET_DROP_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    /// LapDistPct drop between consecutive samples, without a lap increment,
    /// that marks an active reset
    pub reset_drop_threshold: f32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            reset_drop_threshold: DEFAULT_RESET_DROP_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LapSegment {
    /// Lap number reported when the segment opened
    pub lap_number: i32,
    pub start_time: f64,
    /// Time of the last sample belonging to the segment
    pub end_time: f64,
    /// Lap time reported by the sim; only set on complete laps
    pub duration: Option<f64>,
    pub complete: bool,
    pub reset: bool,
    /// Complete lap whose reported lap time was not positive
    pub anomalous: bool,
    /// Detected events within the segment's time bounds
    pub incidents: usize,
    /// Incident points the sim awarded during the segment
    pub player_incidents: i32,
}

impl LapSegment {
    pub fn elapsed(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn contains(&self, session_time: f64) -> bool {
        session_time >= self.start_time && session_time <= self.end_time
    }
}

/// Location of an active reset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResetEvent {
    pub lap_number: i32,
    pub session_time: f64,
    /// Lap distance just before the car was relocated
    pub lap_dist_pct: f32,
}

/// Bookkeeping for the segment currently being driven.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpenLap {
    pub lap_number: i32,
    pub start_time: f64,
    pub last_time: f64,
    /// `Lap` minus `LapCompleted` on the first sample of the session
    pub lap_offset: i32,
    /// Laps finished so far as told by either counter
    pub laps_done: i32,
    pub last_dist_pct: f32,
    pub last_player_incidents: i32,
    pub player_incidents: i32,
}

impl OpenLap {
    fn starting_at(sample: &Sample, lap_offset: i32, prev_player_incidents: i32) -> Self {
        Self {
            lap_number: sample.lap,
            start_time: sample.session_time,
            last_time: sample.session_time,
            lap_offset,
            laps_done: laps_done(sample, lap_offset),
            last_dist_pct: sample.lap_dist_pct,
            last_player_incidents: sample.player_incidents,
            player_incidents: rising_edge(prev_player_incidents, sample.player_incidents),
        }
    }

    fn extend(self, sample: &Sample) -> Self {
        Self {
            last_time: sample.session_time,
            laps_done: laps_done(sample, self.lap_offset),
            last_dist_pct: sample.lap_dist_pct,
            last_player_incidents: sample.player_incidents,
            player_incidents: self.player_incidents
                + rising_edge(self.last_player_incidents, sample.player_incidents),
            ..self
        }
    }

    fn close(&self, complete: bool, reset: bool, reported_lap_time: f32) -> Option<LapSegment> {
        if self.last_time <= self.start_time {
            debug!(
                "Dropping single-sample segment for lap {} at {:.3}s",
                self.lap_number, self.start_time
            );
            return None;
        }
        let has_time = reported_lap_time > 0.;
        Some(LapSegment {
            lap_number: self.lap_number,
            start_time: self.start_time,
            end_time: self.last_time,
            duration: (complete && has_time).then(|| f64::from(reported_lap_time)),
            complete,
            reset,
            anomalous: complete && !has_time,
            incidents: 0,
            player_incidents: self.player_incidents,
        })
    }
}

/// `Lap` and `LapCompleted` may advance a few ticks apart at the line; whichever
/// moves first marks the boundary and the other only catches up.
fn laps_done(sample: &Sample, lap_offset: i32) -> i32 {
    (sample.lap - lap_offset).max(sample.lap_completed)
}

/// PlayerIncidents pulses for a tick; count the value at each 0 -> N edge.
fn rising_edge(prev: i32, cur: i32) -> i32 {
    if cur > 0 && prev <= 0 { cur } else { 0 }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LapState {
    Idle,
    InLap(OpenLap),
}

/// Advances the segmentation state by one sample.
///
/// A lap increment (the first of `Lap` or `LapCompleted` to go up) always wins
/// over a distance drop seen on the same transition.
pub fn transition(
    state: LapState,
    sample: &Sample,
    config: &SegmentationConfig,
) -> (LapState, Option<LapSegment>) {
    let open = match state {
        LapState::Idle => {
            let lap_offset = sample.lap - sample.lap_completed;
            return (LapState::InLap(OpenLap::starting_at(sample, lap_offset, 0)), None);
        }
        LapState::InLap(open) => open,
    };

    let lap_increment = laps_done(sample, open.lap_offset) > open.laps_done;
    let dist_drop = open.last_dist_pct - sample.lap_dist_pct > config.reset_drop_threshold;

    let closed = if lap_increment {
        open.close(true, false, sample.last_lap_time)
    } else if dist_drop {
        open.close(false, true, sample.last_lap_time)
    } else {
        return (LapState::InLap(open.extend(sample)), None);
    };

    let next = OpenLap::starting_at(sample, open.lap_offset, open.last_player_incidents);
    (LapState::InLap(next), closed)
}

/// Closes whatever is open when the sample stream runs out.
pub fn finish(state: LapState) -> Option<LapSegment> {
    match state {
        LapState::Idle => None,
        LapState::InLap(open) => open.close(false, false, 0.),
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Segmentation {
    pub segments: Vec<LapSegment>,
    pub resets: Vec<ResetEvent>,
}

/// Drives `transition` over a sample stream and collects its output.
pub struct LapSegmenter {
    config: SegmentationConfig,
    state: LapState,
    output: Segmentation,
}

impl LapSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            state: LapState::Idle,
            output: Segmentation::default(),
        }
    }

    pub fn state(&self) -> LapState {
        self.state
    }

    pub fn push(&mut self, sample: &Sample) {
        let prev = self.state;
        let (next, closed) = transition(prev, sample, &self.config);
        self.state = next;

        let Some(segment) = closed else {
            return;
        };
        if segment.anomalous {
            debug!(
                "Lap {} completed with non-positive lap time {}",
                segment.lap_number, sample.last_lap_time
            );
        }
        if segment.reset {
            if let LapState::InLap(open) = prev {
                debug!(
                    "Active reset on lap {} at {:.3}s ({:.3} -> {:.3})",
                    segment.lap_number, segment.end_time, open.last_dist_pct, sample.lap_dist_pct
                );
                self.output.resets.push(ResetEvent {
                    lap_number: segment.lap_number,
                    session_time: segment.end_time,
                    lap_dist_pct: open.last_dist_pct,
                });
            }
        }
        self.output.segments.push(segment);
    }

    pub fn finish(mut self) -> Segmentation {
        if let Some(segment) = finish(self.state) {
            self.output.segments.push(segment);
        }
        self.output
    }
}

pub fn segment_laps<'a>(
    samples: impl IntoIterator<Item = &'a Sample>,
    config: SegmentationConfig,
) -> Segmentation {
    let mut segmenter = LapSegmenter::new(config);
    for sample in samples {
        segmenter.push(sample);
    }
    segmenter.finish()
}

/// Counts the events falling inside each segment's time bounds.
pub fn attach_incidents(segments: &mut [LapSegment], events: &[Event]) {
    for segment in segments.iter_mut() {
        segment.incidents = events
            .iter()
            .filter(|e| segment.contains(e.session_time))
            .count();
    }
}
