// Sector times from zone boundary crossings

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::lap_segmenter::LapSegment;
use crate::track_zones::TrackZones;

/// Largest forward distance step still read as driving; larger jumps are resets
const MAX_CROSSING_STEP: f32 = 0.5;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SectorTime {
    pub lap_number: i32,
    pub sector: String,
    /// Seconds between the sector's entry and exit crossings
    pub time: f64,
}

/// Times every complete lap sector by sector.
///
/// `trace` holds `(session_time, lap_dist_pct)` for every sample in time
/// order. Sector edges are the zone starts and ends strictly inside the lap;
/// each sector takes the name of the zone covering its middle, or `S<n>`
/// when no zone does. A zone that wraps through the line is timed as two
/// sectors. Laps where an edge is never crossed are skipped.
pub fn compute_sector_times(
    trace: &[(f64, f32)],
    segments: &[LapSegment],
    zones: &TrackZones,
) -> Vec<SectorTime> {
    if zones.zones.is_empty() {
        return Vec::new();
    }
    let edges: Vec<f32> = zones
        .zones
        .iter()
        .flat_map(|z| [z.start, z.end])
        .filter(|b| *b > 0. && *b < 1.)
        .sorted_by(f32::total_cmp)
        .dedup()
        .collect();
    let names: Vec<String> = std::iter::once(0.)
        .chain(edges.iter().copied())
        .chain(std::iter::once(1.))
        .tuple_windows()
        .enumerate()
        .map(|(i, (from, to))| match zones.zone_for((from + to) / 2.) {
            Some(zone) => zone.name.clone(),
            None => format!("S{}", i + 1),
        })
        .collect();

    let mut times = Vec::new();
    for segment in segments.iter().filter(|s| s.complete) {
        let lo = trace.partition_point(|(t, _)| *t < segment.start_time);
        let hi = trace.partition_point(|(t, _)| *t <= segment.end_time);
        let lap = &trace[lo..hi];
        // the line crossing that closed the lap is the next segment's first sample
        let finish = trace.get(hi).map_or(segment.end_time, |(t, _)| *t);

        let crossings: Option<Vec<f64>> = edges.iter().map(|edge| crossing(lap, *edge)).collect();
        let Some(crossings) = crossings else {
            continue;
        };
        let marks = std::iter::once(segment.start_time)
            .chain(crossings)
            .chain(std::iter::once(finish));
        times.extend(
            marks
                .tuple_windows()
                .zip(&names)
                .map(|((entry, exit), name)| SectorTime {
                    lap_number: segment.lap_number,
                    sector: name.clone(),
                    time: exit - entry,
                }),
        );
    }
    times
}

/// Interpolated time at which `lap` first passes `edge` going forward.
fn crossing(lap: &[(f64, f32)], edge: f32) -> Option<f64> {
    lap.iter()
        .tuple_windows()
        .find(|((_, before), (_, after))| {
            *before < edge && edge <= *after && after - before < MAX_CROSSING_STEP
        })
        .map(|((t0, d0), (t1, d1))| {
            let frac = f64::from((edge - d0) / (d1 - d0));
            t0 + frac * (t1 - t0)
        })
}
