// Track zone annotation
// Maps event locations to named zones supplied per track, and buckets them
// into fixed-width hotspots when no zones are known

pub mod storage;
pub mod types;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::Event;

pub use storage::{FileZoneStore, ZoneLookup};
pub use types::{TrackZones, Zone};

pub const DEFAULT_BUCKET_SIZE: f32 = 0.05;

/// An event together with the zone it happened in, if one is mapped.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ZonedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub zone: Option<String>,
}

pub fn tag_events(
    events: &[Event],
    track_id: Option<&str>,
    lookup: Option<&dyn ZoneLookup>,
) -> Vec<ZonedEvent> {
    events
        .iter()
        .map(|event| ZonedEvent {
            event: event.clone(),
            zone: match (track_id, lookup) {
                (Some(track_id), Some(lookup)) => lookup.zone_for(track_id, event.lap_dist_pct),
                _ => None,
            },
        })
        .collect()
}

/// Number of events per named zone; untagged events are left out.
pub fn zone_counts(events: &[ZonedEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for zone in events.iter().filter_map(|e| e.zone.as_ref()) {
        *counts.entry(zone.clone()).or_insert(0) += 1;
    }
    counts
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hotspot {
    pub start: f32,
    pub end: f32,
    pub count: usize,
}

/// Groups events into `bucket_size` wide lap distance buckets, busiest first.
pub fn hotspot_buckets(events: &[Event], bucket_size: f32) -> Vec<Hotspot> {
    if bucket_size <= 0. {
        return Vec::new();
    }
    let mut buckets: BTreeMap<u32, usize> = BTreeMap::new();
    for event in events {
        let index = (event.lap_dist_pct / bucket_size).floor() as u32;
        *buckets.entry(index).or_insert(0) += 1;
    }
    let mut hotspots: Vec<Hotspot> = buckets
        .into_iter()
        .map(|(index, count)| Hotspot {
            start: round4(index as f32 * bucket_size),
            end: round4((index + 1) as f32 * bucket_size),
            count,
        })
        .collect();
    // stable: equal counts stay ordered by position
    hotspots.sort_by(|a, b| b.count.cmp(&a.count));
    hotspots
}

fn round4(value: f32) -> f32 {
    (value * 10_000.).round() / 10_000.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::EventType;

    fn event(lap_dist_pct: f32) -> Event {
        Event {
            event_type: EventType::OffTrack,
            session_time: 10.,
            lap_number: 1,
            lap_dist_pct,
        }
    }

    #[test]
    fn test_hotspots_busiest_first() {
        let events = vec![event(0.51), event(0.53), event(0.12), event(0.54), event(0.14)];
        let hotspots = hotspot_buckets(&events, DEFAULT_BUCKET_SIZE);
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].count, 3);
        assert_eq!(hotspots[0].start, 0.5);
        assert_eq!(hotspots[0].end, 0.55);
        assert_eq!(hotspots[1].start, 0.1);
    }

    #[test]
    fn test_tagging_without_zones_passes_events_through() {
        let events = vec![event(0.03), event(0.5)];
        let tagged = tag_events(&events, Some("spa up"), None);
        assert_eq!(tagged.len(), 2);
        assert!(tagged.iter().all(|e| e.zone.is_none()));
        assert!(zone_counts(&tagged).is_empty());
    }

    #[test]
    fn test_tagging_with_zones() {
        let zones =
            TrackZones::new("spa up").with_zone(Zone::new("La Source", 0.02, 0.06).unwrap());
        let events = vec![event(0.03), event(0.04), event(0.5)];
        let tagged = tag_events(&events, Some("spa up"), Some(&zones));
        assert_eq!(tagged[0].zone.as_deref(), Some("La Source"));
        assert_eq!(tagged[2].zone, None);
        assert_eq!(zone_counts(&tagged).get("La Source"), Some(&2));

        // unknown track id means no mapping
        let tagged = tag_events(&events, None, Some(&zones));
        assert!(tagged.iter().all(|e| e.zone.is_none()));
    }
}
