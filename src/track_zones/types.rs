// Data structures for named track zones

use serde::{Deserialize, Serialize};

/// A named stretch of track expressed in lap distance fractions.
///
/// A zone with `start > end` wraps through the start/finish line.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Zone {
    pub name: String,
    /// Lap distance where the zone begins (0.0-1.0)
    pub start: f32,
    /// Lap distance where the zone ends, exclusive (0.0-1.0)
    pub end: f32,
}

impl Zone {
    pub fn new(name: impl Into<String>, start: f32, end: f32) -> Result<Self, String> {
        if !(0.0..=1.0).contains(&start) {
            return Err("start must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&end) {
            return Err("end must be between 0.0 and 1.0".to_string());
        }
        if start == end {
            return Err("start and end must differ".to_string());
        }
        Ok(Self {
            name: name.into(),
            start,
            end,
        })
    }

    pub fn wraps(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, lap_dist_pct: f32) -> bool {
        if self.wraps() {
            lap_dist_pct >= self.start || lap_dist_pct < self.end
        } else {
            lap_dist_pct >= self.start && lap_dist_pct < self.end
        }
    }
}

/// Zone layout for one track.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackZones {
    /// Matches the `TrackName` key of the session info block; zone files may
    /// omit it and fall back to their file name
    #[serde(default)]
    pub track_id: String,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl TrackZones {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            zones: Vec::new(),
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    /// First zone containing `lap_dist_pct`, in declaration order.
    pub fn zone_for(&self, lap_dist_pct: f32) -> Option<&Zone> {
        self.zones.iter().find(|z| z.contains(lap_dist_pct))
    }

    /// Zone names must be unique within a track.
    pub fn validate(&self) -> Result<(), String> {
        if self.track_id.is_empty() {
            return Err("track id cannot be empty".to_string());
        }
        let mut names = std::collections::HashSet::new();
        for zone in &self.zones {
            if !names.insert(zone.name.as_str()) {
                return Err(format!("Duplicate zone name: {}", zone.name));
            }
            Zone::new(zone.name.clone(), zone.start, zone.end)?;
        }
        Ok(())
    }
}
