// Storage implementation for track zone files

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::errors::LapscopeError;
use crate::track_zones::types::TrackZones;

/// Supplies the zone layout of a track.
///
/// `None` means "no mapping": the caller leaves events untagged and skips
/// sector timing.
pub trait ZoneLookup {
    fn track_zones(&self, track_id: &str) -> Option<&TrackZones>;

    /// Label of the zone containing `lap_dist_pct` on `track_id`.
    fn zone_for(&self, track_id: &str, lap_dist_pct: f32) -> Option<String> {
        self.track_zones(track_id)?
            .zone_for(lap_dist_pct)
            .map(|z| z.name.clone())
    }
}

impl ZoneLookup for TrackZones {
    fn track_zones(&self, track_id: &str) -> Option<&TrackZones> {
        (track_id == self.track_id).then_some(self)
    }
}

/// Directory of `<track_id>.json` zone files, loaded once into memory
pub struct FileZoneStore {
    storage_path: PathBuf,
    cache: HashMap<String, TrackZones>,
}

impl FileZoneStore {
    /// Loads every zone file in `storage_path`.
    ///
    /// A missing directory yields an empty store; unreadable or invalid files
    /// are skipped with a warning.
    pub fn new(storage_path: PathBuf) -> Result<Self, LapscopeError> {
        let mut store = Self {
            storage_path,
            cache: HashMap::new(),
        };
        if !store.storage_path.exists() {
            debug!("Zone directory {:?} does not exist", store.storage_path);
            return Ok(store);
        }

        let entries = fs::read_dir(&store.storage_path).map_err(|e| LapscopeError::TrackZone {
            reason: format!("Cannot read directory {:?}: {}", store.storage_path, e),
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(zones) => {
                    debug!("Loaded {} zones for {}", zones.zones.len(), zones.track_id);
                    store
                        .cache
                        .insert(Self::normalize_track_id(&zones.track_id), zones);
                }
                Err(e) => warn!("Skipping zone file {:?}: {}", path, e),
            }
        }
        Ok(store)
    }

    /// Create storage in the default application data directory
    pub fn new_default() -> Result<Self, LapscopeError> {
        let app_data_dir = dirs::data_dir().ok_or(LapscopeError::NoConfigDir)?;
        Self::new(app_data_dir.join("lapscope").join("tracks"))
    }

    /// Normalize a track id for consistent file naming
    fn normalize_track_id(track_id: &str) -> String {
        track_id
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }

    fn file_path_for_track(&self, track_id: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", Self::normalize_track_id(track_id)))
    }

    fn load_from_file(path: &Path) -> Result<TrackZones, LapscopeError> {
        let content = fs::read_to_string(path).map_err(|e| LapscopeError::TrackZone {
            reason: format!("Failed to read file: {}", e),
        })?;
        let mut zones: TrackZones =
            serde_json::from_str(&content).map_err(|e| LapscopeError::TrackZone {
                reason: format!("Failed to parse JSON: {}", e),
            })?;
        // files may leave the id out and rely on their name
        if zones.track_id.is_empty() {
            if let Some(stem) = path.file_stem() {
                zones.track_id = stem.to_string_lossy().into_owned();
            }
        }
        zones
            .validate()
            .map_err(|reason| LapscopeError::TrackZone { reason })?;
        Ok(zones)
    }

    pub fn zones(&self, track_id: &str) -> Option<&TrackZones> {
        self.cache.get(&Self::normalize_track_id(track_id))
    }

    /// Track ids with zone data, sorted.
    pub fn list_tracks(&self) -> Vec<String> {
        let mut tracks: Vec<String> = self.cache.values().map(|z| z.track_id.clone()).collect();
        tracks.sort();
        tracks
    }

    pub fn save_zones(&mut self, zones: &TrackZones) -> Result<(), LapscopeError> {
        zones
            .validate()
            .map_err(|reason| LapscopeError::TrackZone { reason })?;
        if !self.storage_path.exists() {
            fs::create_dir_all(&self.storage_path)
                .map_err(|e| LapscopeError::ConfigIO { source: e })?;
        }
        let content = serde_json::to_string_pretty(zones)
            .map_err(|e| LapscopeError::ConfigSerialize { source: e })?;
        fs::write(self.file_path_for_track(&zones.track_id), content)
            .map_err(|e| LapscopeError::ConfigIO { source: e })?;
        self.cache
            .insert(Self::normalize_track_id(&zones.track_id), zones.clone());
        Ok(())
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}

impl ZoneLookup for FileZoneStore {
    fn track_zones(&self, track_id: &str) -> Option<&TrackZones> {
        self.zones(track_id)
    }
}
