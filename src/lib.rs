// Library interface for lapscope
// This allows integration tests to access internal modules

pub mod analysis;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod telemetry;
pub mod track_zones;
pub mod writer;

// Re-export commonly used types
pub use analysis::{Event, EventType, LapSegment, SessionSummary};
pub use config::AnalysisConfig;
pub use errors::LapscopeError;
pub use ingest::{SessionRecord, SessionReport, analyze_file};
pub use telemetry::{ChannelDescriptor, IbtReader, Sample, SessionInfo};
pub use track_zones::{FileZoneStore, TrackZones, ZoneLookup};
