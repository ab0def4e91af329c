// Stateful passes over the sample stream and the statistics built on their output

pub mod incident_detector;
pub mod lap_segmenter;
pub mod metrics;
pub mod sectors;

pub use incident_detector::{DetectionConfig, Event, EventType, IncidentDetector, detect_events};
pub use lap_segmenter::{
    LapSegment, LapSegmenter, LapState, ResetEvent, SegmentationConfig, Segmentation,
    attach_incidents, segment_laps,
};
pub use metrics::{
    CleanLapStats, MetricsConfig, SessionKind, SessionSummary, classify_session, clean_lap_stats,
    identify_outlaps, summarize,
};
pub use sectors::{SectorTime, compute_sector_times};
