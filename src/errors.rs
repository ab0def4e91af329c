// Error types for lapscope

use snafu::Snafu;
use std::{io, path::PathBuf};

#[derive(Debug, Snafu)]
pub enum LapscopeError {
    // Errors while opening and decoding IBT files
    #[snafu(display("Unable to open telemetry file {}", path.display()))]
    FileOpen { path: PathBuf, source: io::Error },
    #[snafu(display("Error reading telemetry file"))]
    FileRead { source: io::Error },
    #[snafu(display("Unrecognized telemetry file format: {reason}"))]
    Format { reason: String },
    #[snafu(display("Missing required channels: {}", channels.join(", ")))]
    MissingChannel { channels: Vec<String> },

    // Config management errors
    #[snafu(display("Could not find application data directory to load config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIO { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerialize { source: serde_json::Error },

    // Track zone errors
    #[snafu(display("Track zone configuration error: {reason}"))]
    TrackZone { reason: String },

    // Errors for the session writer
    #[snafu(display("Error writing session file"))]
    Writer { source: io::Error },
}

impl LapscopeError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        LapscopeError::Format {
            reason: reason.into(),
        }
    }
}
