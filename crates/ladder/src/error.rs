use std::path::PathBuf;
use thiserror::Error;

/// The external probe could not produce a usable result.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Source file is missing.
    #[error("File does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// ffprobe could not be started.
    #[error("Failed to execute ffprobe at {}: {source}", .bin.display())]
    Spawn {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ffprobe ran but exited unsuccessfully.
    #[error("ffprobe failed (exit code {exit_code}) for {}: {stderr}", .path.display())]
    Failed {
        path: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    /// ffprobe did not finish within the configured bound.
    #[error("ffprobe timed out after {secs} seconds for {}", .path.display())]
    Timeout { path: PathBuf, secs: u64 },

    /// ffprobe output is not UTF-8.
    #[error("ffprobe output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// ffprobe output is not the expected JSON shape.
    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Inspection failures. Both variants are fatal for the asset.
#[derive(Debug, Error)]
pub enum InspectError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Probe succeeded but found nothing to encode from.
    #[error("No usable video stream found")]
    NoVideoStream,
}

/// A single rung could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid target {label}: {message}")]
    InvalidTarget { label: String, message: String },

    /// The source lacks what a comparison needs, e.g. frame dimensions.
    #[error("unreadable source: {0}")]
    UnreadableSource(String),
}
