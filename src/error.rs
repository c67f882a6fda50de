//! Error taxonomy for the camera fleet.

use std::path::PathBuf;

use crate::camera::CameraId;

/// Failures raised by fleet operations. None of these escape the event loop:
/// each one is converted to a notification or a state transition where it occurs.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Camera name or source missing/invalid, or an unsupported grid size.
    #[error("{0}")]
    Validation(String),

    /// A stream transport failed to load its source.
    #[error("stream for camera {camera} failed: {reason}")]
    TransportFailure { camera: CameraId, reason: String },

    /// Predefined camera list or saved snapshot could not be loaded.
    #[error("could not load camera configuration: {0}")]
    ConfigLoad(String),
}

/// Errors from the persisted snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot file '{}' is not valid: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a camera's stream stopped delivering frames.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("first frame is not a readable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("stream ended")]
    Ended,

    #[error("frame exceeds {0} bytes without an end marker")]
    Oversized(usize),
}
