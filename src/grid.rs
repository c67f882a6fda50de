//! Grid slot allocation and stream endpoint resolution.
//!
//! Allocation is purely positional: slot `i` shows the camera at order `i`,
//! whatever its state. Cameras past the layout size are simply not shown.

use std::fmt;

use url::Url;
use url::form_urlencoded;

use crate::camera::{Camera, CameraId, CameraState, Source, SourceType};
use crate::error::FleetError;

/// Grid sizes the viewer knows how to lay out
pub const ALLOWED_LAYOUTS: &[u32] = &[1, 4, 6, 9];

/// Path of the server's multipart frame feed
const VIDEO_FEED_PATH: &str = "/video_feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout(u32);

impl GridLayout {
    pub fn size(self) -> usize {
        self.0 as usize
    }
}

impl Default for GridLayout {
    fn default() -> Self {
        GridLayout(4)
    }
}

impl TryFrom<u32> for GridLayout {
    type Error = FleetError;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        if ALLOWED_LAYOUTS.contains(&size) {
            Ok(GridLayout(size))
        } else {
            Err(FleetError::Validation(format!(
                "Unsupported grid layout {}, expected one of 1/4/6/9",
                size
            )))
        }
    }
}

impl fmt::Display for GridLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the rendering layer should attach a camera's stream transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub camera: CameraId,
    pub source_type: SourceType,
    pub source: String,
    /// Cache-busting token, fresh for every activation
    pub token: String,
    /// Server-relative request path including the query string
    pub path: String,
}

impl StreamEndpoint {
    pub fn resolve(camera: CameraId, source: &Source) -> Self {
        let token = format!("{:016x}", rand::random::<u64>());
        let locator = source.locator();
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("source", &locator)
            .append_pair("camera_id", &camera.to_string())
            .append_pair("t", &token)
            .finish();

        Self {
            camera,
            source_type: source.kind(),
            source: locator,
            token,
            path: format!("{}?{}", VIDEO_FEED_PATH, query),
        }
    }

    /// Absolute URL of the feed on the given server
    pub fn url(&self, server: &Url) -> Result<Url, url::ParseError> {
        server.join(&self.path)
    }
}

/// One display position in the grid
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Streaming camera; offers stop and maximize
    Active {
        index: usize,
        camera: CameraId,
        name: String,
        endpoint: StreamEndpoint,
    },
    /// Registered but not streaming; offers start. `broken` marks a failed stream.
    Idle {
        index: usize,
        camera: CameraId,
        name: String,
        broken: bool,
    },
    /// No camera at this order; offers add
    Empty { index: usize },
}

#[cfg(test)]
impl Slot {
    pub fn index(&self) -> usize {
        match self {
            Slot::Active { index, .. } | Slot::Idle { index, .. } | Slot::Empty { index } => *index,
        }
    }

    pub fn camera(&self) -> Option<CameraId> {
        match self {
            Slot::Active { camera, .. } | Slot::Idle { camera, .. } => Some(*camera),
            Slot::Empty { .. } => None,
        }
    }
}

/// Map the leading cameras onto `layout.size()` slots
pub fn render(cameras: &[Camera], layout: GridLayout) -> Vec<Slot> {
    (0..layout.size())
        .map(|index| match cameras.get(index) {
            Some(camera) => match (&camera.state, &camera.endpoint) {
                (CameraState::Active, Some(endpoint)) => Slot::Active {
                    index,
                    camera: camera.id,
                    name: camera.name.clone(),
                    endpoint: endpoint.clone(),
                },
                (state, _) => Slot::Idle {
                    index,
                    camera: camera.id,
                    name: camera.name.clone(),
                    broken: *state == CameraState::Error,
                },
            },
            None => Slot::Empty { index },
        })
        .collect()
}
