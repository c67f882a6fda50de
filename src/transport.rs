//! Stream transports.
//!
//! The transport fetches a camera's MJPEG feed from the stream server and
//! keeps the most recent complete JPEG per camera. Frames are decoded only
//! when someone asks for one, so idle streams cost no decode time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use image::RgbImage;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::camera::CameraId;
use crate::error::StreamError;
use crate::event::Event;
use crate::grid::StreamEndpoint;
use crate::monitor::FrameSource;
use crate::watchdog::Activation;

/// Largest JPEG accepted before the scanner gives up on the stream
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Opens and closes per-camera streams. Load failures come back as
/// `Event::TransportFailed` tagged with the activation they belong to.
pub trait StreamTransport {
    fn attach(&mut self, endpoint: &StreamEndpoint, activation: Activation);
    fn detach(&mut self, camera: CameraId);
}

/// Pulls complete JPEG images out of a multipart byte stream
#[derive(Debug, Default)]
pub struct JpegScanner {
    buf: Vec<u8>,
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

impl JpegScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the newest complete frame it finished, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, StreamError> {
        self.buf.extend_from_slice(chunk);
        let mut latest = None;
        loop {
            let Some(start) = find(&self.buf, &SOI) else {
                // Keep a trailing 0xFF in case the marker straddles chunks
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                self.buf.drain(..self.buf.len() - keep);
                break;
            };
            match find(&self.buf[start + 2..], &EOI) {
                Some(offset) => {
                    let end = start + 2 + offset + 2;
                    latest = Some(self.buf[start..end].to_vec());
                    self.buf.drain(..end);
                }
                None => {
                    self.buf.drain(..start);
                    if self.buf.len() > MAX_FRAME_BYTES {
                        self.buf.clear();
                        return Err(StreamError::Oversized(MAX_FRAME_BYTES));
                    }
                    break;
                }
            }
        }
        Ok(latest)
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

type FrameSlot = Arc<Mutex<Option<Vec<u8>>>>;

struct StreamTask {
    cancel: CancellationToken,
    latest: FrameSlot,
}

/// HTTP transport reading `multipart/x-mixed-replace` feeds from the stream server
pub struct MjpegTransport {
    server: Url,
    client: reqwest::Client,
    events: UnboundedSender<Event>,
    streams: HashMap<CameraId, StreamTask>,
}

impl MjpegTransport {
    pub fn new(server: Url, events: UnboundedSender<Event>) -> Self {
        Self {
            server,
            client: reqwest::Client::new(),
            events,
            streams: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }
}

async fn read_stream(client: reqwest::Client, url: Url, latest: FrameSlot) -> Result<(), StreamError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let mut body = response.bytes_stream();
    let mut scanner = JpegScanner::new();
    let mut verified = false;
    while let Some(chunk) = body.next().await {
        if let Some(frame) = scanner.push(&chunk?)? {
            // A source that cannot produce even one readable image counts as failed
            if !verified {
                image::load_from_memory(&frame)?;
                verified = true;
            }
            *latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(frame);
        }
    }
    Err(StreamError::Ended)
}

impl StreamTransport for MjpegTransport {
    fn attach(&mut self, endpoint: &StreamEndpoint, activation: Activation) {
        let camera = endpoint.camera;
        self.detach(camera);

        let cancel = CancellationToken::new();
        let latest: FrameSlot = Arc::new(Mutex::new(None));
        self.streams.insert(
            camera,
            StreamTask {
                cancel: cancel.clone(),
                latest: Arc::clone(&latest),
            },
        );

        let url = endpoint.url(&self.server);
        let client = self.client.clone();
        let events = self.events.clone();
        debug!(camera = %camera, path = %endpoint.path, "attaching stream");
        tokio::spawn(async move {
            let result = match url {
                Ok(url) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        result = read_stream(client, url, latest) => result,
                    }
                }
                Err(e) => Err(StreamError::from(e)),
            };
            if let Err(e) = result {
                warn!(camera = %camera, "stream failed: {}", e);
                let _ = events.send(Event::TransportFailed {
                    camera,
                    activation,
                    reason: e.to_string(),
                });
            }
        });
    }

    fn detach(&mut self, camera: CameraId) {
        if let Some(task) = self.streams.remove(&camera) {
            task.cancel.cancel();
            debug!(camera = %camera, "stream detached");
        }
    }
}

impl FrameSource for MjpegTransport {
    fn latest_frame(&self, camera: CameraId) -> Option<RgbImage> {
        let task = self.streams.get(&camera)?;
        let jpeg = task.latest.lock().unwrap_or_else(|p| p.into_inner()).clone()?;
        match image::load_from_memory(&jpeg) {
            Ok(frame) => Some(frame.to_rgb8()),
            Err(e) => {
                trace!(camera = %camera, "frame decode failed: {}", e);
                None
            }
        }
    }
}

impl Drop for MjpegTransport {
    fn drop(&mut self) {
        for task in self.streams.values() {
            task.cancel.cancel();
        }
    }
}
