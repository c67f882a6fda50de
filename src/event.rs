//! Messages posted to the event loop by background tasks.
//!
//! Timers, stream readers and network fetches never touch the fleet directly;
//! they send one of these and the loop applies it between other handlers.

use crate::camera::{CameraDefinition, CameraId};
use crate::error::FleetError;
use crate::watchdog::Activation;

#[derive(Debug)]
pub enum Event {
    /// Periodic sampler fired
    SamplerTick { generation: u64 },
    /// A stream transport reported a terminal load failure
    TransportFailed {
        camera: CameraId,
        activation: Activation,
        reason: String,
    },
    /// Grace delay after creating an auto-start camera has elapsed
    AutoStart(CameraId),
    /// Predefined camera list response, tagged with the registry revision at request time
    Predefined {
        revision: u64,
        result: Result<Vec<CameraDefinition>, FleetError>,
    },
}
