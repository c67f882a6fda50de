//! Camera fleet lifecycle.
//!
//! `Fleet` is the context object the application owns for its whole run. It
//! holds the registry, grid layout, stream watchdogs and anomaly monitor, and
//! talks to the outside world only through the injected store, transport,
//! notifier and alarm. The rendering layer drives it with the `on_*` command
//! handlers; background tasks drive it with `Event`s through `handle_event`.
//!
//! Per-camera states are Idle, Active and Error. Toggle moves Idle or Error to
//! Active (a fresh attach) and Active back to Idle. A watchdog firing moves
//! Active to Error. Delete stops an Active camera before removing it.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::alarm::Alarm;
use crate::camera::{CameraDefinition, CameraId, CameraState};
use crate::error::FleetError;
use crate::event::Event;
use crate::grid::{self, GridLayout, Slot, StreamEndpoint};
use crate::monitor::{AnomalyMonitor, FrameSource, TickOutcome};
use crate::notify::{Level, Notifier};
use crate::registry::CameraRegistry;
use crate::store::{Snapshot, SnapshotStore};
use crate::transport::StreamTransport;
use crate::watchdog::{Activation, WatchdogSet};

/// Delay before an auto-start camera is started, letting the view settle
pub const AUTO_START_GRACE: Duration = Duration::from_millis(500);

/// An alert the monitor decided to raise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRaised {
    pub camera: CameraId,
    pub name: String,
    pub matches: usize,
}

pub struct Fleet<S, T, N, A> {
    registry: CameraRegistry,
    layout: GridLayout,
    watchdogs: WatchdogSet,
    monitor: AnomalyMonitor,
    store: S,
    transport: T,
    notifier: N,
    alarm: A,
    events: UnboundedSender<Event>,
    /// Cameras to start once the predefined list has been resolved
    pending_start: Vec<CameraId>,
    /// Registry revision the outstanding predefined request was made at
    awaiting_predefined: Option<u64>,
}

impl<S, T, N, A> Fleet<S, T, N, A>
where
    S: SnapshotStore,
    T: StreamTransport + FrameSource,
    N: Notifier,
    A: Alarm,
{
    pub fn new(
        store: S,
        transport: T,
        notifier: N,
        alarm: A,
        layout: GridLayout,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            registry: CameraRegistry::new(),
            layout,
            watchdogs: WatchdogSet::new(),
            monitor: AnomalyMonitor::new(),
            store,
            transport,
            notifier,
            alarm,
            events,
            pending_start: Vec::new(),
            awaiting_predefined: None,
        }
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    #[cfg(test)]
    pub fn monitor(&self) -> &AnomalyMonitor {
        &self.monitor
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    #[cfg(test)]
    pub fn is_watched(&self, id: CameraId) -> bool {
        self.watchdogs.is_armed(id)
    }

    /// Current grid render
    pub fn slots(&self) -> Vec<Slot> {
        grid::render(self.registry.list(), self.layout)
    }

    /// Load the saved snapshot, or fall back to the default camera.
    ///
    /// Returns the registry revision to tag the predefined-list request with.
    /// Cameras that were streaming when saved, and a freshly created default
    /// camera, are started once that request resolves.
    pub fn bootstrap(&mut self) -> u64 {
        match self.store.load() {
            Ok(Some(snapshot)) => {
                let (cameras, resume, next_id) = snapshot.into_cameras();
                info!(cameras = cameras.len(), "restored saved cameras");
                self.registry.restore(cameras, next_id);
                self.pending_start = resume;
            }
            Ok(None) => {
                info!("no saved cameras, using default camera");
                self.add_default();
            }
            Err(e) => {
                self.notifier.notify(
                    Level::Warning,
                    format!("Saved cameras could not be read ({}); using default camera", e),
                );
                self.add_default();
            }
        }
        self.persist();
        let revision = self.registry.revision();
        self.awaiting_predefined = Some(revision);
        revision
    }

    fn add_default(&mut self) {
        match self.registry.add(CameraDefinition::default_camera()) {
            Ok(id) => self.pending_start.push(id),
            Err(e) => warn!("default camera rejected: {}", e),
        }
    }

    /// Apply the predefined camera list fetched from the server.
    ///
    /// A response is only applied if nothing changed the registry since it was
    /// requested; otherwise it would clobber the operator's newer edits.
    pub fn apply_predefined(&mut self, revision: u64, result: Result<Vec<CameraDefinition>, FleetError>) {
        let Some(requested_at) = self.awaiting_predefined.take() else {
            debug!("unexpected predefined camera list ignored");
            return;
        };
        if requested_at != revision || self.registry.revision() != revision {
            debug!(revision, current = self.registry.revision(), "discarding stale predefined camera list");
            self.start_pending();
            return;
        }

        match result {
            Ok(definitions) if !definitions.is_empty() => self.replace_with(definitions),
            Ok(_) => {
                info!("server has no predefined cameras, keeping saved cameras");
                self.start_pending();
            }
            Err(e) => {
                self.notifier.notify(Level::Warning, format!("{}; using saved cameras", e));
                self.start_pending();
            }
        }
    }

    fn replace_with(&mut self, definitions: Vec<CameraDefinition>) {
        let mut usable = Vec::with_capacity(definitions.len());
        for definition in definitions {
            match definition.validate() {
                Ok(()) => usable.push(definition),
                Err(e) => self
                    .notifier
                    .notify(Level::Warning, format!("Skipped predefined camera: {}", e)),
            }
        }
        // Nothing to replace the saved list with
        if usable.is_empty() {
            let e = FleetError::ConfigLoad("no usable predefined cameras".to_string());
            warn!("{}", e);
            self.notifier.notify(Level::Warning, format!("{}; using saved cameras", e));
            self.start_pending();
            return;
        }

        let active: Vec<CameraId> = self
            .registry
            .list()
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.id)
            .collect();
        for id in active {
            self.stop(id, false);
        }
        self.registry.clear();
        self.pending_start.clear();

        let mut loaded = 0;
        for definition in usable {
            let auto_start = definition.auto_start;
            match self.registry.add(definition) {
                Ok(id) => {
                    loaded += 1;
                    if auto_start {
                        self.schedule_auto_start(id);
                    }
                }
                Err(e) => self
                    .notifier
                    .notify(Level::Warning, format!("Skipped predefined camera: {}", e)),
            }
        }
        info!(cameras = loaded, "loaded predefined cameras");
        self.notifier
            .notify(Level::Info, format!("Loaded {} predefined cameras", loaded));
        self.persist();
        self.sync_primary();
    }

    fn start_pending(&mut self) {
        for id in std::mem::take(&mut self.pending_start) {
            self.schedule_auto_start(id);
        }
    }

    fn schedule_auto_start(&self, id: CameraId) {
        let events = self.events.clone();
        let due = Instant::now() + AUTO_START_GRACE;
        tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            let _ = events.send(Event::AutoStart(id));
        });
    }

    /// Add a camera from the operator's definition
    pub fn on_add(&mut self, definition: CameraDefinition) -> Option<CameraId> {
        let auto_start = definition.auto_start;
        let id = match self.registry.add(definition) {
            Ok(id) => id,
            Err(e) => {
                self.notifier.notify(Level::Error, e.to_string());
                return None;
            }
        };
        let name = self.registry.get(id).map(|c| c.name.clone()).unwrap_or_default();
        self.persist();
        self.notifier
            .notify(Level::Success, format!("Camera \"{}\" added", name));
        if auto_start {
            self.schedule_auto_start(id);
        }
        Some(id)
    }

    /// Start a stopped camera or stop a streaming one
    pub fn on_toggle(&mut self, id: CameraId) {
        let Some(camera) = self.registry.get(id) else {
            return;
        };
        match camera.state {
            CameraState::Active => self.stop(id, true),
            CameraState::Idle | CameraState::Error => self.start(id),
        }
        self.persist();
        self.sync_primary();
    }

    /// Remove a camera, stopping it first if it is streaming
    pub fn on_delete(&mut self, id: CameraId) {
        let Some(camera) = self.registry.get(id) else {
            return;
        };
        if camera.is_active() {
            self.stop(id, true);
        }
        self.watchdogs.disarm(id);
        self.pending_start.retain(|p| *p != id);
        if let Some(camera) = self.registry.remove(id) {
            info!(camera = %id, name = %camera.name, "camera deleted");
        }
        self.persist();
        self.notifier.notify(Level::Info, "Camera deleted".to_string());
        self.sync_primary();
    }

    /// Promote a camera to the primary slot and show it alone
    pub fn on_maximize(&mut self, id: CameraId) {
        if !self.registry.reorder_to_front(id) {
            return;
        }
        self.layout = GridLayout::try_from(1).unwrap_or(self.layout);
        self.persist();
        self.sync_primary();
    }

    /// Change how many slots are shown. Camera state is untouched.
    pub fn on_layout_change(&mut self, size: u32) -> bool {
        match GridLayout::try_from(size) {
            Ok(layout) => {
                self.layout = layout;
                true
            }
            Err(e) => {
                self.notifier.notify(Level::Error, e.to_string());
                false
            }
        }
    }

    /// A stream transport reported a terminal load failure
    pub fn on_transport_failure(&mut self, id: CameraId, activation: Activation, reason: &str) {
        if !self.watchdogs.fire(id, activation) {
            debug!(camera = %id, "ignoring failure from a stale stream");
            return;
        }
        let Some(camera) = self.registry.get_mut(id) else {
            return;
        };
        camera.state = CameraState::Error;
        camera.endpoint = None;
        let name = camera.name.clone();
        self.transport.detach(id);
        warn!(camera = %id, "{}", FleetError::TransportFailure { camera: id, reason: reason.to_string() });
        self.notifier
            .notify(Level::Error, format!("Stream for {} failed to load", name));
        self.persist();
        self.sync_primary();
    }

    /// Grace delay for an auto-start camera elapsed
    pub fn on_auto_start(&mut self, id: CameraId) {
        match self.registry.get(id) {
            Some(camera) if !camera.is_active() => {
                self.start(id);
                self.persist();
                self.sync_primary();
            }
            _ => {}
        }
    }

    /// Handle one sampler tick; plays the alarm when an alert is raised
    pub fn on_sampler_tick(&mut self, generation: u64) -> Option<AlertRaised> {
        let outcome = self.monitor.tick(
            generation,
            self.registry.primary(),
            &self.transport,
            Instant::now(),
        );
        let TickOutcome::Alert { camera, matches } = outcome else {
            return None;
        };

        let name = self.registry.get(camera).map(|c| c.name.clone()).unwrap_or_default();
        self.alarm.sound();
        self.notifier
            .notify(Level::Warning, format!("Unknown person detected on {}", name));
        Some(AlertRaised { camera, name, matches })
    }

    /// Dispatch an event posted by a background task
    pub fn handle_event(&mut self, event: Event) -> Option<AlertRaised> {
        match event {
            Event::SamplerTick { generation } => return self.on_sampler_tick(generation),
            Event::TransportFailed {
                camera,
                activation,
                reason,
            } => self.on_transport_failure(camera, activation, &reason),
            Event::AutoStart(camera) => self.on_auto_start(camera),
            Event::Predefined { revision, result } => self.apply_predefined(revision, result),
        }
        None
    }

    /// Detach every stream and stop sampling
    pub fn shutdown(&mut self) {
        self.monitor.stop();
        let ids: Vec<CameraId> = self.registry.list().iter().map(|c| c.id).collect();
        for id in ids {
            if self.watchdogs.disarm(id).is_some() {
                self.transport.detach(id);
            }
        }
    }

    fn start(&mut self, id: CameraId) {
        let activation = self.watchdogs.arm(id);
        let Some(camera) = self.registry.get_mut(id) else {
            self.watchdogs.disarm(id);
            return;
        };
        let endpoint = StreamEndpoint::resolve(id, &camera.source);
        camera.state = CameraState::Active;
        camera.endpoint = Some(endpoint.clone());
        let name = camera.name.clone();

        self.transport.attach(&endpoint, activation);
        self.notifier.notify(Level::Info, format!("{} started", name));
    }

    fn stop(&mut self, id: CameraId, announce: bool) {
        self.watchdogs.disarm(id);
        let Some(camera) = self.registry.get_mut(id) else {
            return;
        };
        camera.state = CameraState::Idle;
        camera.endpoint = None;
        let name = camera.name.clone();

        self.transport.detach(id);
        if announce {
            self.notifier.notify(Level::Info, format!("{} stopped", name));
        }
    }

    /// Keep the sampler on whichever camera currently streams in slot 0
    fn sync_primary(&mut self) {
        let primary = self
            .registry
            .primary()
            .filter(|c| c.is_active() && c.endpoint.is_some())
            .map(|c| c.id);
        match (primary, self.monitor.sampling()) {
            (Some(p), Some(s)) if p == s => {}
            (Some(p), _) => self.monitor.start(p, self.events.clone()),
            (None, Some(_)) => self.monitor.stop(),
            (None, None) => {}
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&Snapshot::capture(&self.registry)) {
            self.notifier
                .notify(Level::Error, format!("Could not save camera configuration: {}", e));
        }
    }
}
