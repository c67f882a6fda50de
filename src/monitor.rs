//! Anomaly monitor: samples the primary stream for the "unknown person" overlay.
//!
//! The detection server draws a red label under faces it cannot match. We do
//! not get detections back, so this polls the primary stream's latest frame
//! every 1.5 s and counts strongly red pixels in a band along the bottom of
//! the frame. Enough of them raises an alert, at most once every 3 s.
//!
//! It is a convenience signal. False positives and negatives are acceptable.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::camera::{Camera, CameraId};
use crate::event::Event;

/// Sampling cadence
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(1500);

/// Height of the scanned band at the bottom of the frame, in pixels
pub const BAND_HEIGHT: u32 = 100;

/// Matching pixels needed (strictly more than) to consider the overlay present
pub const MATCH_THRESHOLD: usize = 500;

/// Minimum time between two alerts
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(3);

/// Provides the most recent frame of a streaming camera
pub trait FrameSource {
    fn latest_frame(&self, camera: CameraId) -> Option<RgbImage>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("no frame received yet")]
    FrameUnavailable,
    #[error("frame has zero size")]
    EmptyFrame,
}

/// Red channel high, green and blue low
pub fn is_alert_color(pixel: &Rgb<u8>) -> bool {
    let [r, g, b] = pixel.0;
    r > 200 && g < 50 && b < 50
}

/// Count alert-colored pixels in the bottom band of a frame
pub fn scan_alert_band(frame: &RgbImage) -> usize {
    let (width, height) = frame.dimensions();
    let top = height.saturating_sub(BAND_HEIGHT);
    let mut matches = 0;
    for y in top..height {
        for x in 0..width {
            if is_alert_color(frame.get_pixel(x, y)) {
                matches += 1;
            }
        }
    }
    matches
}

/// Capture and scan one frame
pub fn sample(frame: Option<RgbImage>) -> Result<usize, SampleError> {
    let frame = frame.ok_or(SampleError::FrameUnavailable)?;
    if frame.width() == 0 || frame.height() == 0 {
        return Err(SampleError::EmptyFrame);
    }
    Ok(scan_alert_band(&frame))
}

/// Enforces the minimum spacing between alerts, measured from decision time
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    last: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// Returns true and records `now` if the cooldown has elapsed
    pub fn try_pass(&mut self, now: Instant) -> bool {
        let open = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        };
        if open {
            self.last = Some(now);
        }
        open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a sampler that is no longer current
    Ignored,
    /// Primary stream went away; the sampler cancelled itself
    Stopped,
    /// Sampled (or failed to sample) without raising an alert
    Quiet,
    Alert { camera: CameraId, matches: usize },
}

struct SamplerTimer {
    camera: CameraId,
    generation: u64,
    cancel: CancellationToken,
}

/// Decrements the live-timer count when a sampler task exits
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct AnomalyMonitor {
    period: Duration,
    timer: Option<SamplerTimer>,
    generation: u64,
    gate: CooldownGate,
    live: Arc<AtomicUsize>,
}

impl Default for AnomalyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyMonitor {
    pub fn new() -> Self {
        Self {
            period: SAMPLE_PERIOD,
            timer: None,
            generation: 0,
            gate: CooldownGate::new(ALERT_COOLDOWN),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Begin sampling a camera. Any previous sampler is cancelled first.
    pub fn start(&mut self, camera: CameraId, events: UnboundedSender<Event>) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let period = self.period;

        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));
        // First tick is one period after activation, not after the task first runs
        let first = Instant::now() + period;
        tokio::spawn(async move {
            let _guard = guard;
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if events.send(Event::SamplerTick { generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        debug!(camera = %camera, generation, "anomaly sampler started");
        self.timer = Some(SamplerTimer {
            camera,
            generation,
            cancel,
        });
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
            debug!(camera = %timer.camera, generation = timer.generation, "anomaly sampler stopped");
        }
    }

    /// Camera currently being sampled
    pub fn sampling(&self) -> Option<CameraId> {
        self.timer.as_ref().map(|t| t.camera)
    }

    /// Sampler tasks still running
    #[cfg(test)]
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Handle one sampler tick against the current primary camera
    pub fn tick(
        &mut self,
        generation: u64,
        primary: Option<&Camera>,
        frames: &dyn FrameSource,
        now: Instant,
    ) -> TickOutcome {
        let camera = match &self.timer {
            Some(timer) if timer.generation == generation => timer.camera,
            _ => return TickOutcome::Ignored,
        };

        let still_primary = primary
            .is_some_and(|c| c.id == camera && c.is_active() && c.endpoint.is_some());
        if !still_primary {
            self.stop();
            return TickOutcome::Stopped;
        }

        let matches = match sample(frames.latest_frame(camera)) {
            Ok(matches) => matches,
            Err(e) => {
                trace!(camera = %camera, "sample skipped: {}", e);
                return TickOutcome::Quiet;
            }
        };

        if matches > MATCH_THRESHOLD && self.gate.try_pass(now) {
            TickOutcome::Alert { camera, matches }
        } else {
            TickOutcome::Quiet
        }
    }
}

impl Drop for AnomalyMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraDefinition, CameraState, Source};
    use crate::grid::StreamEndpoint;
    use tokio::sync::mpsc;

    const RED: Rgb<u8> = Rgb([230, 20, 20]);

    /// 640x480 frame with `count` red pixels along the bottom rows
    fn frame_with_red(count: u32) -> RgbImage {
        let mut frame = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
        for i in 0..count {
            frame.put_pixel(i % 640, 479 - i / 640, RED);
        }
        frame
    }

    struct FixedFrame(Option<RgbImage>);

    impl FrameSource for FixedFrame {
        fn latest_frame(&self, _camera: CameraId) -> Option<RgbImage> {
            self.0.clone()
        }
    }

    fn active_camera(id: u64) -> Camera {
        let mut camera = Camera::new(CameraId(id), CameraDefinition::new("Gate", Source::Local(0), false));
        camera.state = CameraState::Active;
        camera.endpoint = Some(StreamEndpoint::resolve(camera.id, &camera.source));
        camera
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_alert_color() {
        assert!(is_alert_color(&Rgb([201, 49, 49])));
        assert!(!is_alert_color(&Rgb([200, 0, 0])));
        assert!(!is_alert_color(&Rgb([255, 50, 0])));
        assert!(!is_alert_color(&Rgb([255, 0, 50])));
    }

    #[test]
    fn test_scan_only_counts_bottom_band() {
        let mut frame = RgbImage::from_pixel(100, 300, Rgb([0, 0, 0]));
        // Top of the frame, outside the band
        for x in 0..100 {
            frame.put_pixel(x, 10, RED);
        }
        assert_eq!(scan_alert_band(&frame), 0);
        // First row of the band
        for x in 0..100 {
            frame.put_pixel(x, 200, RED);
        }
        assert_eq!(scan_alert_band(&frame), 100);
    }

    #[test]
    fn test_scan_short_frame_uses_whole_height() {
        let frame = RgbImage::from_pixel(10, 20, RED);
        assert_eq!(scan_alert_band(&frame), 200);
    }

    #[test]
    fn test_sample_errors() {
        assert_eq!(sample(None), Err(SampleError::FrameUnavailable));
        assert_eq!(sample(Some(RgbImage::new(0, 0))), Err(SampleError::EmptyFrame));
        assert_eq!(sample(Some(frame_with_red(501))), Ok(501));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_one_second_apart_fires_once() {
        let mut gate = CooldownGate::new(ALERT_COOLDOWN);
        let t0 = Instant::now();
        assert!(gate.try_pass(t0));
        assert!(!gate.try_pass(t0 + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_four_seconds_apart_fires_twice() {
        let mut gate = CooldownGate::new(ALERT_COOLDOWN);
        let t0 = Instant::now();
        assert!(gate.try_pass(t0));
        assert!(gate.try_pass(t0 + Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_live_timer() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();

        monitor.start(CameraId(1), tx.clone());
        settle().await;
        assert_eq!(monitor.live_timers(), 1);

        monitor.start(CameraId(2), tx);
        settle().await;
        assert_eq!(monitor.live_timers(), 1);
        assert_eq!(monitor.sampling(), Some(CameraId(2)));

        monitor.stop();
        settle().await;
        assert_eq!(monitor.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_ticks_on_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        monitor.start(CameraId(1), tx);

        tokio::time::advance(Duration::from_millis(1400)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert!(matches!(rx.try_recv(), Ok(Event::SamplerTick { generation: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_alerts_with_cooldown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        let camera = active_camera(1);
        let frames = FixedFrame(Some(frame_with_red(800)));
        monitor.start(camera.id, tx);

        let t0 = Instant::now();
        assert_eq!(
            monitor.tick(1, Some(&camera), &frames, t0),
            TickOutcome::Alert { camera: camera.id, matches: 800 }
        );
        assert_eq!(monitor.tick(1, Some(&camera), &frames, t0 + Duration::from_secs(1)), TickOutcome::Quiet);
        assert!(matches!(
            monitor.tick(1, Some(&camera), &frames, t0 + Duration::from_secs(4)),
            TickOutcome::Alert { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_threshold_is_strict() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        let camera = active_camera(1);
        monitor.start(camera.id, tx);
        let frames = FixedFrame(Some(frame_with_red(500)));
        assert_eq!(monitor.tick(1, Some(&camera), &frames, Instant::now()), TickOutcome::Quiet);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_swallows_missing_frame() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        let camera = active_camera(1);
        monitor.start(camera.id, tx);
        assert_eq!(monitor.tick(1, Some(&camera), &FixedFrame(None), Instant::now()), TickOutcome::Quiet);
        assert_eq!(monitor.sampling(), Some(camera.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_guard_stops_when_primary_inactive() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        let mut camera = active_camera(1);
        monitor.start(camera.id, tx);

        camera.state = CameraState::Idle;
        camera.endpoint = None;
        let frames = FixedFrame(Some(frame_with_red(900)));
        assert_eq!(monitor.tick(1, Some(&camera), &frames, Instant::now()), TickOutcome::Stopped);
        assert_eq!(monitor.sampling(), None);
        settle().await;
        assert_eq!(monitor.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut monitor = AnomalyMonitor::new();
        let camera = active_camera(1);
        monitor.start(camera.id, tx.clone());
        monitor.start(camera.id, tx);
        let frames = FixedFrame(Some(frame_with_red(900)));
        assert_eq!(monitor.tick(1, Some(&camera), &frames, Instant::now()), TickOutcome::Ignored);
    }
}
