//! Audible alert: two short decaying 800 Hz pulses.

use std::f32::consts::TAU;
use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Source};
use tracing::{debug, warn};

const TONE_HZ: f32 = 800.0;
const PULSE_LENGTH: Duration = Duration::from_millis(500);
/// Second pulse starts this long after the first begins
const PULSE_SPACING: Duration = Duration::from_millis(300);
const SAMPLE_RATE: u32 = 44_100;
const START_GAIN: f32 = 0.3;
const END_GAIN: f32 = 0.01;

/// Something that can play the alert pattern now
pub trait Alarm {
    fn sound(&mut self);
}

/// Sine tone whose gain falls exponentially from `START_GAIN` to `END_GAIN`
#[derive(Debug, Clone)]
pub struct DecayingTone {
    frequency: f32,
    position: u32,
    total: u32,
}

impl DecayingTone {
    pub fn new(frequency: f32, length: Duration) -> Self {
        Self {
            frequency,
            position: 0,
            total: (length.as_secs_f32() * SAMPLE_RATE as f32) as u32,
        }
    }

    fn gain(&self, t: f32) -> f32 {
        let length = self.total as f32 / SAMPLE_RATE as f32;
        START_GAIN * (END_GAIN / START_GAIN).powf(t / length)
    }
}

impl Iterator for DecayingTone {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.total {
            return None;
        }
        let t = self.position as f32 / SAMPLE_RATE as f32;
        self.position += 1;
        Some((TAU * self.frequency * t).sin() * self.gain(t))
    }
}

impl Source for DecayingTone {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.total - self.position) as usize)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(self.total as f32 / SAMPLE_RATE as f32))
    }
}

/// The full alert pattern: two pulses, the second offset by `PULSE_SPACING`
pub fn alert_pattern() -> impl Source<Item = f32> + Send + 'static {
    let first = DecayingTone::new(TONE_HZ, PULSE_LENGTH);
    let second = DecayingTone::new(TONE_HZ, PULSE_LENGTH).delay(PULSE_SPACING);
    first.mix(second)
}

/// Plays the alert pattern on the default output device
pub struct ToneAlarm {
    /// Keep the stream alive (must not be dropped while playing)
    output: Option<(OutputStream, OutputStreamHandle)>,
}

impl ToneAlarm {
    /// Open the default audio output. Without a device the alarm stays silent.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::silent();
        }
        match OutputStream::try_default() {
            Ok(output) => Self { output: Some(output) },
            Err(e) => {
                warn!("Failed to open audio output, alerts will be silent: {}", e);
                Self::silent()
            }
        }
    }

    pub fn silent() -> Self {
        Self { output: None }
    }

    pub fn is_audible(&self) -> bool {
        self.output.is_some()
    }
}

impl Alarm for ToneAlarm {
    fn sound(&mut self) {
        let Some((_, handle)) = &self.output else {
            debug!("alarm muted");
            return;
        };
        if let Err(e) = handle.play_raw(alert_pattern()) {
            warn!("Failed to play alert tone: {}", e);
        }
    }
}
