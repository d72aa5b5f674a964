//! Transport: the control-side state machine and the render-side clock.
//!
//! The clock is the only notion of "where we are" in the song. Track sources
//! never keep their own playhead; they derive it from the clock on every
//! frame, which is what keeps stems sample-aligned through seeks and rate
//! changes.

use serde::{Deserialize, Serialize};

use super::error::EngineError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransportPhase {
    /// No song selected
    Idle,
    /// Tracks are resolving
    Loading,
    /// Loaded and stopped
    Ready,
    Playing,
    Paused,
}

/// Control-side transport state.
#[derive(Debug, Clone)]
pub struct Transport {
    phase: TransportPhase,
    duration_seconds: f64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            phase: TransportPhase::Idle,
            duration_seconds: 0.0,
        }
    }
}

impl Transport {
    pub fn phase(&self) -> TransportPhase {
        self.phase
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.phase == TransportPhase::Playing
    }

    pub fn has_song(&self) -> bool {
        !matches!(self.phase, TransportPhase::Idle | TransportPhase::Loading)
    }

    pub fn reset(&mut self) {
        self.phase = TransportPhase::Idle;
        self.duration_seconds = 0.0;
    }

    pub fn begin_loading(&mut self) {
        self.phase = TransportPhase::Loading;
        self.duration_seconds = 0.0;
    }

    pub fn finish_loading(&mut self, duration_seconds: f64) {
        self.phase = TransportPhase::Ready;
        self.duration_seconds = duration_seconds.max(0.0);
    }

    /// Checks that a start is allowed. `Ok(false)` means already playing.
    pub fn check_start(&self, pending: impl FnOnce() -> Vec<String>) -> Result<bool, EngineError> {
        match self.phase {
            TransportPhase::Idle => Err(EngineError::NoSongSelected),
            TransportPhase::Loading => Err(EngineError::NotReady {
                pending: pending(),
            }),
            TransportPhase::Playing => Ok(false),
            TransportPhase::Ready | TransportPhase::Paused => Ok(true),
        }
    }

    pub fn mark_playing(&mut self) {
        self.phase = TransportPhase::Playing;
    }

    /// Returns true when the transport actually paused.
    pub fn pause(&mut self) -> bool {
        if self.phase == TransportPhase::Playing {
            self.phase = TransportPhase::Paused;
            return true;
        }
        false
    }

    /// Returns true when there was a loaded song to stop.
    pub fn stop(&mut self) -> bool {
        match self.phase {
            TransportPhase::Playing | TransportPhase::Paused | TransportPhase::Ready => {
                self.phase = TransportPhase::Ready;
                true
            }
            TransportPhase::Idle | TransportPhase::Loading => false,
        }
    }

    pub fn clamp_seek(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        seconds.clamp(0.0, self.duration_seconds)
    }
}

/// Render-side clock. Counts source frames; advances by the playback rate
/// for every rendered output frame.
#[derive(Debug, Clone)]
pub struct TransportClock {
    sample_rate: u32,
    position: f64,
    rate: f64,
    running: bool,
    loop_frames: f64,
}

impl TransportClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            position: 0.0,
            rate: 1.0,
            running: false,
            loop_frames: 0.0,
        }
    }

    pub fn position_frames(&self) -> f64 {
        self.position
    }

    pub fn position_seconds(&self) -> f64 {
        self.position / self.sample_rate as f64
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    /// Song length; the clock wraps here so the song loops as a whole.
    pub fn set_loop_seconds(&mut self, seconds: f64) {
        self.loop_frames = (seconds * self.sample_rate as f64).max(0.0);
    }

    pub fn seek_seconds(&mut self, seconds: f64) {
        self.position = (seconds * self.sample_rate as f64).max(0.0);
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.position = 0.0;
    }

    #[inline]
    pub fn advance(&mut self) {
        if !self.running {
            return;
        }
        self.position += self.rate;
        if self.loop_frames > 0.0 && self.position >= self.loop_frames {
            self.position %= self.loop_frames;
        }
    }
}
