//! Level probes: passive taps that record the last few hundred frames of a
//! signal and publish peak/RMS readings for the metering side.

use std::sync::Arc;

use super::atomic::AtomicF32;

/// Analysis window in frames
pub const PROBE_WINDOW: usize = 256;

/// Linear amplitude to decibels; silence maps to negative infinity.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 || !amplitude.is_finite() {
        f32::NEG_INFINITY
    } else {
        20.0 * amplitude.log10()
    }
}

/// Readings published by the audio thread, read without locking.
#[derive(Debug)]
pub struct ProbeReading {
    peak: AtomicF32,
    rms: AtomicF32,
}

impl ProbeReading {
    fn new() -> Self {
        Self {
            peak: AtomicF32::new(0.0),
            rms: AtomicF32::new(0.0),
        }
    }

    /// Peak absolute sample over the window, linear
    pub fn peak(&self) -> f32 {
        self.peak.load()
    }

    pub fn peak_db(&self) -> f32 {
        amplitude_to_db(self.peak())
    }

    pub fn rms(&self) -> f32 {
        self.rms.load()
    }

    pub fn rms_db(&self) -> f32 {
        amplitude_to_db(self.rms())
    }
}

pub struct LevelProbe {
    frames: Vec<[f32; 2]>,
    pos: usize,
    reading: Arc<ProbeReading>,
}

impl LevelProbe {
    pub fn new(window: usize) -> Self {
        Self {
            frames: vec![[0.0; 2]; window.max(1)],
            pos: 0,
            reading: Arc::new(ProbeReading::new()),
        }
    }

    pub fn reading(&self) -> Arc<ProbeReading> {
        self.reading.clone()
    }

    #[inline]
    pub fn tap(&mut self, left: f32, right: f32) {
        self.frames[self.pos] = [left, right];
        self.pos = (self.pos + 1) % self.frames.len();
    }

    pub fn clear(&mut self) {
        self.frames.fill([0.0; 2]);
        self.pos = 0;
        self.publish();
    }

    /// Recompute peak and RMS over the window. Called once per rendered block.
    pub fn publish(&self) {
        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f32;
        for [l, r] in &self.frames {
            peak = peak.max(l.abs()).max(r.abs());
            sum_sq += (l * l + r * r) * 0.5;
        }
        let rms = (sum_sq / self.frames.len() as f32).sqrt();
        self.reading.peak.store(peak);
        self.reading.rms.store(rms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conversion() {
        assert_eq!(amplitude_to_db(0.0), f32::NEG_INFINITY);
        assert!((amplitude_to_db(1.0)).abs() < 1e-6);
        assert!((amplitude_to_db(0.5) + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn peak_tracks_loudest_sample_in_window() {
        let mut probe = LevelProbe::new(4);
        let reading = probe.reading();
        for sample in [0.1, -0.8, 0.2, 0.3] {
            probe.tap(sample, 0.0);
        }
        probe.publish();
        assert!((reading.peak() - 0.8).abs() < 1e-6);

        // Push the loud sample out of the window
        probe.tap(0.1, 0.1);
        probe.publish();
        assert!((reading.peak() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn cleared_probe_reads_silence() {
        let mut probe = LevelProbe::new(8);
        probe.tap(1.0, 1.0);
        probe.publish();
        probe.clear();
        assert_eq!(probe.reading().peak_db(), f32::NEG_INFINITY);
        assert_eq!(probe.reading().rms(), 0.0);
    }
}
