//! Pitch shifting via signalsmith-stretch.
//!
//! Blocks go through the stretcher with equal input and output lengths, so
//! the audio is transposed without changing its duration. At a ratio of
//! exactly 1.0 the stretcher is skipped and blocks pass through untouched.

use signalsmith_stretch::Stretch;

/// Number of channels (stereo)
const CHANNELS: u32 = 2;

/// Frequency ratio for a semitone offset.
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2f32.powf(semitones / 12.0)
}

pub fn ratio_to_semitones(ratio: f32) -> f32 {
    12.0 * ratio.log2()
}

pub struct PitchShifter {
    stretcher: Stretch,
    ratio: f32,
    /// Copy of the block being shifted; the stretcher writes over the original
    input: Vec<f32>,
}

impl PitchShifter {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            stretcher: Stretch::preset_default(CHANNELS, sample_rate),
            ratio: 1.0,
            input: Vec::new(),
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn is_bypassed(&self) -> bool {
        (self.ratio - 1.0).abs() < 1e-6
    }

    /// Set the transpose ratio. Leaving bypass clears whatever the stretcher
    /// still held from the last time it was active.
    pub fn set_ratio(&mut self, ratio: f32) {
        if !ratio.is_finite() || ratio <= 0.0 || ratio == self.ratio {
            return;
        }
        let was_bypassed = self.is_bypassed();
        self.ratio = ratio;
        if self.is_bypassed() {
            return;
        }
        if was_bypassed {
            self.stretcher.reset();
        }
        self.stretcher
            .set_transpose_factor_semitones(ratio_to_semitones(ratio), None);
    }

    pub fn reset(&mut self) {
        self.stretcher.reset();
    }

    /// Shift an interleaved stereo block in place.
    pub fn process(&mut self, block: &mut [f32]) {
        if self.is_bypassed() || block.is_empty() {
            return;
        }
        self.input.clear();
        self.input.extend_from_slice(block);
        self.stretcher.process(&self.input[..], &mut block[..]);
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn zero_crossings(samples: impl Iterator<Item = f32>) -> usize {
        let mut count = 0;
        let mut previous = 0.0f32;
        for sample in samples {
            if previous <= 0.0 && sample > 0.0 {
                count += 1;
            }
            previous = sample;
        }
        count
    }

    fn shift_sine(shifter: &mut PitchShifter, freq: f32, sample_rate: u32) -> Vec<f32> {
        let total = sample_rate as usize;
        let mut out = Vec::with_capacity(total * 2);
        let mut block = Vec::with_capacity(1024);
        for start in (0..total).step_by(512) {
            block.clear();
            for n in start..(start + 512).min(total) {
                let x = (2.0 * PI * freq * n as f32 / sample_rate as f32).sin() * 0.5;
                block.push(x);
                block.push(x);
            }
            shifter.process(&mut block);
            out.extend_from_slice(&block);
        }
        out
    }

    #[test]
    fn unity_ratio_is_passthrough() {
        let mut shifter = PitchShifter::new(48_000);
        let mut block: Vec<f32> = (0..512).map(|n| (n as f32 * 0.05).sin()).collect();
        let original = block.clone();
        shifter.process(&mut block);
        assert_eq!(block, original);
        assert!(shifter.is_bypassed());
    }

    #[test]
    fn octave_up_doubles_frequency() {
        let sample_rate = 48_000;
        let mut shifter = PitchShifter::new(sample_rate);
        shifter.set_ratio(semitones_to_ratio(12.0));

        let out = shift_sine(&mut shifter, 220.0, sample_rate);
        let half = out.len() / 2;
        let crossings = zero_crossings(out[half..].iter().step_by(2).copied());
        // 440 Hz over half a second
        assert!((200..=240).contains(&crossings), "crossings {crossings}");
    }

    #[test]
    fn reset_drops_buffered_audio() {
        let sample_rate = 48_000;
        let mut shifter = PitchShifter::new(sample_rate);
        shifter.set_ratio(semitones_to_ratio(3.0));
        shift_sine(&mut shifter, 440.0, sample_rate);

        shifter.reset();
        let mut silence = vec![0.0; 1024];
        shifter.process(&mut silence);
        assert!(silence.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn ratio_conversions_agree() {
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-6);
        assert!((ratio_to_semitones(0.8) + 3.863).abs() < 1e-3);
        let mut shifter = PitchShifter::new(48_000);
        shifter.set_ratio(f32::NAN);
        shifter.set_ratio(-1.0);
        assert_eq!(shifter.ratio(), 1.0);
    }
}
