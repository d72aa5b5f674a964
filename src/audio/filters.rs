//! Peaking biquad (RBJ cookbook) used by the master-bus EQ.
//! Processes stereo frames with independent state per channel.

#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

#[derive(Debug, Clone)]
pub struct PeakingFilter {
    center_hz: f32,
    q: f32,
    gain_db: f32,
    sample_rate: f32,
    coeffs: Coefficients,
    state: [ChannelState; 2],
}

fn normalize_center(center_hz: f32, sample_rate: f32) -> Option<f32> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return None;
    }
    let max_center = (sample_rate * 0.5 - 1.0).max(1.0);
    Some(center_hz.max(1.0).min(max_center))
}

impl PeakingFilter {
    pub fn new(center_hz: f32, q: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            center_hz,
            q: q.max(0.01),
            gain_db: 0.0,
            sample_rate,
            coeffs: Coefficients::default(),
            state: [ChannelState::default(); 2],
        };
        filter.recompute();
        filter
    }

    pub fn center_hz(&self) -> f32 {
        self.center_hz
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Coefficients are only rebuilt when the gain actually changes.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        if gain_db == self.gain_db {
            return;
        }
        self.gain_db = gain_db;
        self.recompute();
    }

    pub fn reset(&mut self) {
        self.state = [ChannelState::default(); 2];
    }

    fn recompute(&mut self) {
        let Some(center) = normalize_center(self.center_hz, self.sample_rate) else {
            // Unity passthrough
            self.coeffs = Coefficients {
                b0: 1.0,
                ..Coefficients::default()
            };
            return;
        };

        let a = 10f32.powf(self.gain_db / 40.0);
        let omega = 2.0 * std::f32::consts::PI * center / self.sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * self.q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        self.coeffs = Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        };
    }

    #[inline]
    pub fn process(&mut self, channel: usize, x: f32) -> f32 {
        let c = self.coeffs;
        let s = &mut self.state[channel & 1];
        let y = c.b0 * x + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
        s.x2 = s.x1;
        s.x1 = x;
        s.y2 = s.y1;
        s.y1 = y;
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_state_gain(filter: &mut PeakingFilter, freq: f32, sample_rate: f32) -> f32 {
        let mut peak = 0.0f32;
        let total = (sample_rate * 0.5) as usize;
        for n in 0..total {
            let x = (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate).sin();
            let y = filter.process(0, x);
            if n > total / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn zero_gain_is_transparent() {
        let mut filter = PeakingFilter::new(1000.0, 1.5, 48_000.0);
        for n in 0..64 {
            let x = (n as f32 * 0.37).sin();
            assert!((filter.process(0, x) - x).abs() < 1e-5);
        }
    }

    #[test]
    fn boost_at_center_matches_gain() {
        let mut filter = PeakingFilter::new(1000.0, 1.5, 48_000.0);
        filter.set_gain_db(12.0);
        let peak = steady_state_gain(&mut filter, 1000.0, 48_000.0);
        let expected = 10f32.powf(12.0 / 20.0);
        assert!((peak - expected).abs() < 0.1, "peak {peak} vs {expected}");
    }

    #[test]
    fn cut_far_from_center_is_mild() {
        let mut filter = PeakingFilter::new(60.0, 1.5, 48_000.0);
        filter.set_gain_db(-12.0);
        let peak = steady_state_gain(&mut filter, 8000.0, 48_000.0);
        assert!(peak > 0.9);
    }
}
