/// Linear-interpolation resampler for stereo interleaved audio.
/// Each channel is interpolated independently.
pub fn resample_stereo(samples: &[f32], src_rate: u32, target_rate: u32) -> Vec<f32> {
    if src_rate == 0 || target_rate == 0 || src_rate == target_rate {
        return samples.to_vec();
    }

    let src_frames = samples.len() / 2;
    if src_frames == 0 {
        return Vec::new();
    }

    let step = src_rate as f64 / target_rate as f64;
    let out_frames = ((src_frames as f64) / step).ceil() as usize;
    let last = src_frames - 1;
    let mut output = Vec::with_capacity(out_frames * 2);

    for i in 0..out_frames {
        let pos = i as f64 * step;
        let lower = (pos.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let frac = (pos - lower as f64).clamp(0.0, 1.0) as f32;

        for ch in 0..2 {
            let a = samples[lower * 2 + ch];
            let b = samples[upper * 2 + ch];
            output.push(a + (b - a) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_passthrough() {
        let input = vec![0.1, -0.1, 0.2, -0.2];
        assert_eq!(resample_stereo(&input, 44_100, 44_100), input);
    }

    #[test]
    fn upsampling_keeps_channels_apart() {
        let input = vec![0.0, 1.0, 1.0, 1.0];
        let out = resample_stereo(&input, 1, 2);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[0..2], &[0.0, 1.0]);
        assert!((out[2] - 0.5).abs() < 1e-6);
        assert!((out[3] - 1.0).abs() < 1e-6);
    }
}
