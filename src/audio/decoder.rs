use std::io::{Cursor, ErrorKind};

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use super::resample::resample_stereo;

/// Decoded audio data, always stereo interleaved.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples [L0, R0, L1, R1, ...]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (always 2)
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Lowercased file extension of a URL or path, ignoring any query string.
pub fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Decode an encoded audio buffer to stereo interleaved samples at `target_rate`.
/// Mono sources are duplicated to both channels; multi-channel sources keep
/// their first two channels.
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    target_rate: u32,
) -> Result<DecodedAudio, String> {
    if bytes.is_empty() {
        return Err("Audio buffer is empty".into());
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Failed to probe audio data: {}", e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| "Audio data contains no default track".to_string())?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "Track missing sample rate".to_string())?;

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Failed to create decoder: {}", e))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(err))
                if err.kind() == ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(format!("Failed to read audio packet: {}", err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buffer = decoder
            .decode(&packet)
            .map_err(|e| format!("Failed to decode audio packet: {}", e))?;

        let spec = *audio_buffer.spec();
        let src_channels = spec.channels.count();
        if src_channels == 0 {
            continue;
        }

        let mut sample_buffer = SampleBuffer::<f32>::new(audio_buffer.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(audio_buffer);

        for frame in sample_buffer.samples().chunks_exact(src_channels) {
            let (left, right) = if src_channels == 1 {
                (frame[0], frame[0])
            } else {
                (frame[0], frame[1])
            };
            samples.push(left);
            samples.push(right);
        }
    }

    if samples.is_empty() {
        return Err("Audio data produced no samples".into());
    }

    let (samples, sample_rate) = if target_rate > 0 && sample_rate != target_rate {
        (resample_stereo(&samples, sample_rate, target_rate), target_rate)
    } else {
        (samples, sample_rate)
    };

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for _ in 0..channels {
                    writer.write_sample(((i % 100) as i16) * 100).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn mono_wav_is_duplicated_to_stereo() {
        let decoded = decode_bytes(wav_bytes(1, 48_000, 4_800), Some("wav"), 48_000).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 4_800);
        assert!((decoded.duration_seconds() - 0.1).abs() < 1e-9);
        for frame in decoded.samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn decodes_to_target_rate() {
        let decoded = decode_bytes(wav_bytes(2, 24_000, 2_400), Some("wav"), 48_000).unwrap();
        assert_eq!(decoded.sample_rate, 48_000);
        assert!((decoded.duration_seconds() - 0.1).abs() < 0.001);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = decode_bytes(b"definitely not audio".to_vec(), Some("mp3"), 48_000);
        assert!(err.is_err());
        assert!(decode_bytes(Vec::new(), None, 48_000).is_err());
    }

    #[test]
    fn extension_hint_ignores_query() {
        assert_eq!(extension_hint("https://cdn/x/Lead Vox.MP3?sig=1"), Some("mp3".into()));
        assert_eq!(
            extension_hint("/api/download-stream?fileKey=a.wav"),
            None
        );
        assert_eq!(extension_hint("/tmp/click.wav"), Some("wav".into()));
    }
}
