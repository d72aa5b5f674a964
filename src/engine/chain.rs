//! Signal chains and the render graph.
//!
//! Per track: source -> gain -> pan -> pitch shift -> level probe -> master.
//! Master bus: EQ x5 -> master gain -> fade -> level probe -> output.
//!
//! Tracks render a whole block at a time so the pitch shifter sees
//! contiguous audio; the master bus runs per frame.
//!
//! The graph is shared with the output callback behind a mutex. Anything
//! that must happen to all tracks at once (start, stop, seek, mix changes)
//! is done while holding that lock, so the audio thread never renders a
//! half-applied batch.

use std::f32::consts::FRAC_PI_4;
use std::sync::Arc;

use crate::audio::pitch::semitones_to_ratio;
use crate::audio::{DecodedAudio, LevelProbe, PeakingFilter, PitchShifter, ProbeReading};

use super::mix::{db_to_gain, MixState, TrackId, EQ_BAND_COUNT, EQ_FREQUENCIES, EQ_Q};
use super::transport::TransportClock;

/// Decoded audio plus its scheduling flag. Reads are driven by the shared
/// clock and wrap at the source length, so a started source loops forever.
pub struct TrackSource {
    audio: Arc<DecodedAudio>,
    scheduled: bool,
}

impl TrackSource {
    pub fn new(audio: Arc<DecodedAudio>) -> Self {
        Self {
            audio,
            scheduled: false,
        }
    }

    pub fn frames(&self) -> usize {
        self.audio.frames()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.audio.duration_seconds()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Playhead derived from the clock, in frames.
    pub fn playhead_frames(&self, clock_frames: f64) -> f64 {
        let len = self.frames() as f64;
        if len <= 0.0 {
            return 0.0;
        }
        clock_frames.rem_euclid(len)
    }

    #[inline]
    fn sample_at(&self, clock_frames: f64) -> (f32, f32) {
        let frames = self.frames();
        if frames == 0 {
            return (0.0, 0.0);
        }
        let pos = self.playhead_frames(clock_frames);
        let lower = (pos.floor() as usize).min(frames - 1);
        let upper = (lower + 1) % frames;
        let frac = (pos - lower as f64) as f32;
        let s = &self.audio.samples;
        let l = s[lower * 2] + (s[upper * 2] - s[lower * 2]) * frac;
        let r = s[lower * 2 + 1] + (s[upper * 2 + 1] - s[lower * 2 + 1]) * frac;
        (l, r)
    }
}

pub struct GainNode {
    gain: f32,
}

impl GainNode {
    fn new() -> Self {
        Self { gain: 1.0 }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain_db(&mut self, db: f32) {
        self.gain = db_to_gain(db);
    }
}

/// Equal-power panner, normalised to unity at centre.
pub struct PanNode {
    pan: f32,
    left: f32,
    right: f32,
}

impl PanNode {
    fn new() -> Self {
        let mut node = Self {
            pan: 0.0,
            left: 1.0,
            right: 1.0,
        };
        node.set_pan(0.0);
        node
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
        let angle = (self.pan + 1.0) * FRAC_PI_4;
        let norm = std::f32::consts::SQRT_2;
        self.left = (angle.cos() * norm).min(1.0);
        self.right = (angle.sin() * norm).min(1.0);
    }

    #[inline]
    fn process(&self, l: f32, r: f32) -> (f32, f32) {
        (l * self.left, r * self.right)
    }
}

/// Pitch node; `semitones` is the user-facing parameter. The shifter ratio
/// also cancels the pitch change caused by the playback rate.
pub struct PitchShiftNode {
    semitones: i32,
    rate: f32,
    shifter: PitchShifter,
}

impl PitchShiftNode {
    fn new(sample_rate: u32) -> Self {
        Self {
            semitones: 0,
            rate: 1.0,
            shifter: PitchShifter::new(sample_rate),
        }
    }

    pub fn semitones(&self) -> i32 {
        self.semitones
    }

    pub fn playback_rate(&self) -> f32 {
        self.rate
    }

    pub fn effective_ratio(&self) -> f32 {
        self.shifter.ratio()
    }

    pub fn set(&mut self, semitones: i32, playback_rate: f32) {
        self.semitones = semitones;
        self.rate = playback_rate;
        let ratio = semitones_to_ratio(semitones as f32) / playback_rate.max(f32::EPSILON);
        self.shifter.set_ratio(ratio);
    }
}

pub struct TrackChain {
    id: TrackId,
    name: String,
    source: TrackSource,
    gain: GainNode,
    pan: PanNode,
    pitch: PitchShiftNode,
    probe: LevelProbe,
    /// Interleaved stereo scratch for one rendered block
    block: Vec<f32>,
}

impl TrackChain {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    pub fn pan(&self) -> &PanNode {
        &self.pan
    }

    pub fn pitch(&self) -> &PitchShiftNode {
        &self.pitch
    }

    pub fn level(&self) -> Arc<ProbeReading> {
        self.probe.reading()
    }

    /// Render one block at the given clock positions and add it into `mix`.
    fn render_block(&mut self, positions: &[f64], live: bool, mix: &mut [f32]) {
        let live = live && self.source.scheduled;
        self.block.clear();
        for &position in positions {
            let (l, r) = if live {
                self.source.sample_at(position)
            } else {
                (0.0, 0.0)
            };
            let (l, r) = self.pan.process(l * self.gain.gain, r * self.gain.gain);
            self.block.push(l);
            self.block.push(r);
        }
        self.pitch.shifter.process(&mut self.block);
        for (frame, out) in self.block.chunks_exact(2).zip(mix.chunks_exact_mut(2)) {
            self.probe.tap(frame[0], frame[1]);
            out[0] += frame[0];
            out[1] += frame[1];
        }
    }
}

/// Linear ramp from full level down to silence.
struct FadeRamp {
    gain: f32,
    step: f32,
}

impl FadeRamp {
    /// None when the fade is shorter than one frame.
    fn fade_out(seconds: f32, sample_rate: u32) -> Option<Self> {
        let frames = seconds * sample_rate as f32;
        (frames >= 1.0).then(|| Self {
            gain: 1.0,
            step: 1.0 / frames,
        })
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let gain = self.gain;
        self.gain = (self.gain - self.step).max(0.0);
        gain
    }

    fn is_done(&self) -> bool {
        self.gain <= 0.0
    }
}

/// Audio still sounding after a pause or stop: a copy of the clock from the
/// moment playback ended, running under a fade-out.
struct FadeTail {
    clock: TransportClock,
    ramp: FadeRamp,
    /// Unschedule the sources when the fade ends
    stop: bool,
}

pub struct MasterBus {
    eq: [PeakingFilter; EQ_BAND_COUNT],
    gain: GainNode,
    fade_seconds: f32,
    probe: LevelProbe,
}

impl MasterBus {
    pub fn eq_gains_db(&self) -> [f32; EQ_BAND_COUNT] {
        std::array::from_fn(|i| self.eq[i].gain_db())
    }

    pub fn eq_centers(&self) -> [f32; EQ_BAND_COUNT] {
        std::array::from_fn(|i| self.eq[i].center_hz())
    }

    pub fn gain(&self) -> &GainNode {
        &self.gain
    }

    pub fn level(&self) -> Arc<ProbeReading> {
        self.probe.reading()
    }

    #[inline]
    fn process(&mut self, mut l: f32, mut r: f32, fade: f32) -> (f32, f32) {
        for band in &mut self.eq {
            l = band.process(0, l);
            r = band.process(1, r);
        }
        let g = self.gain.gain * fade;
        let (l, r) = (l * g, r * g);
        self.probe.tap(l, r);
        (l, r)
    }
}

pub fn build_track_chain(
    id: TrackId,
    name: String,
    audio: Arc<DecodedAudio>,
    sample_rate: u32,
    probe_window: usize,
) -> TrackChain {
    TrackChain {
        id,
        name,
        source: TrackSource::new(audio),
        gain: GainNode::new(),
        pan: PanNode::new(),
        pitch: PitchShiftNode::new(sample_rate),
        probe: LevelProbe::new(probe_window),
        block: Vec::new(),
    }
}

pub fn build_master_bus(sample_rate: u32, probe_window: usize) -> MasterBus {
    MasterBus {
        eq: EQ_FREQUENCIES.map(|freq| PeakingFilter::new(freq, EQ_Q, sample_rate as f32)),
        gain: GainNode::new(),
        fade_seconds: 0.0,
        probe: LevelProbe::new(probe_window),
    }
}

pub struct RenderGraph {
    sample_rate: u32,
    tracks: Vec<TrackChain>,
    master: MasterBus,
    clock: TransportClock,
    tail: Option<FadeTail>,
    /// Clock position of each frame in the block being rendered
    positions: Vec<f64>,
    mix: Vec<f32>,
}

impl RenderGraph {
    pub fn new(sample_rate: u32, master: MasterBus) -> Self {
        Self {
            sample_rate,
            tracks: Vec::new(),
            master,
            clock: TransportClock::new(sample_rate),
            tail: None,
            positions: Vec::new(),
            mix: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    pub fn tracks(&self) -> &[TrackChain] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&TrackChain> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Connect a chain to the master bus. A chain already wired under the
    /// same id is replaced and returned.
    pub fn wire(&mut self, chain: TrackChain) -> Option<TrackChain> {
        if let Some(slot) = self.tracks.iter_mut().find(|t| t.id == chain.id) {
            return Some(std::mem::replace(slot, chain));
        }
        self.tracks.push(chain);
        None
    }

    /// Stop, disconnect and hand back every track chain.
    pub fn disconnect_all(&mut self) -> Vec<TrackChain> {
        self.tail = None;
        self.clock.stop();
        self.clock.set_loop_seconds(0.0);
        self.master.probe.clear();
        std::mem::take(&mut self.tracks)
    }

    pub fn set_song_length(&mut self, seconds: f64) {
        self.clock.set_loop_seconds(seconds);
    }

    /// Push mix state into every node in one pass.
    pub fn apply_mix(&mut self, mix: &MixState) {
        for track in &mut self.tracks {
            let settings = mix.track(&track.id);
            track.gain.set_gain_db(mix.track_gain_db(&track.id));
            track.pan.set_pan(settings.pan);
            track.pitch.set(mix.pitch_semitones, mix.playback_rate);
        }
        for (band, gain_db) in self.master.eq.iter_mut().zip(mix.eq_gains_db()) {
            band.set_gain_db(gain_db);
        }
        self.master.gain.set_gain_db(mix.master_gain_db());
        self.master.fade_seconds = mix.fade_seconds;
        self.clock.set_rate(mix.playback_rate as f64);
    }

    /// Clear delay lines and filter memory so nothing from the previous
    /// position is heard.
    fn reset_dsp(&mut self) {
        for track in &mut self.tracks {
            track.pitch.shifter.reset();
        }
        for band in &mut self.master.eq {
            band.reset();
        }
    }

    /// Start a fade-out from the current position, or extend the one
    /// already running. Returns false when there is nothing to fade.
    fn begin_fade_out(&mut self, stop: bool) -> bool {
        if let Some(tail) = &mut self.tail {
            tail.stop |= stop;
            return true;
        }
        if !self.clock.is_running() {
            return false;
        }
        let Some(ramp) = FadeRamp::fade_out(self.master.fade_seconds, self.sample_rate) else {
            return false;
        };
        self.tail = Some(FadeTail {
            clock: self.clock.clone(),
            ramp,
            stop,
        });
        true
    }

    fn finish_fade_out(&mut self) {
        if let Some(tail) = self.tail.take() {
            if tail.stop {
                self.unschedule_all();
            }
            self.reset_dsp();
        }
    }

    fn unschedule_all(&mut self) {
        for track in &mut self.tracks {
            track.source.scheduled = false;
        }
    }

    /// Schedule every source at `position_seconds` and start the clock.
    pub fn start_all(&mut self, position_seconds: f64) {
        self.tail = None;
        self.clock.seek_seconds(position_seconds);
        for track in &mut self.tracks {
            track.source.scheduled = true;
        }
        self.reset_dsp();
        self.clock.start();
    }

    /// Resume a paused clock at full level; sources are still scheduled.
    pub fn resume(&mut self) {
        if self.tail.take().is_some() {
            self.reset_dsp();
        }
        self.clock.start();
    }

    /// Pause the clock. With a fade time set, the output fades out from the
    /// pause point while the reported position stays put.
    pub fn pause(&mut self) {
        self.begin_fade_out(false);
        self.clock.pause();
    }

    /// Stop and rewind to zero. Sources are unscheduled once any fade-out
    /// has finished.
    pub fn stop_all(&mut self) {
        let fading = self.begin_fade_out(true);
        self.clock.stop();
        if !fading {
            self.unschedule_all();
            self.reset_dsp();
        }
    }

    pub fn seek(&mut self, position_seconds: f64) {
        self.tail = None;
        self.clock.seek_seconds(position_seconds);
        self.reset_dsp();
    }

    /// Per-track playheads in seconds, all derived from the clock.
    pub fn track_positions(&self) -> Vec<(TrackId, f64)> {
        let clock_frames = self.clock.position_frames();
        self.tracks
            .iter()
            .map(|t| {
                let frames = t.source.playhead_frames(clock_frames);
                (t.id.clone(), frames / self.sample_rate as f64)
            })
            .collect()
    }

    /// Render interleaved output for a device with `channels` channels.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len().div_ceil(channels);

        self.positions.clear();
        let live = if self.clock.is_running() {
            for _ in 0..frames {
                self.positions.push(self.clock.position_frames());
                self.clock.advance();
            }
            true
        } else if let Some(tail) = &mut self.tail {
            for _ in 0..frames {
                self.positions.push(tail.clock.position_frames());
                tail.clock.advance();
            }
            true
        } else {
            self.positions.resize(frames, 0.0);
            false
        };

        self.mix.clear();
        self.mix.resize(frames * 2, 0.0);
        for track in &mut self.tracks {
            track.render_block(&self.positions, live, &mut self.mix);
        }

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let fade = match &mut self.tail {
                Some(tail) => tail.ramp.next(),
                None => 1.0,
            };
            let (l, r) = self.master.process(self.mix[i * 2], self.mix[i * 2 + 1], fade);

            match frame.len() {
                1 => frame[0] = (l + r) * 0.5,
                _ => {
                    frame[0] = l;
                    frame[1] = r;
                    for extra in frame.iter_mut().skip(2) {
                        *extra = 0.0;
                    }
                }
            }
        }

        if self.tail.as_ref().is_some_and(|tail| tail.ramp.is_done()) {
            self.finish_fade_out();
        }

        for track in &self.tracks {
            track.probe.publish();
        }
        self.master.probe.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mix::{reduce, MixAction};

    fn constant_audio(value: f32, frames: usize, sample_rate: u32) -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio {
            samples: vec![value; frames * 2],
            sample_rate,
            channels: 2,
        })
    }

    fn ramp_audio(frames: usize, sample_rate: u32) -> Arc<DecodedAudio> {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            samples.push(i as f32);
            samples.push(i as f32);
        }
        Arc::new(DecodedAudio {
            samples,
            sample_rate,
            channels: 2,
        })
    }

    fn graph_with(tracks: Vec<(&str, Arc<DecodedAudio>)>) -> RenderGraph {
        let sr = 1_000;
        let mut graph = RenderGraph::new(sr, build_master_bus(sr, 16));
        for (id, audio) in tracks {
            graph.wire(build_track_chain(id.into(), id.into(), audio, sr, 16));
        }
        graph
    }

    #[test]
    fn wiring_twice_replaces_the_chain() {
        let mut graph = graph_with(vec![("a", constant_audio(0.1, 10, 1_000))]);
        let displaced = graph.wire(build_track_chain(
            "a".into(),
            "a".into(),
            constant_audio(0.2, 20, 1_000),
            1_000,
            16,
        ));
        assert!(displaced.is_some());
        assert_eq!(graph.tracks().len(), 1);
        assert_eq!(graph.track("a").unwrap().source().frames(), 20);
    }

    #[test]
    fn sources_share_the_clock() {
        let mut graph = graph_with(vec![
            ("a", ramp_audio(2_000, 1_000)),
            ("b", ramp_audio(3_000, 1_000)),
        ]);
        graph.start_all(1.25);
        for (_, pos) in graph.track_positions() {
            assert!((pos - 1.25).abs() < 1e-9);
        }

        let mut out = vec![0.0; 2 * 100];
        graph.render(&mut out, 2);
        for (_, pos) in graph.track_positions() {
            assert!((pos - 1.35).abs() < 1e-9);
        }
    }

    #[test]
    fn stopped_graph_is_silent_and_unscheduled() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 100, 1_000))]);
        graph.start_all(0.0);
        graph.stop_all();
        assert!(!graph.track("a").unwrap().source().is_scheduled());
        assert_eq!(graph.clock().position_seconds(), 0.0);

        let mut out = vec![1.0; 64];
        graph.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mute_and_volume_reach_the_gain_node() {
        let mut graph = graph_with(vec![
            ("a", constant_audio(0.5, 100, 1_000)),
            ("b", constant_audio(0.5, 100, 1_000)),
        ]);
        let mix = reduce(MixState::default(), MixAction::SetVolume("a".into(), 50.0));
        let mix = reduce(mix, MixAction::ToggleMute("b".into()));
        graph.apply_mix(&mix);
        assert!((graph.track("a").unwrap().gain().gain() - 0.1).abs() < 1e-6);
        assert_eq!(graph.track("b").unwrap().gain().gain(), 0.0);
    }

    #[test]
    fn pitch_parameter_ignores_rate() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 100, 1_000))]);
        let mix = reduce(MixState::default(), MixAction::SetPitch(3));
        graph.apply_mix(&mix);
        let before = graph.track("a").unwrap().pitch().effective_ratio();

        let mix = reduce(mix, MixAction::SetPlaybackRate(1.5));
        graph.apply_mix(&mix);
        assert_eq!(graph.track("a").unwrap().pitch().semitones(), 3);
        assert_eq!(graph.clock().rate(), 1.5);

        let mix = reduce(mix, MixAction::SetPitch(0));
        let mix = reduce(mix, MixAction::SetPlaybackRate(1.0));
        graph.apply_mix(&mix);
        assert_eq!(graph.track("a").unwrap().pitch().semitones(), 0);
        assert_eq!(graph.track("a").unwrap().pitch().effective_ratio(), 1.0);
        assert!(before > 1.0);
    }

    #[test]
    fn eq_and_master_follow_mix() {
        let mut graph = graph_with(vec![]);
        let mix = reduce(MixState::default(), MixAction::SetEqBand { band: 4, value: 100.0 });
        let mix = reduce(mix, MixAction::SetMasterVolume(0.0));
        graph.apply_mix(&mix);
        assert_eq!(graph.master().eq_gains_db(), [0.0, 0.0, 0.0, 0.0, 12.0]);
        assert_eq!(graph.master().eq_centers(), EQ_FREQUENCIES);
        assert_eq!(graph.master().gain().gain(), 0.0);
    }

    #[test]
    fn pause_fades_out_and_resume_is_full_level() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 1_000, 1_000))]);
        let mix = reduce(MixState::default(), MixAction::SetFadeSeconds(0.1));
        graph.apply_mix(&mix);
        graph.start_all(0.0);

        let mut out = vec![0.0; 2 * 10];
        graph.render(&mut out, 2);
        assert!((out[0] - 0.5).abs() < 1e-4);

        graph.pause();
        assert!((graph.clock().position_seconds() - 0.01).abs() < 1e-9);
        let mut out = vec![0.0; 2 * 200];
        graph.render(&mut out, 2);
        assert!((out[0] - 0.5).abs() < 1e-4);
        assert!((out[2 * 50] - 0.25).abs() < 1e-2);
        assert!(out[2 * 101..].iter().all(|s| s.abs() < 1e-4));
        assert!(graph.tail.is_none());
        assert!((graph.clock().position_seconds() - 0.01).abs() < 1e-9);

        graph.resume();
        let mut out = vec![0.0; 2 * 4];
        graph.render(&mut out, 2);
        assert!((out[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn stop_rewinds_at_once_and_unschedules_after_the_fade() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 1_000, 1_000))]);
        graph.apply_mix(&reduce(MixState::default(), MixAction::SetFadeSeconds(0.05)));
        graph.start_all(0.3);
        graph.stop_all();
        assert_eq!(graph.clock().position_seconds(), 0.0);
        assert!(graph.track("a").unwrap().source().is_scheduled());

        let mut out = vec![0.0; 2 * 100];
        graph.render(&mut out, 2);
        assert!(out[0] > 0.4);
        assert!(out[2 * 60..].iter().all(|s| *s == 0.0));
        assert!(!graph.track("a").unwrap().source().is_scheduled());
        assert_eq!(graph.clock().position_seconds(), 0.0);
    }

    #[test]
    fn seek_clears_shifted_and_filtered_audio() {
        let sr = 48_000;
        let mut samples = Vec::with_capacity(sr as usize * 2);
        for n in 0..sr as usize {
            let v = if n < sr as usize / 2 {
                (2.0 * std::f32::consts::PI * 440.0 * n as f32 / sr as f32).sin() * 0.5
            } else {
                0.0
            };
            samples.push(v);
            samples.push(v);
        }
        let audio = Arc::new(DecodedAudio {
            samples,
            sample_rate: sr,
            channels: 2,
        });
        let mut graph = RenderGraph::new(sr, build_master_bus(sr, 16));
        graph.wire(build_track_chain("a".into(), "a".into(), audio, sr, 16));
        let mix = reduce(MixState::default(), MixAction::SetFadeSeconds(0.0));
        let mix = reduce(mix, MixAction::SetPitch(3));
        let mix = reduce(mix, MixAction::SetEqBand { band: 0, value: 100.0 });
        graph.apply_mix(&mix);

        graph.start_all(0.0);
        let mut out = vec![0.0; 2 * 16_384];
        graph.render(&mut out, 2);
        assert!(out.iter().any(|s| s.abs() > 0.05));

        // The second half of the source is silent
        graph.seek(0.75);
        let mut out = vec![0.0; 2 * 1_024];
        graph.render(&mut out, 2);
        assert!(out.iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn probes_publish_after_render() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 1_000, 1_000))]);
        let mix = reduce(MixState::default(), MixAction::SetFadeSeconds(0.0));
        graph.apply_mix(&mix);
        let level = graph.track("a").unwrap().level();
        graph.start_all(0.0);

        let mut out = vec![0.0; 2 * 32];
        graph.render(&mut out, 2);
        assert!((level.peak() - 0.5).abs() < 1e-4);
        assert!((graph.master().level().rms() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn mono_and_multichannel_devices() {
        let mut graph = graph_with(vec![("a", constant_audio(0.5, 1_000, 1_000))]);
        graph.apply_mix(&reduce(MixState::default(), MixAction::SetFadeSeconds(0.0)));
        graph.start_all(0.0);

        let mut mono = vec![0.0; 8];
        graph.render(&mut mono, 1);
        assert!(mono.iter().all(|s| (*s - 0.5).abs() < 1e-4));

        let mut quad = vec![9.0; 16];
        graph.render(&mut quad, 4);
        assert!((quad[0] - 0.5).abs() < 1e-4);
        assert_eq!(quad[2], 0.0);
        assert_eq!(quad[3], 0.0);
    }

    #[test]
    fn pan_is_unity_at_centre_and_hard_at_edges() {
        let mut pan = PanNode::new();
        assert_eq!(pan.process(1.0, 1.0), (1.0, 1.0));
        pan.set_pan(-1.0);
        let (l, r) = pan.process(1.0, 1.0);
        assert!((l - 1.0).abs() < 1e-6);
        assert!(r.abs() < 1e-6);
    }
}
