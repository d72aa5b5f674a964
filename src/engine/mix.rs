//! Mix state: the single authority over per-track and global mix settings.
//!
//! Every edit goes through [`reduce`], a pure `(state, action) -> state`
//! transform. Translating the resulting state into node parameters is done in
//! one place, `chain::RenderGraph::apply_mix`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type TrackId = String;

pub const EQ_FREQUENCIES: [f32; 5] = [60.0, 250.0, 1000.0, 4000.0, 8000.0];
pub const EQ_BAND_COUNT: usize = EQ_FREQUENCIES.len();
pub const EQ_Q: f32 = 1.5;
pub const MAX_EQ_GAIN_DB: f32 = 12.0;
/// Range covered by the volume fader between silence and unity
pub const VOLUME_RANGE_DB: f32 = 40.0;
pub const MIN_PLAYBACK_RATE: f32 = 0.5;
pub const MAX_PLAYBACK_RATE: f32 = 2.0;
pub const MAX_FADE_SECONDS: f32 = 5.0;
pub const DEFAULT_FADE_SECONDS: f32 = 0.5;

/// Fader position (0..=100) to decibels. 0 is silence, 100 is unity, linear
/// in between over a 40 dB span.
pub fn volume_to_db(volume: f32) -> f32 {
    if volume > 0.0 {
        (volume.min(100.0) / 100.0) * VOLUME_RANGE_DB - VOLUME_RANGE_DB
    } else {
        f32::NEG_INFINITY
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db == f32::NEG_INFINITY {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}

/// EQ slider (0..=100) to band gain in dB; 50 is flat.
pub fn eq_band_to_db(value: f32) -> f32 {
    (value.clamp(0.0, 100.0) / 100.0) * (MAX_EQ_GAIN_DB * 2.0) - MAX_EQ_GAIN_DB
}

pub fn clamp_playback_rate(rate: f32) -> f32 {
    if !rate.is_finite() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// Playback rate needed to hear a song written at `nominal_bpm` at
/// `desired_bpm`. `None` when the song has no usable tempo.
pub fn tempo_to_rate(desired_bpm: f32, nominal_bpm: f32) -> Option<f32> {
    if nominal_bpm.is_nan() || nominal_bpm <= 0.0 || !desired_bpm.is_finite() {
        return None;
    }
    Some(clamp_playback_rate(desired_bpm / nominal_bpm))
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackMix {
    pub muted: bool,
    pub solo: bool,
    /// Fader position 0..=100
    pub volume: f32,
    /// -1 (left) ..= 1 (right)
    pub pan: f32,
}

impl Default for TrackMix {
    fn default() -> Self {
        Self {
            muted: false,
            solo: false,
            volume: 100.0,
            pan: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MixState {
    pub tracks: BTreeMap<TrackId, TrackMix>,
    pub pitch_semitones: i32,
    pub playback_rate: f32,
    pub eq_bands: [f32; EQ_BAND_COUNT],
    pub master_volume: f32,
    pub fade_seconds: f32,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            tracks: BTreeMap::new(),
            pitch_semitones: 0,
            playback_rate: 1.0,
            eq_bands: [50.0; EQ_BAND_COUNT],
            master_volume: 100.0,
            fade_seconds: DEFAULT_FADE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MixAction {
    ToggleMute(TrackId),
    SetMute(TrackId, bool),
    ToggleSolo(TrackId),
    SetVolume(TrackId, f32),
    SetPan(TrackId, f32),
    SetEqBand { band: usize, value: f32 },
    ResetEq,
    SetMasterVolume(f32),
    SetPitch(i32),
    SetPlaybackRate(f32),
    SetFadeSeconds(f32),
    ForgetTrack(TrackId),
}

impl MixState {
    pub fn track(&self, id: &str) -> TrackMix {
        self.tracks.get(id).cloned().unwrap_or_default()
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.values().any(|t| t.solo)
    }

    pub fn soloed(&self) -> Vec<TrackId> {
        self.tracks
            .iter()
            .filter(|(_, t)| t.solo)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Explicitly muted, or silenced because other tracks are soloed.
    pub fn is_audibly_muted(&self, id: &str) -> bool {
        let track = self.track(id);
        track.muted || (self.any_solo() && !track.solo)
    }

    /// Gain for a track's gain node, folding in mute and solo.
    pub fn track_gain_db(&self, id: &str) -> f32 {
        if self.is_audibly_muted(id) {
            f32::NEG_INFINITY
        } else {
            volume_to_db(self.track(id).volume)
        }
    }

    pub fn master_gain_db(&self) -> f32 {
        volume_to_db(self.master_volume)
    }

    pub fn eq_gains_db(&self) -> [f32; EQ_BAND_COUNT] {
        self.eq_bands.map(eq_band_to_db)
    }

    fn entry(&mut self, id: TrackId) -> &mut TrackMix {
        self.tracks.entry(id).or_default()
    }
}

fn clamp_unit(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Apply one user action. Out-of-range values are clamped, never rejected.
pub fn reduce(mut state: MixState, action: MixAction) -> MixState {
    match action {
        MixAction::ToggleMute(id) => {
            let track = state.entry(id);
            track.muted = !track.muted;
            if track.muted {
                track.solo = false;
            }
        }
        MixAction::SetMute(id, muted) => {
            let track = state.entry(id);
            track.muted = muted;
            if muted {
                track.solo = false;
            }
        }
        MixAction::ToggleSolo(id) => {
            let track = state.entry(id);
            track.solo = !track.solo;
        }
        MixAction::SetVolume(id, volume) => {
            state.entry(id).volume = clamp_unit(volume, 0.0, 100.0, 100.0);
        }
        MixAction::SetPan(id, pan) => {
            state.entry(id).pan = clamp_unit(pan, -1.0, 1.0, 0.0);
        }
        MixAction::SetEqBand { band, value } => {
            if let Some(slot) = state.eq_bands.get_mut(band) {
                *slot = clamp_unit(value, 0.0, 100.0, 50.0);
            }
        }
        MixAction::ResetEq => {
            state.eq_bands = [50.0; EQ_BAND_COUNT];
        }
        MixAction::SetMasterVolume(volume) => {
            state.master_volume = clamp_unit(volume, 0.0, 100.0, 100.0);
        }
        MixAction::SetPitch(semitones) => {
            state.pitch_semitones = semitones;
        }
        MixAction::SetPlaybackRate(rate) => {
            state.playback_rate = clamp_playback_rate(rate);
        }
        MixAction::SetFadeSeconds(seconds) => {
            state.fade_seconds = clamp_unit(seconds, 0.0, MAX_FADE_SECONDS, DEFAULT_FADE_SECONDS);
        }
        MixAction::ForgetTrack(id) => {
            state.tracks.remove(&id);
        }
    }
    state
}
