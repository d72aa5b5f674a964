use serde::{Deserialize, Serialize};

use crate::engine::mix::EQ_BAND_COUNT;
use crate::engine::output::ContextState;
use crate::engine::transport::TransportPhase;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackLoadState {
    Loading,
    Ready,
    Failed,
}

/// Per-track load status and mix settings, in display order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatus {
    pub id: String,
    pub name: String,
    pub load_state: TrackLoadState,
    pub error: Option<String>,
    pub duration_seconds: Option<f64>,
    pub muted: bool,
    pub solo: bool,
    /// Muted, or silenced by another track's solo
    pub audibly_muted: bool,
    pub volume: f32,
    pub pan: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackLevel {
    pub id: String,
    /// dB; negative infinity (serialized as null) when silent
    pub level_db: f32,
}

/// One metering tick.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelSnapshot {
    pub tracks: Vec<TrackLevel>,
    pub master_db: f32,
}

impl Default for LevelSnapshot {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            master_db: f32::NEG_INFINITY,
        }
    }
}

impl LevelSnapshot {
    pub fn track_db(&self, id: &str) -> Option<f32> {
        self.tracks.iter().find(|t| t.id == id).map(|t| t.level_db)
    }
}

/// Everything the shell needs to draw the player.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub phase: TransportPhase,
    pub context_state: ContextState,
    pub song_id: Option<String>,
    pub is_playing: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub playback_rate: f32,
    pub pitch_semitones: i32,
    /// Nominal tempo scaled by the playback rate
    pub tempo_bpm: Option<f32>,
    /// Nominal key transposed by the pitch offset
    pub key: Option<String>,
    pub eq_bands: [f32; EQ_BAND_COUNT],
    pub master_volume: f32,
    pub fade_seconds: f32,
    pub tracks: Vec<TrackStatus>,
    /// Names of tracks still loading
    pub pending: Vec<String>,
}
