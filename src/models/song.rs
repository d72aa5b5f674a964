use serde::{Deserialize, Serialize};

/// Identity and fetch location of one stem. Supplied by the shell, never
/// mutated by the engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub song_id: String,
}

/// Baseline song metadata. Tempo and key are reference values only; the
/// engine derives playback rate and the displayed key from them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SongInfo {
    pub id: String,
    pub name: Option<String>,
    pub tempo_bpm: Option<f32>,
    pub key: Option<String>,
}
