use thiserror::Error;

use crate::audio::FetchError;

/// Why a single track could not be loaded. Scoped to that track only.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("Track \"{track}\" failed to load: {reason}")]
    FetchFailure { track: String, reason: String },
    #[error("Track \"{track}\" could not be decoded: {reason}")]
    DecodeFailure { track: String, reason: String },
    #[error("Track \"{track}\" load was interrupted: {reason}")]
    Interrupted { track: String, reason: String },
}

impl LoadError {
    pub fn fetch(track: &str, err: &FetchError) -> Self {
        Self::FetchFailure {
            track: track.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn track(&self) -> &str {
        match self {
            Self::FetchFailure { track, .. }
            | Self::DecodeFailure { track, .. }
            | Self::Interrupted { track, .. } => track,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Tracks are not ready yet: {}", pending.join(", "))]
    NotReady { pending: Vec<String> },
    #[error("No song selected")]
    NoSongSelected,
    #[error("Song has no nominal tempo")]
    MissingTempo,
    #[error("Audio output unavailable: {0}")]
    AudioUnavailable(String),
    #[error("Song load failed: {0}")]
    LoadAborted(String),
}
