//! Multitrack stem playback for live performance.
//!
//! A song's stems are loaded concurrently (byte cache first, then the
//! fetcher), decoded, and wired into per-track chains that all read from one
//! transport clock. Mix edits, tempo and pitch changes are applied to the live
//! chains without stopping playback.

pub mod audio;
pub mod engine;
pub mod models;
pub mod music;
pub mod settings;

pub use engine::mix::{MixAction, MixState};
pub use engine::transport::TransportPhase;
pub use engine::{EngineError, LoadError, MixerEngine, SongLoadOutcome};
pub use models::playback::{EngineSnapshot, LevelSnapshot};
pub use models::song::{SongInfo, TrackDescriptor};
pub use settings::EngineSettings;
