pub mod atomic;
pub mod cache;
pub mod decoder;
pub mod fetch;
pub mod filters;
pub mod pitch;
pub mod probe;
pub mod resample;

pub use atomic::AtomicF32;
pub use cache::{ByteCache, CacheError, CACHE_VERSION};
pub use decoder::{decode_bytes, extension_hint, DecodedAudio};
pub use fetch::{ByteFetcher, FetchError, FileFetcher, HttpFetcher};
pub use filters::PeakingFilter;
pub use pitch::{ratio_to_semitones, semitones_to_ratio, PitchShifter};
pub use probe::{amplitude_to_db, LevelProbe, ProbeReading, PROBE_WINDOW};
