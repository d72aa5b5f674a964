pub mod playback;
pub mod song;
