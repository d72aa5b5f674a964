//! Metering sampler. Runs on its own timer, reads the probes' published
//! readings and never touches the render graph lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::ProbeReading;
use crate::models::playback::{LevelSnapshot, TrackLevel};

use super::mix::TrackId;

pub const DEFAULT_DECAY_DB: f32 = 2.0;
pub const DEFAULT_FLOOR_DB: f32 = -60.0;

/// What the sampler needs from the engine on each tick.
#[derive(Clone, Default)]
pub struct MeterInputs {
    pub playing: bool,
    pub tracks: Vec<(TrackId, Arc<ProbeReading>)>,
    pub master: Option<Arc<ProbeReading>>,
}

pub trait MeterSource: Send + Sync + 'static {
    fn meter_inputs(&self) -> MeterInputs;
}

pub struct MeterSampler {
    decay_db: f32,
    floor_db: f32,
    levels: LevelSnapshot,
}

impl MeterSampler {
    pub fn new(decay_db: f32, floor_db: f32) -> Self {
        Self {
            decay_db: decay_db.abs(),
            floor_db,
            levels: LevelSnapshot::default(),
        }
    }

    pub fn levels(&self) -> &LevelSnapshot {
        &self.levels
    }

    fn floor(&self, db: f32) -> f32 {
        if db <= self.floor_db {
            f32::NEG_INFINITY
        } else {
            db
        }
    }

    fn decay(&self, db: f32) -> f32 {
        self.floor(db - self.decay_db)
    }

    /// True once every level sits at negative infinity.
    pub fn is_settled(&self) -> bool {
        self.levels.master_db == f32::NEG_INFINITY
            && self
                .levels
                .tracks
                .iter()
                .all(|t| t.level_db == f32::NEG_INFINITY)
    }

    /// Advance one tick. Returns false when nothing changed (stopped and
    /// already fully decayed), so callers can skip publishing.
    pub fn tick(&mut self, inputs: &MeterInputs) -> bool {
        if inputs.playing {
            self.levels = LevelSnapshot {
                tracks: inputs
                    .tracks
                    .iter()
                    .map(|(id, reading)| TrackLevel {
                        id: id.clone(),
                        level_db: reading.peak_db(),
                    })
                    .collect(),
                master_db: inputs
                    .master
                    .as_ref()
                    .map(|m| m.rms_db())
                    .unwrap_or(f32::NEG_INFINITY),
            };
            return true;
        }

        let roster_changed = self.levels.tracks.len() != inputs.tracks.len()
            || self
                .levels
                .tracks
                .iter()
                .zip(&inputs.tracks)
                .any(|(level, (id, _))| &level.id != id);
        if self.is_settled() && !roster_changed {
            return false;
        }

        let tracks = inputs
            .tracks
            .iter()
            .map(|(id, _)| TrackLevel {
                id: id.clone(),
                level_db: self
                    .levels
                    .track_db(id)
                    .map(|db| self.decay(db))
                    .unwrap_or(f32::NEG_INFINITY),
            })
            .collect();
        self.levels = LevelSnapshot {
            tracks,
            master_db: self.decay(self.levels.master_db),
        };
        true
    }
}

/// Tick `sampler` every `interval` and publish through a watch channel. The
/// task ends once every receiver is dropped.
pub fn spawn_meter_loop(
    source: Arc<dyn MeterSource>,
    mut sampler: MeterSampler,
    interval: Duration,
) -> (watch::Receiver<LevelSnapshot>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(LevelSnapshot::default());
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            let inputs = source.meter_inputs();
            if sampler.tick(&inputs) && tx.send(sampler.levels().clone()).is_err() {
                break;
            }
        }
        log::debug!("[meter] sampler stopped");
    });
    (rx, handle)
}
