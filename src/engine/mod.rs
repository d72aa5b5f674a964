//! The mixer engine: one control authority over loading, transport, mix and
//! metering for the active song.
//!
//! Lock order is state, then audio context, then render graph. The render
//! graph is also locked (with `try_lock`) by the device callback, so nothing
//! slow happens while it is held.

pub mod chain;
pub mod error;
pub mod loader;
pub mod meter;
pub mod mix;
pub mod output;
pub mod transport;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::audio::{ByteCache, ByteFetcher, ProbeReading};
use crate::models::playback::{EngineSnapshot, LevelSnapshot, TrackLoadState, TrackStatus};
use crate::models::song::{SongInfo, TrackDescriptor};
use crate::music::{sort_tracks, transpose_key};
use crate::settings::EngineSettings;

use chain::build_track_chain;
use loader::{LoadResult, PrecacheOutcome, TrackLoader};
use meter::{spawn_meter_loop, MeterInputs, MeterSampler, MeterSource};
use mix::{reduce, tempo_to_rate, MixAction, MixState, TrackId};
use output::{AudioContext, ContextState, SharedGraph};
use transport::{Transport, TransportPhase};

pub use error::{EngineError, LoadError};

/// Result of a song selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SongLoadOutcome {
    /// Every track settled. Failed tracks are excluded from playback.
    Ready {
        loaded: Vec<String>,
        failed: Vec<LoadError>,
        duration_seconds: f64,
    },
    /// Another song was selected before this one finished loading.
    Superseded,
}

#[derive(Debug, Clone)]
struct TrackEntry {
    load_state: TrackLoadState,
    error: Option<String>,
    duration_seconds: Option<f64>,
}

impl TrackEntry {
    fn loading() -> Self {
        Self {
            load_state: TrackLoadState::Loading,
            error: None,
            duration_seconds: None,
        }
    }
}

#[derive(Default)]
struct EngineState {
    song: Option<SongInfo>,
    /// Active song's tracks in display order
    descriptors: Vec<TrackDescriptor>,
    entries: HashMap<TrackId, TrackEntry>,
    transport: Transport,
    mix: MixState,
    load_task: Option<AbortHandle>,
    track_levels: Vec<(TrackId, Arc<ProbeReading>)>,
    master_level: Option<Arc<ProbeReading>>,
}

impl EngineState {
    fn pending(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| {
                self.entries
                    .get(&d.id)
                    .map(|e| e.load_state == TrackLoadState::Loading)
                    .unwrap_or(false)
            })
            .map(|d| d.name.clone())
            .collect()
    }
}

struct EngineInner {
    settings: EngineSettings,
    loader: TrackLoader,
    state: Mutex<EngineState>,
    context: Mutex<AudioContext>,
    activation: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl EngineInner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state poisoned")
    }

    fn graph(&self) -> Option<SharedGraph> {
        self.context.lock().expect("audio context poisoned").graph()
    }

    fn track_settled(&self, generation: u64, descriptor: &TrackDescriptor, result: &LoadResult) {
        let mut state = self.state();
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let Some(entry) = state.entries.get_mut(&descriptor.id) else {
            return;
        };
        match result {
            Ok(loaded) => {
                entry.load_state = TrackLoadState::Ready;
                entry.duration_seconds = Some(loaded.audio.duration_seconds());
            }
            Err(err) => {
                log::warn!("[loader] {}", err);
                entry.load_state = TrackLoadState::Failed;
                entry.error = Some(err.to_string());
            }
        }
    }
}

impl MeterSource for EngineInner {
    fn meter_inputs(&self) -> MeterInputs {
        let state = self.state();
        MeterInputs {
            playing: state.transport.is_playing(),
            tracks: state.track_levels.clone(),
            master: state.master_level.clone(),
        }
    }
}

/// Cheap to clone; clones drive the same engine.
#[derive(Clone)]
pub struct MixerEngine {
    inner: Arc<EngineInner>,
}

impl MixerEngine {
    pub fn new(settings: EngineSettings, fetcher: Arc<dyn ByteFetcher>) -> Self {
        let cache = if settings.cache_enabled {
            match settings.resolved_cache_dir() {
                Some(dir) => Some(ByteCache::with_version(dir, settings.cache_version.clone())),
                None => {
                    log::warn!("[byte-cache] no cache directory available, caching disabled");
                    None
                }
            }
        } else {
            None
        };
        let loader = TrackLoader::new(cache, fetcher, settings.sample_rate);
        let mix = reduce(
            MixState::default(),
            MixAction::SetFadeSeconds(settings.fade_seconds),
        );

        Self {
            inner: Arc::new(EngineInner {
                settings,
                loader,
                state: Mutex::new(EngineState {
                    mix,
                    ..EngineState::default()
                }),
                context: Mutex::new(AudioContext::default()),
                activation: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn context_state(&self) -> ContextState {
        self.inner
            .context
            .lock()
            .expect("audio context poisoned")
            .state()
    }

    /// Bring up the master bus, render graph and (if enabled) the device
    /// stream. Idempotent; concurrent callers wait for the first.
    pub async fn activate(&self) -> Result<SharedGraph, EngineError> {
        let _activation = self.inner.activation.lock().await;
        {
            let mut context = self.inner.context.lock().expect("audio context poisoned");
            if let Some(graph) = context.graph() {
                return Ok(graph);
            }
            context.begin_activation();
        }

        let sample_rate = self.inner.settings.sample_rate;
        let window = self.inner.settings.meter_window;
        let open_device = self.inner.settings.audio_output_enabled;
        let result =
            tokio::task::spawn_blocking(move || output::activate(sample_rate, window, open_device))
                .await
                .map_err(|e| EngineError::AudioUnavailable(e.to_string()))
                .and_then(|r| r);

        let graph = {
            let mut context = self.inner.context.lock().expect("audio context poisoned");
            match result {
                Ok(activated) => {
                    context.complete_activation(activated);
                    if context.has_device() {
                        log::info!("[audio-output] device stream open");
                    } else {
                        log::info!("[audio-output] running headless");
                    }
                    context.graph()
                }
                Err(err) => {
                    context.abort_activation();
                    log::error!("[audio-output] activation failed: {}", err);
                    return Err(err);
                }
            }
        }
        .ok_or_else(|| EngineError::AudioUnavailable("render graph missing".into()))?;

        let mut state = self.inner.state();
        let mut g = graph.lock().expect("render graph poisoned");
        g.apply_mix(&state.mix);
        state.master_level = Some(g.master().level());
        drop(g);
        log::info!("[transport] audio context active");
        Ok(graph)
    }

    /// Make `song` the active song and load its tracks. Any previous song is
    /// torn down first and its in-flight loads are abandoned.
    pub async fn select_song(
        &self,
        song: SongInfo,
        descriptors: Vec<TrackDescriptor>,
    ) -> Result<SongLoadOutcome, EngineError> {
        let graph = self.activate().await?;

        let mut tracks = Vec::with_capacity(descriptors.len());
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if seen.insert(descriptor.id.clone()) {
                tracks.push(descriptor);
            } else {
                log::warn!("[loader] duplicate track id {} ignored", descriptor.id);
            }
        }
        sort_tracks(&mut tracks);

        // Bumped under the state lock: the song installed last owns the
        // newest generation.
        let generation = {
            let mut state = self.inner.state();
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(task) = state.load_task.take() {
                task.abort();
            }
            Self::teardown(&mut state, &graph);

            log::info!(
                "[transport] loading song {} ({} tracks)",
                song.id,
                tracks.len()
            );
            let previous: Vec<TrackId> = state.mix.tracks.keys().cloned().collect();
            let mut mix = previous
                .into_iter()
                .fold(state.mix.clone(), |mix, id| reduce(mix, MixAction::ForgetTrack(id)));
            mix = reduce(mix, MixAction::SetPitch(0));
            mix = reduce(mix, MixAction::SetPlaybackRate(1.0));
            state.mix = mix;
            graph
                .lock()
                .expect("render graph poisoned")
                .apply_mix(&state.mix);

            state.entries = tracks
                .iter()
                .map(|d| (d.id.clone(), TrackEntry::loading()))
                .collect();
            state.descriptors = tracks.clone();
            state.song = Some(song);
            state.transport.begin_loading();

            if tracks.is_empty() {
                state.transport.finish_loading(0.0);
                return Ok(SongLoadOutcome::Ready {
                    loaded: Vec::new(),
                    failed: Vec::new(),
                    duration_seconds: 0.0,
                });
            }
            generation
        };

        let loader = self.inner.loader.clone();
        let inner = self.inner.clone();
        let to_load = tracks.clone();
        let task = tokio::spawn(async move {
            loader
                .load_all(&to_load, |descriptor, result| {
                    inner.track_settled(generation, descriptor, result)
                })
                .await
        });
        {
            let mut state = self.inner.state();
            if self.inner.generation.load(Ordering::SeqCst) == generation {
                state.load_task = Some(task.abort_handle());
            } else {
                task.abort();
            }
        }

        let results = match task.await {
            Ok(results) => results,
            Err(err) if err.is_cancelled() => return Ok(SongLoadOutcome::Superseded),
            Err(err) => return Err(EngineError::LoadAborted(err.to_string())),
        };

        let mut state = self.inner.state();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return Ok(SongLoadOutcome::Superseded);
        }
        state.load_task = None;

        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        let mut duration: f64 = 0.0;
        let mut levels = Vec::new();
        {
            let mut g = graph.lock().expect("render graph poisoned");
            for result in results {
                match result {
                    Ok(track) => {
                        duration = duration.max(track.audio.duration_seconds());
                        let chain = build_track_chain(
                            track.descriptor.id.clone(),
                            track.descriptor.name.clone(),
                            track.audio,
                            g.sample_rate(),
                            self.inner.settings.meter_window,
                        );
                        levels.push((track.descriptor.id.clone(), chain.level()));
                        g.wire(chain);
                        loaded.push(track.descriptor.name);
                    }
                    Err(err) => failed.push(err),
                }
            }
            g.set_song_length(duration);
            g.apply_mix(&state.mix);
        }
        state.track_levels = levels;
        state.transport.finish_loading(duration);

        log::info!(
            "[transport] ready: {} loaded, {} failed, {:.2}s",
            loaded.len(),
            failed.len(),
            duration
        );
        Ok(SongLoadOutcome::Ready {
            loaded,
            failed,
            duration_seconds: duration,
        })
    }

    /// Drop the active song, returning to Idle.
    pub fn clear_song(&self) {
        let mut state = self.inner.state();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = state.load_task.take() {
            task.abort();
        }
        if let Some(graph) = self.inner.graph() {
            Self::teardown(&mut state, &graph);
        }
        state.song = None;
        state.descriptors.clear();
        state.entries.clear();
        state.transport.reset();
    }

    fn teardown(state: &mut EngineState, graph: &SharedGraph) {
        let released = graph
            .lock()
            .expect("render graph poisoned")
            .disconnect_all();
        if !released.is_empty() {
            log::debug!("[transport] released {} track chains", released.len());
        }
        state.track_levels.clear();
    }

    /// Start every track at the current transport position, or resume.
    pub async fn play(&self) -> Result<(), EngineError> {
        {
            let state = self.inner.state();
            state.transport.check_start(|| state.pending())?;
        }
        let graph = self.activate().await?;

        let mut state = self.inner.state();
        let should_start = state.transport.check_start(|| state.pending())?;
        if !should_start {
            return Ok(());
        }
        let mut g = graph.lock().expect("render graph poisoned");
        match state.transport.phase() {
            TransportPhase::Paused => g.resume(),
            _ => {
                let position = g.clock().position_seconds();
                g.start_all(position);
            }
        }
        state.transport.mark_playing();
        log::info!(
            "[transport] playing from {:.2}s",
            g.clock().position_seconds()
        );
        Ok(())
    }

    pub fn pause(&self) {
        let mut state = self.inner.state();
        if state.transport.pause() {
            if let Some(graph) = self.inner.graph() {
                graph.lock().expect("render graph poisoned").pause();
            }
            log::info!("[transport] paused");
        }
    }

    /// Stop all tracks and rewind to zero.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        if state.transport.stop() {
            if let Some(graph) = self.inner.graph() {
                graph.lock().expect("render graph poisoned").stop_all();
            }
            log::info!("[transport] stopped");
        }
    }

    /// Move every track to `seconds`, clamped to the song. Returns the
    /// position actually applied.
    pub fn seek(&self, seconds: f64) -> Result<f64, EngineError> {
        let state = self.inner.state();
        if !state.transport.has_song() {
            return Err(EngineError::NoSongSelected);
        }
        let target = state.transport.clamp_seek(seconds);
        if let Some(graph) = self.inner.graph() {
            graph.lock().expect("render graph poisoned").seek(target);
        }
        Ok(target)
    }

    /// Retime the song to `bpm` relative to its nominal tempo. Returns the
    /// playback rate applied.
    pub fn set_tempo(&self, bpm: f32) -> Result<f32, EngineError> {
        let nominal = {
            let state = self.inner.state();
            let song = state.song.as_ref().ok_or(EngineError::NoSongSelected)?;
            song.tempo_bpm.ok_or(EngineError::MissingTempo)?
        };
        let rate = tempo_to_rate(bpm, nominal).ok_or(EngineError::MissingTempo)?;
        Ok(self.set_playback_rate(rate))
    }

    pub fn set_playback_rate(&self, rate: f32) -> f32 {
        self.apply(MixAction::SetPlaybackRate(rate)).playback_rate
    }

    /// Apply one mix action and push the result to the live nodes.
    pub fn apply(&self, action: MixAction) -> MixState {
        let mut state = self.inner.state();
        state.mix = reduce(state.mix.clone(), action);
        if let Some(graph) = self.inner.graph() {
            graph
                .lock()
                .expect("render graph poisoned")
                .apply_mix(&state.mix);
        }
        state.mix.clone()
    }

    pub fn mix(&self) -> MixState {
        self.inner.state().mix.clone()
    }

    pub fn phase(&self) -> TransportPhase {
        self.inner.state().transport.phase()
    }

    pub fn position_seconds(&self) -> f64 {
        self.inner
            .graph()
            .map(|g| g.lock().expect("render graph poisoned").clock().position_seconds())
            .unwrap_or(0.0)
    }

    /// Per-track playheads, all read from the shared clock in one lock.
    pub fn track_positions(&self) -> Vec<(TrackId, f64)> {
        self.inner
            .graph()
            .map(|g| g.lock().expect("render graph poisoned").track_positions())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.inner.state();
        let context_state = self.context_state();
        let position_seconds = self.position_seconds();
        let mix = &state.mix;

        let tracks = state
            .descriptors
            .iter()
            .map(|d| {
                let entry = state
                    .entries
                    .get(&d.id)
                    .cloned()
                    .unwrap_or_else(TrackEntry::loading);
                let track_mix = mix.track(&d.id);
                TrackStatus {
                    id: d.id.clone(),
                    name: d.name.clone(),
                    load_state: entry.load_state,
                    error: entry.error,
                    duration_seconds: entry.duration_seconds,
                    muted: track_mix.muted,
                    solo: track_mix.solo,
                    audibly_muted: mix.is_audibly_muted(&d.id),
                    volume: track_mix.volume,
                    pan: track_mix.pan,
                }
            })
            .collect();

        let song = state.song.as_ref();
        EngineSnapshot {
            phase: state.transport.phase(),
            context_state,
            song_id: song.map(|s| s.id.clone()),
            is_playing: state.transport.is_playing(),
            position_seconds,
            duration_seconds: state.transport.duration_seconds(),
            playback_rate: mix.playback_rate,
            pitch_semitones: mix.pitch_semitones,
            tempo_bpm: song
                .and_then(|s| s.tempo_bpm)
                .map(|bpm| bpm * mix.playback_rate),
            key: song
                .and_then(|s| s.key.as_deref())
                .map(|key| transpose_key(key, mix.pitch_semitones)),
            eq_bands: mix.eq_bands,
            master_volume: mix.master_volume,
            fade_seconds: mix.fade_seconds,
            tracks,
            pending: state.pending(),
        }
    }

    /// Render `frames` of stereo output directly from the graph. Used when the
    /// context is headless. Empty when the context is not active.
    pub fn render_block(&self, frames: usize) -> Vec<f32> {
        let Some(graph) = self.inner.graph() else {
            return Vec::new();
        };
        let mut out = vec![0.0; frames * 2];
        graph
            .lock()
            .expect("render graph poisoned")
            .render(&mut out, 2);
        out
    }

    /// Start the metering timer. Must be called inside a tokio runtime; the
    /// task ends when the receiver and its clones are dropped.
    pub fn start_metering(&self) -> watch::Receiver<LevelSnapshot> {
        let settings = &self.inner.settings;
        let sampler = MeterSampler::new(settings.meter_decay_db, settings.meter_floor_db);
        let (rx, _task) = spawn_meter_loop(
            self.inner.clone(),
            sampler,
            Duration::from_millis(settings.meter_interval_ms),
        );
        rx
    }

    pub async fn precache(&self, descriptors: &[TrackDescriptor]) -> Vec<(String, PrecacheOutcome)> {
        self.inner.loader.precache(descriptors).await
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.inner.loader.cache() {
            cache.clear();
        }
    }

    /// Tear everything down, including the device stream.
    pub fn shutdown(&self) {
        self.clear_song();
        self.inner
            .context
            .lock()
            .expect("audio context poisoned")
            .shutdown();
        self.inner.state().master_level = None;
    }
}
