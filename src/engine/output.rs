//! Audio context activation and the cpal output stream.
//!
//! The stream lives on its own thread for as long as the context is active and
//! pulls blocks straight from the render graph. When output is disabled in the
//! settings the context still activates, headless, and blocks are only
//! rendered on demand.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use serde::{Deserialize, Serialize};

use super::chain::{build_master_bus, RenderGraph};
use super::error::EngineError;

pub type SharedGraph = Arc<Mutex<RenderGraph>>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContextState {
    Uninitialized,
    Activating,
    Active,
}

/// Owns the render graph and, when enabled, the device stream feeding from it.
pub struct AudioContext {
    state: ContextState,
    graph: Option<SharedGraph>,
    stream: Option<OutputStream>,
}

impl Default for AudioContext {
    fn default() -> Self {
        Self {
            state: ContextState::Uninitialized,
            graph: None,
            stream: None,
        }
    }
}

impl AudioContext {
    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn graph(&self) -> Option<SharedGraph> {
        self.graph.clone()
    }

    pub fn has_device(&self) -> bool {
        self.stream.is_some()
    }

    /// Mark the start of an activation. Returns false if one is already
    /// underway or finished.
    pub fn begin_activation(&mut self) -> bool {
        if self.state != ContextState::Uninitialized {
            return false;
        }
        self.state = ContextState::Activating;
        true
    }

    pub fn complete_activation(&mut self, activated: Activated) {
        self.graph = Some(activated.graph);
        self.stream = activated.stream;
        self.state = ContextState::Active;
    }

    pub fn abort_activation(&mut self) {
        self.state = ContextState::Uninitialized;
    }

    pub fn shutdown(&mut self) {
        self.stream = None;
        self.graph = None;
        self.state = ContextState::Uninitialized;
    }
}

pub struct Activated {
    graph: SharedGraph,
    stream: Option<OutputStream>,
}

/// Build the master bus and graph, then open the device if requested. Blocks
/// while the device starts; call from a blocking context.
pub fn activate(
    sample_rate: u32,
    probe_window: usize,
    open_device: bool,
) -> Result<Activated, EngineError> {
    let graph = Arc::new(Mutex::new(RenderGraph::new(
        sample_rate,
        build_master_bus(sample_rate, probe_window),
    )));

    let stream = if open_device {
        let stream = OutputStream::open(graph.clone(), sample_rate)
            .map_err(EngineError::AudioUnavailable)?;
        log::info!(
            "[audio-output] stream running at {} Hz, {} channels",
            sample_rate,
            stream.channels
        );
        Some(stream)
    } else {
        log::info!("[audio-output] output disabled, running headless");
        None
    };

    Ok(Activated { graph, stream })
}

/// Persistent device stream. Dropping it stops and joins the stream thread.
pub struct OutputStream {
    stop_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
    channels: u16,
}

impl OutputStream {
    pub fn open(graph: SharedGraph, sample_rate: u32) -> Result<Self, String> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u16, String>>();

        let handle = thread::spawn(move || {
            let result = (|| -> Result<(), String> {
                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or("No output device available")?;

                let supported_config = device
                    .default_output_config()
                    .map_err(|e| format!("Failed to get output config: {}", e))?;
                let channels = supported_config.channels();

                let config = StreamConfig {
                    channels,
                    sample_rate: SampleRate(sample_rate),
                    buffer_size: BufferSize::Default,
                };

                let stream = device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            // Never block the device thread on a control-side batch.
                            match graph.try_lock() {
                                Ok(mut graph) => graph.render(data, channels as usize),
                                Err(_) => data.fill(0.0),
                            }
                        },
                        |err| {
                            log::error!("[audio-output] stream error: {}", err);
                        },
                        None,
                    )
                    .map_err(|e| format!("Failed to build output stream: {}", e))?;

                stream
                    .play()
                    .map_err(|e| format!("Failed to start playback: {}", e))?;

                let _ = ready_tx.send(Ok(channels));

                let _ = stop_rx.recv();
                drop(stream);
                Ok(())
            })();

            if let Err(err) = result {
                let _ = ready_tx.send(Err(err));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(channels)) => Ok(Self {
                stop_tx,
                handle: Some(handle),
                channels,
            }),
            Ok(Err(err)) => {
                let _ = stop_tx.send(());
                let _ = handle.join();
                Err(err)
            }
            Err(_) => Err("Audio stream worker failed to start".into()),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        log::info!("[audio-output] stream stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_activation_walks_the_state_machine() {
        let mut context = AudioContext::default();
        assert_eq!(context.state(), ContextState::Uninitialized);
        assert!(context.graph().is_none());

        assert!(context.begin_activation());
        assert!(!context.begin_activation());
        assert_eq!(context.state(), ContextState::Activating);

        let activated = activate(48_000, 256, false).unwrap();
        context.complete_activation(activated);
        assert_eq!(context.state(), ContextState::Active);
        assert!(!context.has_device());

        let graph = context.graph().unwrap();
        assert_eq!(graph.lock().unwrap().sample_rate(), 48_000);

        context.shutdown();
        assert_eq!(context.state(), ContextState::Uninitialized);
    }

    #[test]
    fn aborted_activation_can_be_retried() {
        let mut context = AudioContext::default();
        assert!(context.begin_activation());
        context.abort_activation();
        assert!(context.begin_activation());
    }
}
