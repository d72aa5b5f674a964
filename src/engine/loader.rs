//! Track loader: cache-or-fetch, decode, and the per-song fan-out/fan-in join.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::audio::{decode_bytes, extension_hint, ByteCache, ByteFetcher, DecodedAudio};
use crate::models::song::TrackDescriptor;

use super::error::LoadError;

/// A resolved track, ready to be wired into a chain.
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    pub descriptor: TrackDescriptor,
    pub audio: Arc<DecodedAudio>,
    pub from_cache: bool,
}

pub type LoadResult = Result<LoadedAudio, LoadError>;

#[derive(Debug, Clone, PartialEq)]
pub enum PrecacheOutcome {
    AlreadyCached,
    Stored,
    Failed(LoadError),
}

#[derive(Clone)]
pub struct TrackLoader {
    cache: Option<ByteCache>,
    fetcher: Arc<dyn ByteFetcher>,
    sample_rate: u32,
}

impl TrackLoader {
    pub fn new(cache: Option<ByteCache>, fetcher: Arc<dyn ByteFetcher>, sample_rate: u32) -> Self {
        Self {
            cache,
            fetcher,
            sample_rate,
        }
    }

    pub fn cache(&self) -> Option<&ByteCache> {
        self.cache.as_ref()
    }

    /// Resolve one descriptor. Cache hit first; bytes that are cached but no
    /// longer decode are ignored and refetched.
    pub async fn load(&self, descriptor: &TrackDescriptor) -> LoadResult {
        let started = Instant::now();
        let extension = extension_hint(&descriptor.source_url);

        if let Some(bytes) = self.cached_bytes(&descriptor.source_url).await {
            match self.decode(descriptor, bytes, extension.clone()).await {
                Ok(audio) => {
                    log::info!(
                        "[loader] {} from cache ({:.2}s, {:.0}ms)",
                        descriptor.name,
                        audio.duration_seconds(),
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                    return Ok(LoadedAudio {
                        descriptor: descriptor.clone(),
                        audio: Arc::new(audio),
                        from_cache: true,
                    });
                }
                Err(err) => {
                    log::warn!("[loader] ignoring unreadable cache entry: {}", err);
                }
            }
        }

        let bytes = self
            .fetcher
            .fetch(&descriptor.source_url)
            .await
            .map_err(|e| LoadError::fetch(&descriptor.name, &e))?;
        let for_cache = self.cache.as_ref().map(|_| bytes.clone());

        let audio = self.decode(descriptor, bytes, extension).await?;

        if let (Some(cache), Some(bytes)) = (self.cache.clone(), for_cache) {
            let url = descriptor.source_url.clone();
            // Not awaited; a failed write only costs a refetch next session.
            tokio::task::spawn_blocking(move || cache.put(&url, &bytes));
        }

        log::info!(
            "[loader] {} fetched ({:.2}s, {:.0}ms)",
            descriptor.name,
            audio.duration_seconds(),
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(LoadedAudio {
            descriptor: descriptor.clone(),
            audio: Arc::new(audio),
            from_cache: false,
        })
    }

    /// Load every descriptor concurrently. `on_settled` sees each track as it
    /// finishes; the returned results keep the input order.
    pub async fn load_all<F>(&self, descriptors: &[TrackDescriptor], mut on_settled: F) -> Vec<LoadResult>
    where
        F: FnMut(&TrackDescriptor, &LoadResult),
    {
        let mut set = JoinSet::new();
        for (index, descriptor) in descriptors.iter().enumerate() {
            let loader = self.clone();
            let descriptor = descriptor.clone();
            set.spawn(async move {
                let result = loader.load(&descriptor).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<LoadResult>> = descriptors.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    on_settled(&descriptors[index], &result);
                    results[index] = Some(result);
                }
                Err(err) => {
                    log::error!("[loader] load task failed: {}", err);
                }
            }
        }

        results
            .into_iter()
            .zip(descriptors)
            .map(|(result, descriptor)| {
                result.unwrap_or_else(|| {
                    let err = LoadError::Interrupted {
                        track: descriptor.name.clone(),
                        reason: "load task did not complete".into(),
                    };
                    on_settled(descriptor, &Err(err.clone()));
                    Err(err)
                })
            })
            .collect()
    }

    /// Fetch and store every descriptor that is not cached yet, without
    /// decoding. Does nothing when caching is disabled.
    pub async fn precache(&self, descriptors: &[TrackDescriptor]) -> Vec<(String, PrecacheOutcome)> {
        let Some(cache) = self.cache.clone() else {
            log::info!("[loader] cache disabled, skipping precache");
            return Vec::new();
        };

        let mut set = JoinSet::new();
        for (index, descriptor) in descriptors.iter().enumerate() {
            let cache = cache.clone();
            let fetcher = self.fetcher.clone();
            let descriptor = descriptor.clone();
            set.spawn(async move {
                let outcome = if cache.contains(&descriptor.source_url) {
                    PrecacheOutcome::AlreadyCached
                } else {
                    match fetcher.fetch(&descriptor.source_url).await {
                        Ok(bytes) => {
                            let url = descriptor.source_url.clone();
                            match tokio::task::spawn_blocking(move || cache.try_put(&url, &bytes)).await {
                                Ok(Ok(())) => PrecacheOutcome::Stored,
                                Ok(Err(err)) => {
                                    log::warn!("[byte-cache] {}", err);
                                    PrecacheOutcome::Failed(LoadError::Interrupted {
                                        track: descriptor.name.clone(),
                                        reason: err.to_string(),
                                    })
                                }
                                Err(err) => PrecacheOutcome::Failed(LoadError::Interrupted {
                                    track: descriptor.name.clone(),
                                    reason: err.to_string(),
                                }),
                            }
                        }
                        Err(err) => PrecacheOutcome::Failed(LoadError::fetch(&descriptor.name, &err)),
                    }
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<PrecacheOutcome>> = descriptors.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(err) => log::error!("[loader] precache task failed: {}", err),
            }
        }

        descriptors
            .iter()
            .zip(outcomes)
            .map(|(descriptor, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    PrecacheOutcome::Failed(LoadError::Interrupted {
                        track: descriptor.name.clone(),
                        reason: "precache task did not complete".into(),
                    })
                });
                (descriptor.source_url.clone(), outcome)
            })
            .collect()
    }

    async fn cached_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let cache = self.cache.clone()?;
        let url = url.to_string();
        tokio::task::spawn_blocking(move || cache.get(&url))
            .await
            .ok()
            .flatten()
    }

    async fn decode(
        &self,
        descriptor: &TrackDescriptor,
        bytes: Vec<u8>,
        extension: Option<String>,
    ) -> Result<DecodedAudio, LoadError> {
        let target_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || decode_bytes(bytes, extension.as_deref(), target_rate))
            .await
            .map_err(|e| LoadError::Interrupted {
                track: descriptor.name.clone(),
                reason: e.to_string(),
            })?
            .map_err(|reason| LoadError::DecodeFailure {
                track: descriptor.name.clone(),
                reason,
            })
    }
}
