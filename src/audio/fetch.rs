//! Byte-fetch capability for track audio.
//!
//! The engine only needs "give me the encoded bytes behind this URL"; where
//! they come from (HTTP stream endpoint, local disk, test fixture) is decided
//! by the `ByteFetcher` implementation handed to the loader.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No audio found at {0}")]
    NotFound(String),
    #[error("Request for {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("Request for {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("Empty response body for {0}")]
    EmptyBody(String),
}

#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches over HTTP(S). Relative URLs are resolved against `base_url`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) if url.starts_with('/') => format!("{}{}", base, url),
            Some(base) => format!("{}/{}", base, url),
            None => url.to_string(),
        }
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let resolved = self.resolve(url);
        let response = self
            .client
            .get(&resolved)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: resolved.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(resolved));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: resolved,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport {
                url: resolved.clone(),
                reason: e.to_string(),
            })?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody(resolved));
        }
        Ok(body.to_vec())
    }
}

/// Reads local files; accepts plain paths and `file://` URLs.
#[derive(Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn path_for(url: &str) -> PathBuf {
        PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
    }
}

#[async_trait]
impl ByteFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = Self::path_for(url);
        let owned = url.to_string();
        let result = tokio::task::spawn_blocking(move || std::fs::read(path))
            .await
            .map_err(|e| FetchError::Transport {
                url: owned.clone(),
                reason: e.to_string(),
            })?;

        match result {
            Ok(bytes) if bytes.is_empty() => Err(FetchError::EmptyBody(owned)),
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(FetchError::NotFound(owned)),
            Err(err) => Err(FetchError::Transport {
                url: owned,
                reason: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_resolve_against_base() {
        let fetcher = HttpFetcher::new(Some("http://localhost:3000/".into()));
        assert_eq!(
            fetcher.resolve("/api/download-stream?fileKey=a.mp3"),
            "http://localhost:3000/api/download-stream?fileKey=a.mp3"
        );
        assert_eq!(fetcher.resolve("https://cdn/x.wav"), "https://cdn/x.wav");
        assert_eq!(fetcher.resolve("x.wav"), "http://localhost:3000/x.wav");
    }

    #[tokio::test]
    async fn file_fetcher_reports_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        let err = FileFetcher
            .fetch(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));

        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").unwrap();
        let url = format!("file://{}", empty.display());
        assert!(matches!(
            FileFetcher.fetch(&url).await,
            Err(FetchError::EmptyBody(_))
        ));

        let full = dir.path().join("full.wav");
        std::fs::write(&full, b"RIFF").unwrap();
        assert_eq!(FileFetcher.fetch(full.to_str().unwrap()).await.unwrap(), b"RIFF");
    }
}
