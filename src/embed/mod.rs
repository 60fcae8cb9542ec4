//! Embedder interface (C6) and its concrete collaborators.
//!
//! The core only depends on the `Embedder` trait (spec.md §4.6); what's
//! behind it — a loopback HTTP daemon, an in-process ONNX model, or a test
//! double — is an external concern. Grounded in the teacher's
//! `adapter::embedding` trait split (an async `Embedder` trait plus a
//! concrete `FastEmbedEmbedder`) and in `other_examples`' use of
//! `reqwest::Client` for an async embedding backend.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding daemon request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding daemon returned an unexpected response")]
    InvalidResponse,
    #[error("no embedder is available")]
    Unavailable,
}

pub type EmbedResult<T> = Result<T, EmbedError>;

/// `text -> unit float32[D]` (spec.md §4.6). Implementations need not
/// pre-normalize; callers always re-normalize through [`crate::vector`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> EmbedResult<Vec<f32>>;
}

/// Loopback HTTP client for an external embedding daemon (spec.md §6:
/// `GET /health`, `POST /embed`).
pub struct DaemonEmbedder {
    client: reqwest::Client,
    base_url: String,
}

impl DaemonEmbedder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `GET /health` with a short timeout — spec.md §5 requires embedder
    /// probes to honor `<= 200ms`. Returns `false` on timeout or any
    /// non-2xx/unreachable outcome rather than propagating an error: probe
    /// failure is routed to fallback, not surfaced to the caller.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_millis(200))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "embedding daemon health probe failed");
                false
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[async_trait]
impl Embedder for DaemonEmbedder {
    async fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { text })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbedResponse>()
            .await
            .map_err(|_| EmbedError::InvalidResponse)?;
        Ok(resp.vector)
    }
}

/// Prefers a remote daemon (after a health probe), falls back to a local
/// embedder otherwise. Matches spec.md §5: "must tolerate a slow embedder
/// but is not required to implement its lifecycle" and §7: "remote
/// timeout -> silently fall back to local".
pub struct FallbackEmbedder {
    daemon: Option<DaemonEmbedder>,
    local: Box<dyn Embedder>,
}

impl FallbackEmbedder {
    pub fn new(daemon: Option<DaemonEmbedder>, local: Box<dyn Embedder>) -> Self {
        Self { daemon, local }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    async fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        if let Some(daemon) = &self.daemon {
            if daemon.probe().await {
                match daemon.embed(text).await {
                    Ok(vector) => return Ok(vector),
                    Err(e) => {
                        warn!(error = %e, "embedding daemon call failed, falling back to local model");
                    }
                }
            } else {
                debug!("embedding daemon unreachable, using local model");
            }
        }
        self.local.embed(text).await
    }
}

/// No embedder configured and no local model available. `embed` always
/// fails; the ingestor interprets this as "proceed without a vector"
/// (spec.md §7: "local failure -> skip embedding for that box").
pub struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> EmbedResult<Vec<f32>> {
        Err(EmbedError::Unavailable)
    }
}

#[cfg(feature = "embeddings")]
pub mod local {
    use super::{EmbedError, EmbedResult, Embedder};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// In-process ONNX embedder (fastembed), lazily loaded and warmed via
    /// a dummy call at construction (spec.md §5: "singleton, lazily loaded,
    /// warmed via a dummy call").
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEmbedder {
        pub fn new() -> EmbedResult<Self> {
            let mut model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|_| EmbedError::Unavailable)?;
            let _ = model.embed(vec!["warmup"], None);
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
            let owned = text.to_string();
            let mut model = self.model.lock().map_err(|_| EmbedError::Unavailable)?;
            let embeddings = model
                .embed(vec![owned], None)
                .map_err(|_| EmbedError::Unavailable)?;
            embeddings.into_iter().next().ok_or(EmbedError::Unavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, _text: &str) -> EmbedResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn fallback_uses_local_when_no_daemon_configured() {
        let fallback = FallbackEmbedder::new(None, Box::new(StubEmbedder(vec![1.0, 0.0])));
        let vector = fallback.embed("hello").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn fallback_uses_local_when_daemon_unreachable() {
        let daemon = DaemonEmbedder::new("http://127.0.0.1:1");
        let fallback = FallbackEmbedder::new(Some(daemon), Box::new(StubEmbedder(vec![0.0, 1.0])));
        let vector = fallback.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn null_embedder_always_errs() {
        let embedder = NullEmbedder;
        assert!(embedder.embed("x").await.is_err());
    }
}
