//! Text embedding backends.
//!
//! An [`Embedder`] is chosen once from config and reused for the life of the
//! process, mirroring how the chatbot fixes its mode at startup. Two
//! backends:
//!
//! - **Voyage AI** (`provider = "voyage"`) - hosted API, needs
//!   `VOYAGE_API_KEY`. Used when queries and ingestion should share one
//!   hosted model.
//! - **Local fastembed** (`provider = "local"`, feature `local-embeddings`) -
//!   ONNX inference in-process, so `agv ingest` can bulk-upload without
//!   burning API quota. The model downloads on first use and is cached.
//!
//! Both produce fixed-width vectors; the width must agree with the Pinecone
//! index, which `agv ingest` recreates on a mismatch.

use anyhow::{anyhow, bail, Context as _, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::{self, EmbeddingConfig};

const VOYAGE_EMBEDDINGS_URL: &str = "https://api.voyageai.com/v1/embeddings";

/// Retry waits double from 1s up to 2^5 = 32s.
const MAX_BACKOFF_EXP: u32 = 5;

/// The configured embedding backend.
#[derive(Debug)]
pub enum Embedder {
    Voyage(VoyageEmbedder),
    #[cfg(feature = "local-embeddings")]
    Local(LocalEmbedder),
}

impl Embedder {
    /// Build the backend named by `config.provider`. Errors when the
    /// provider is disabled or unknown, or when its prerequisites (model,
    /// dims, API key, feature flag) are missing.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider.as_str() {
            "voyage" => Ok(Embedder::Voyage(VoyageEmbedder::from_env(config)?)),
            #[cfg(feature = "local-embeddings")]
            "local" => Ok(Embedder::Local(LocalEmbedder::new(config)?)),
            #[cfg(not(feature = "local-embeddings"))]
            "local" => bail!("Local embedding provider requires --features local-embeddings"),
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Embedder::Voyage(voyage) => &voyage.model,
            #[cfg(feature = "local-embeddings")]
            Embedder::Local(local) => &local.model_name,
        }
    }

    /// Vector width this backend produces.
    pub fn dims(&self) -> usize {
        match self {
            Embedder::Voyage(voyage) => voyage.dims,
            #[cfg(feature = "local-embeddings")]
            Embedder::Local(local) => local.dims,
        }
    }

    /// Embed a batch of texts, one vector per input, in input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            Embedder::Voyage(voyage) => voyage.embed(texts).await,
            #[cfg(feature = "local-embeddings")]
            Embedder::Local(local) => local.embed(texts).await,
        }
    }

    /// Embed a single text (a chatbot question before index lookup).
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow!("Embedding backend returned no vector"))
    }
}

/// Hosted Voyage AI backend.
///
/// Holds one `reqwest::Client` for the process. Rate limits (429) and server
/// errors (5xx) retry with doubling waits; other 4xx responses fail
/// immediately since resending the same request cannot fix them.
#[derive(Debug)]
pub struct VoyageEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl VoyageEmbedder {
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for the voyage provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for the voyage provider"))?;
        let api_key = std::env::var(config::VOYAGE_API_KEY)
            .map_err(|_| anyhow!("VOYAGE_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = Duration::from_secs(1 << (attempt - 1).min(MAX_BACKOFF_EXP));
                tracing::debug!(attempt, wait_secs = wait.as_secs(), "retrying Voyage request");
                tokio::time::sleep(wait).await;
            }

            let response = match self
                .http
                .post(VOYAGE_EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(anyhow::Error::from(e).context("Voyage request failed"));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: EmbeddingsResponse = response
                    .json()
                    .await
                    .context("Voyage response was not valid JSON")?;
                return parsed.into_vectors(texts.len());
            }

            let detail = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                last_err = Some(anyhow!("Voyage API error {}: {}", status, detail));
                continue;
            }
            bail!("Voyage API error {}: {}", status, detail);
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Voyage embedding failed after retries")))
    }
}

/// Embeddings payload in the OpenAI wire shape, which Voyage shares. Rows
/// carry their input index, so ordering is restored explicitly rather than
/// trusted.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingsResponse {
    fn into_vectors(self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            bail!(
                "Voyage returned {} embeddings for {} inputs",
                self.data.len(),
                expected
            );
        }

        let mut rows = self.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

/// Local fastembed backend.
///
/// The ONNX engine is heavy to construct (first use downloads the model), so
/// it is built once on first embed and cached behind a mutex. Inference is
/// blocking and runs on the blocking thread pool.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    variant: fastembed::EmbeddingModel,
    engine: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model_name", &self.model_name)
            .field("dims", &self.dims)
            .field("batch_size", &self.batch_size)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "local-embeddings")]
const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let variant = local_model_variant(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_local_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            variant,
            engine: std::sync::Arc::new(std::sync::Mutex::new(None)),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let engine = std::sync::Arc::clone(&self.engine);
        let variant = self.variant.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut slot = engine
                .lock()
                .map_err(|_| anyhow!("embedding engine lock poisoned"))?;

            if slot.is_none() {
                let built = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(variant).with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;
                *slot = Some(built);
            }
            let engine = slot
                .as_mut()
                .ok_or_else(|| anyhow!("embedding engine unavailable"))?;

            engine
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings")]
fn local_model_variant(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
fn default_local_dims(name: &str) -> usize {
    match name {
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        // all-minilm-l6-v2, bge-small-en-v1.5
        _ => 384,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_is_an_error() {
        let config = EmbeddingConfig::default();
        let err = Embedder::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "cohere".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(Embedder::from_config(&config).is_err());
    }

    #[test]
    fn voyage_requires_model_and_dims_before_credentials() {
        let config = EmbeddingConfig {
            provider: "voyage".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = Embedder::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn response_rows_are_reordered_by_index() {
        let response = EmbeddingsResponse {
            data: vec![
                EmbeddingRow {
                    index: 1,
                    embedding: vec![0.3, 0.4],
                },
                EmbeddingRow {
                    index: 0,
                    embedding: vec![0.1, 0.2],
                },
            ],
        };
        let vectors = response.into_vectors(2).unwrap();
        assert_eq!(vectors[0], vec![0.1f32, 0.2]);
        assert_eq!(vectors[1], vec![0.3f32, 0.4]);
    }

    #[test]
    fn response_with_wrong_count_is_rejected() {
        let response = EmbeddingsResponse {
            data: vec![EmbeddingRow {
                index: 0,
                embedding: vec![0.1],
            }],
        };
        assert!(response.into_vectors(2).is_err());
    }

    #[test]
    fn response_deserializes_from_wire_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2], "index": 0 },
                { "embedding": [0.3, 0.4], "index": 1 },
            ],
            "model": "voyage-large-2",
        });
        let response: EmbeddingsResponse = serde_json::from_value(json).unwrap();
        let vectors = response.into_vectors(2).unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn local_backend_resolves_default_model() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), "all-minilm-l6-v2");
        assert_eq!(embedder.dims(), 384);
    }

    #[cfg(feature = "local-embeddings")]
    #[test]
    fn local_backend_rejects_unknown_model() {
        let config = EmbeddingConfig {
            provider: "local".to_string(),
            model: Some("word2vec".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(Embedder::from_config(&config).is_err());
    }
}
