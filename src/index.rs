//! Pinecone vector index client.
//!
//! Thin REST wrapper over the two Pinecone surfaces the service needs:
//!
//! - **Control plane** (`https://api.pinecone.io`): describe, create, and
//!   delete indexes. Used by `agv ingest` to recreate the index when its
//!   dimension disagrees with the embedding model.
//! - **Data plane** (per-index host returned by describe): upsert vectors
//!   and run top-k similarity queries with metadata.
//!
//! The index itself is the only persistent store in the system; it is owned
//! and managed by Pinecone, not by this service.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::config::{self, IndexConfig};
use crate::models::{KnowledgeChunk, RetrievedPassage};

const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2025-01";

/// Vectors per upsert request. Pinecone rejects oversized batches.
const UPSERT_BATCH: usize = 100;

/// Control-plane description of an index: the fields `agv ingest` compares
/// against its configuration, plus the data-plane host.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub dimension: usize,
    pub metric: String,
    /// Data-plane host, e.g. `agri-knowledge-base-abc123.svc.pinecone.io`.
    pub host: String,
}

/// Control-plane client. Requires `PINECONE_API_KEY` in the environment.
pub struct PineconeClient {
    http: reqwest::Client,
    api_key: String,
}

impl PineconeClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(config::PINECONE_API_KEY)
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, api_key })
    }

    /// Describe an index. Returns `None` if it does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let resp = self
            .http
            .get(format!("{}/indexes/{}", CONTROL_PLANE, name))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .context("Pinecone describe request failed")?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone describe error {}: {}", status, body);
        }

        let description: IndexDescription = resp.json().await?;
        Ok(Some(description))
    }

    /// Create a serverless index with the given dimension.
    pub async fn create_index(
        &self,
        name: &str,
        dimension: usize,
        config: &IndexConfig,
    ) -> Result<()> {
        let body = create_index_body(name, dimension, config);

        let resp = self
            .http
            .post(format!("{}/indexes", CONTROL_PLANE))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Pinecone create request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone create error {}: {}", status, body);
        }

        Ok(())
    }

    /// Delete an index. Destructive: all stored vectors are lost.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}/indexes/{}", CONTROL_PLANE, name))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .context("Pinecone delete request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone delete error {}: {}", status, body);
        }

        Ok(())
    }

    /// Resolve the data-plane handle for an existing index.
    pub async fn connect(&self, name: &str) -> Result<PineconeIndex> {
        let description = self
            .describe_index(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Pinecone index '{}' does not exist", name))?;

        Ok(PineconeIndex {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            host: description.host,
        })
    }
}

/// Data-plane handle for a single index.
pub struct PineconeIndex {
    http: reqwest::Client,
    api_key: String,
    host: String,
}

impl PineconeIndex {
    /// Upsert embedded chunks in batches. `chunks` and `vectors` must be the
    /// same length and in the same order. Returns the number upserted.
    pub async fn upsert(&self, chunks: &[KnowledgeChunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "Chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let mut upserted = 0;
        for (chunk_batch, vector_batch) in chunks
            .chunks(UPSERT_BATCH)
            .zip(vectors.chunks(UPSERT_BATCH))
        {
            let body = upsert_body(chunk_batch, vector_batch);

            let resp = self
                .http
                .post(format!("https://{}/vectors/upsert", self.host))
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&body)
                .send()
                .await
                .context("Pinecone upsert request failed")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!("Pinecone upsert error {}: {}", status, body);
            }

            upserted += chunk_batch.len();
        }

        Ok(upserted)
    }

    /// Top-k nearest-neighbor query. Returns passages with their source
    /// filenames and similarity scores.
    pub async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });

        let resp = self
            .http
            .post(format!("https://{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Pinecone query request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Pinecone query error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_query_matches(&json)
    }
}

fn create_index_body(name: &str, dimension: usize, config: &IndexConfig) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "dimension": dimension,
        "metric": config.metric,
        "spec": {
            "serverless": {
                "cloud": config.cloud,
                "region": config.region,
            }
        }
    })
}

fn upsert_body(chunks: &[KnowledgeChunk], vectors: &[Vec<f32>]) -> serde_json::Value {
    let records: Vec<serde_json::Value> = chunks
        .iter()
        .zip(vectors.iter())
        .map(|(chunk, values)| {
            serde_json::json!({
                "id": chunk.id,
                "values": values,
                "metadata": {
                    "source": chunk.source,
                    "chunk_index": chunk.chunk_index,
                    "text": chunk.text,
                }
            })
        })
        .collect();

    serde_json::json!({ "vectors": records })
}

fn parse_query_matches(json: &serde_json::Value) -> Result<Vec<RetrievedPassage>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone response: missing matches array"))?;

    let passages = matches
        .iter()
        .map(|m| {
            let metadata = m.get("metadata");
            RetrievedPassage {
                source: metadata
                    .and_then(|md| md.get("source"))
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                text: metadata
                    .and_then(|md| md.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
            }
        })
        .collect();

    Ok(passages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            source: "soil.txt".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[test]
    fn create_body_uses_serverless_spec() {
        let body = create_index_body("agri-knowledge-base", 384, &IndexConfig::default());
        assert_eq!(body["name"], "agri-knowledge-base");
        assert_eq!(body["dimension"], 384);
        assert_eq!(body["metric"], "cosine");
        assert_eq!(body["spec"]["serverless"]["cloud"], "aws");
        assert_eq!(body["spec"]["serverless"]["region"], "us-east-1");
    }

    #[test]
    fn upsert_body_pairs_chunks_with_vectors() {
        let chunks = vec![chunk("a", "first"), chunk("b", "second")];
        let vectors = vec![vec![0.1f32, 0.2], vec![0.3, 0.4]];
        let body = upsert_body(&chunks, &vectors);

        let records = body["vectors"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "a");
        assert_eq!(records[0]["metadata"]["source"], "soil.txt");
        assert_eq!(records[0]["metadata"]["text"], "first");
        assert_eq!(records[1]["values"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parses_query_matches_with_metadata() {
        let json = serde_json::json!({
            "matches": [
                {
                    "id": "a",
                    "score": 0.91,
                    "metadata": { "source": "crops.txt", "text": "Rotate legumes." }
                },
                { "id": "b", "score": 0.5 }
            ]
        });

        let passages = parse_query_matches(&json).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source, "crops.txt");
        assert_eq!(passages[0].text, "Rotate legumes.");
        assert!((passages[0].score - 0.91).abs() < 1e-9);
        // Missing metadata degrades to placeholders instead of failing.
        assert_eq!(passages[1].source, "unknown");
        assert_eq!(passages[1].text, "");
    }

    #[test]
    fn rejects_response_without_matches() {
        let json = serde_json::json!({ "results": [] });
        assert!(parse_query_matches(&json).is_err());
    }
}
