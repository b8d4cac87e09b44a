//! Knowledge-base ingestion: one-shot batch upload into the vector index.
//!
//! Flow: load text files -> chunk -> embed -> upsert. Before uploading, the
//! Pinecone index is checked against the embedding model: a dimension
//! mismatch deletes and recreates the index (destructive - all previously
//! stored vectors are lost), and a missing index is created fresh. After
//! create/delete the job waits a fixed interval for serverless provisioning
//! to settle; there is deliberately no readiness polling.
//!
//! Any failure propagates to a non-zero process exit so unattended runs are
//! diagnosable from logs alone.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::index::{IndexDescription, PineconeClient};
use crate::knowledge;
use crate::models::KnowledgeChunk;

/// Fixed wait after deleting an index, seconds.
const DELETE_SETTLE_SECS: u64 = 10;
/// Fixed wait after creating an index, seconds.
const CREATE_SETTLE_SECS: u64 = 15;

pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    // Load documents
    let documents = knowledge::load_documents(&config.knowledge_base)?;
    if documents.is_empty() {
        bail!(
            "No documents found in {}",
            config.knowledge_base.root.display()
        );
    }

    // Chunk
    let mut chunks: Vec<KnowledgeChunk> = Vec::new();
    for doc in &documents {
        chunks.extend(chunk_text(
            &doc.source,
            &doc.body,
            config.chunking.chunk_size,
            config.chunking.overlap,
        ));
    }

    if dry_run {
        println!("ingest (dry-run)");
        println!("  documents found: {}", documents.len());
        println!("  chunks: {}", chunks.len());
        return Ok(());
    }

    if chunks.is_empty() {
        bail!("Documents contained no text to ingest");
    }

    if !config.embedding.is_enabled() {
        bail!("Ingestion requires an embedding provider. Set [embedding] provider in config.");
    }

    let embedder = Embedder::from_config(&config.embedding)?;
    println!(
        "embedding model: {} ({} dims)",
        embedder.model_name(),
        embedder.dims()
    );

    // Index: recreate on dimension mismatch, create when absent.
    let client = PineconeClient::from_env()?;
    ensure_index(&client, config, embedder.dims()).await?;

    // Embed and upload
    let index = client.connect(&config.index.name).await?;
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        vectors.extend(embedder.embed(&texts).await?);
    }

    let upserted = index.upsert(&chunks, &vectors).await?;

    println!("ingest {}", config.index.name);
    println!("  documents processed: {}", documents.len());
    println!("  chunks created: {}", chunks.len());
    println!("  vectors upserted: {}", upserted);
    println!("ok");

    Ok(())
}

/// What `ensure_index` has to do, decided from the describe result and the
/// embedder's vector width.
#[derive(Debug, PartialEq, Eq)]
enum IndexPlan {
    Keep,
    Recreate { have: usize },
    Create,
}

fn plan_index(existing: Option<&IndexDescription>, dims: usize) -> IndexPlan {
    match existing {
        Some(description) if description.dimension == dims => IndexPlan::Keep,
        Some(description) => IndexPlan::Recreate {
            have: description.dimension,
        },
        None => IndexPlan::Create,
    }
}

/// Make the index exist with the embedder's dimensionality. Deleting and
/// recreating on mismatch is irreversible; every stored vector is lost.
async fn ensure_index(client: &PineconeClient, config: &Config, dims: usize) -> Result<()> {
    let name = &config.index.name;
    let existing = client.describe_index(name).await?;

    if let Some(description) = &existing {
        // A metric difference never forces recreation, only a warning.
        if description.metric != config.index.metric {
            tracing::warn!(
                index = %name,
                have = %description.metric,
                want = %config.index.metric,
                "index metric differs from config - keeping the existing index"
            );
        }
    }

    match plan_index(existing.as_ref(), dims) {
        IndexPlan::Keep => {
            println!("index '{}' exists ({} dims)", name, dims);
        }
        IndexPlan::Recreate { have } => {
            tracing::warn!(
                index = %name,
                have,
                want = dims,
                "dimension mismatch - deleting and recreating index"
            );
            println!(
                "index '{}' has {} dims but model uses {} - recreating",
                name, have, dims
            );

            client.delete_index(name).await?;
            tokio::time::sleep(Duration::from_secs(DELETE_SETTLE_SECS)).await;

            client.create_index(name, dims, &config.index).await?;
            tokio::time::sleep(Duration::from_secs(CREATE_SETTLE_SECS)).await;

            println!("index '{}' recreated", name);
        }
        IndexPlan::Create => {
            println!("creating index '{}' ({} dims)", name, dims);
            client.create_index(name, dims, &config.index).await?;
            tokio::time::sleep(Duration::from_secs(CREATE_SETTLE_SECS)).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn described(dimension: usize, metric: &str) -> IndexDescription {
        IndexDescription {
            dimension,
            metric: metric.to_string(),
            host: "agri-knowledge-base-test.svc.pinecone.io".to_string(),
        }
    }

    #[test]
    fn matching_dimension_keeps_index() {
        assert_eq!(
            plan_index(Some(&described(384, "cosine")), 384),
            IndexPlan::Keep
        );
    }

    #[test]
    fn dimension_mismatch_recreates_with_embedder_width() {
        assert_eq!(
            plan_index(Some(&described(768, "cosine")), 384),
            IndexPlan::Recreate { have: 768 }
        );
    }

    #[test]
    fn absent_index_is_created() {
        assert_eq!(plan_index(None, 384), IndexPlan::Create);
    }

    #[test]
    fn metric_difference_alone_does_not_recreate() {
        assert_eq!(
            plan_index(Some(&described(384, "dotproduct")), 384),
            IndexPlan::Keep
        );
    }
}
