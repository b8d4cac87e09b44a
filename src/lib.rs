//! # AgriVision Backend
//!
//! Glue service for an agricultural-monitoring web application. Three
//! components, sharing no in-process state:
//!
//! - **Field health** - aggregates Sentinel-2 optical, Sentinel-1 radar,
//!   Landsat 8/9 thermal, and SoilGrids soil-carbon rasters over a
//!   point-buffered area of interest via the Earth Engine REST API, reducing
//!   each to a scalar summary plus a map-tile URL.
//! - **Chatbot** - answers free-text farming questions through the Groq
//!   chat-completion API, optionally retrieval-augmented with passages from
//!   a Pinecone vector index.
//! - **Ingestion** - one-shot batch job that chunks local text files, embeds
//!   them, and upserts the vectors into the Pinecone index.
//!
//! All hard computation (image filtering, cloud ranking, spectral indices,
//! spatial reduction, similarity search, inference) happens in the external
//! services; this crate builds the requests, waits, and reshapes the JSON.
//!
//! ## Quick Start
//!
//! ```bash
//! agv serve                     # start the HTTP API
//! agv ingest                    # (re)populate the vector index
//! agv ask "when to sow wheat?"  # one-shot chatbot call
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the response wire contract |
//! | [`aoi`] | Area-of-interest geometry |
//! | [`ee`] | Earth Engine REST client and expression graphs |
//! | [`field_health`] | Multi-source satellite aggregation |
//! | [`embedding`] | Text embedding backends |
//! | [`index`] | Pinecone vector index client |
//! | [`chat`] | Groq chatbot, direct and retrieval-augmented |
//! | [`chunk`] | Overlapping text chunking |
//! | [`knowledge`] | Knowledge-base file loader |
//! | [`ingest`] | Ingestion pipeline |
//! | [`server`] | HTTP server |

pub mod aoi;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod ee;
pub mod embedding;
pub mod field_health;
pub mod index;
pub mod ingest;
pub mod knowledge;
pub mod models;
pub mod server;
