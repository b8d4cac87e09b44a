use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub earth_engine: EarthEngineConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EarthEngineConfig {
    /// Google Cloud project the Earth Engine requests run under.
    #[serde(default)]
    pub project: Option<String>,
    /// Radius in meters the query point is buffered by to form the AOI.
    #[serde(default = "default_buffer_meters")]
    pub buffer_meters: f64,
    /// Length of the trailing scene-selection window, in days.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for EarthEngineConfig {
    fn default() -> Self {
        Self {
            project: None,
            buffer_meters: default_buffer_meters(),
            window_days: default_window_days(),
        }
    }
}

fn default_buffer_meters() -> f64 {
    50.0
}
fn default_window_days() -> i64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// `groq` or `disabled`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_chat_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `voyage`, `local`, or `disabled`.
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Number of passages retrieved per chatbot question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            metric: default_metric(),
            cloud: default_cloud(),
            region: default_region(),
            top_k: default_top_k(),
        }
    }
}

fn default_index_name() -> String {
    "agri-knowledge-base".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            root: default_kb_root(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_kb_root() -> PathBuf {
    PathBuf::from("./knowledge_base")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between neighboring chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

impl ChatConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Environment variable holding the Groq API key.
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
/// Environment variable holding the Pinecone API key.
pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
/// Environment variable holding the Voyage AI API key.
pub const VOYAGE_API_KEY: &str = "VOYAGE_API_KEY";
/// Environment variable holding the Earth Engine OAuth bearer token.
pub const EARTHENGINE_TOKEN: &str = "EARTHENGINE_TOKEN";

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Configuration with every section at its default. Used by tests and as the
/// fallback when no config file exists on disk.
pub fn default_config() -> Config {
    Config {
        server: ServerConfig::default(),
        earth_engine: EarthEngineConfig::default(),
        chat: ChatConfig::default(),
        embedding: EmbeddingConfig::default(),
        index: IndexConfig::default(),
        knowledge_base: KnowledgeBaseConfig::default(),
        chunking: ChunkingConfig::default(),
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.index.top_k < 1 {
        anyhow::bail!("index.top_k must be >= 1");
    }

    if config.earth_engine.buffer_meters <= 0.0 {
        anyhow::bail!("earth_engine.buffer_meters must be > 0");
    }
    if config.earth_engine.window_days < 1 {
        anyhow::bail!("earth_engine.window_days must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "voyage" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, voyage, or local.",
            other
        ),
    }

    match config.chat.provider.as_str() {
        "disabled" | "groq" => {}
        other => anyhow::bail!(
            "Unknown chat provider: '{}'. Must be disabled or groq.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = default_config();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.earth_engine.window_days, 90);
        assert!(!config.chat.is_enabled());
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn rejects_overlap_larger_than_chunk() {
        let mut config = default_config();
        config.chunking.chunk_size = 40;
        config.chunking.overlap = 50;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let mut config = default_config();
        config.embedding.provider = "voyage".to_string();
        assert!(validate(&config).is_err());

        config.embedding.model = Some("voyage-large-2".to_string());
        config.embedding.dims = Some(1536);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_unknown_providers() {
        let mut config = default_config();
        config.chat.provider = "mistral".to_string();
        assert!(validate(&config).is_err());

        let mut config = default_config();
        config.embedding.provider = "openai".to_string();
        config.embedding.model = Some("text-embedding-3-small".to_string());
        config.embedding.dims = Some(1536);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn parses_full_toml() {
        let toml = r#"
[server]
bind = "127.0.0.1:9000"

[earth_engine]
project = "my-project"
buffer_meters = 50.0
window_days = 90

[chat]
provider = "groq"
model = "llama-3.3-70b-versatile"

[embedding]
provider = "local"
model = "all-minilm-l6-v2"
dims = 384

[index]
name = "agri-knowledge-base"
top_k = 3

[knowledge_base]
root = "./knowledge_base"

[chunking]
chunk_size = 512
overlap = 50
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(validate(&config).is_ok());
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.earth_engine.project.as_deref(), Some("my-project"));
        assert_eq!(config.chat.model, "llama-3.3-70b-versatile");
        assert_eq!(config.embedding.dims, Some(384));
    }
}
