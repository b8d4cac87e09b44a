//! Farming chatbot: Groq chat completions, optionally retrieval-augmented.
//!
//! The [`Chatbot`] is constructed once at startup from configuration and
//! environment credentials, then injected into the HTTP handlers. Its mode is
//! fixed for the life of the process:
//!
//! - **Retrieval-augmented** - embedding provider, Pinecone index, and Groq
//!   are all configured: the question is embedded, the top-k nearest stored
//!   passages are fetched and stuffed into the prompt as context.
//! - **Direct** - only Groq is configured: the question is forwarded verbatim
//!   with the fixed system prompt.
//! - **Unavailable** - the chat client failed to initialize (missing
//!   credentials): every question gets a static "not available" reply.
//!
//! [`Chatbot::ask`] never returns an error. Generation and retrieval
//! failures are logged and converted to a static apology string, matching
//! the contract the frontend expects.

use anyhow::{bail, Context as _, Result};
use std::time::Duration;

use crate::config::{self, ChatConfig, Config};
use crate::embedding::Embedder;
use crate::index::{PineconeClient, PineconeIndex};
use crate::models::RetrievedPassage;

/// Fixed persona prompt sent with every completion request.
pub const SYSTEM_PROMPT: &str = "You are an expert agricultural AI assistant named AgriXVision. \
    Your goal is to help farmers with crop health, soil, and weather advice. \
    Be helpful, concise, and accurate.";

/// Reply used when no chat client could be initialized at startup.
pub const UNAVAILABLE_MESSAGE: &str =
    "Chatbot is not available. Please configure GROQ_API_KEY and PINECONE_API_KEY in the environment.";

/// Reply used when generation or retrieval fails mid-request.
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I encountered an error processing your question. Please try again.";

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Client for the Groq chat-completion API (OpenAI-compatible wire format).
pub struct GroqChat {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl GroqChat {
    /// Build the client from config plus the `GROQ_API_KEY` env var.
    pub fn from_env(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var(config::GROQ_API_KEY)
            .map_err(|_| anyhow::anyhow!("GROQ_API_KEY environment variable not set"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// One completion turn. No conversation history is retained between
    /// calls; each request carries only the system prompt and the question.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = chat_body(
            &self.model,
            system,
            user,
            self.temperature,
            self.max_tokens,
        );

        let resp = self
            .http
            .post(GROQ_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Groq request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            bail!("Groq API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_chat_response(&json)
    }
}

fn chat_body(
    model: &str,
    system: &str,
    user: &str,
    temperature: f64,
    max_tokens: u32,
) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Groq response: missing choices[0].message.content"))
}

/// Retrieval half of the RAG mode: embeds the question and queries the
/// vector index for the nearest stored knowledge chunks.
pub struct Retriever {
    embedder: Embedder,
    index: PineconeIndex,
    top_k: usize,
}

impl Retriever {
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedPassage>> {
        let vector = self.embedder.embed_one(question).await?;
        self.index.query(&vector, self.top_k).await
    }
}

enum ChatMode {
    Unavailable,
    Direct(GroqChat),
    Retrieval { chat: GroqChat, retriever: Retriever },
}

/// Process-wide chatbot front, constructed once at startup.
pub struct Chatbot {
    mode: ChatMode,
}

impl Chatbot {
    /// A chatbot that answers every question with the unavailable message.
    pub fn unavailable() -> Self {
        Self {
            mode: ChatMode::Unavailable,
        }
    }

    /// Best-effort initialization from config and environment.
    ///
    /// An embedding provider in the config selects the retrieval-augmented
    /// mode; if any RAG component fails to initialize the chatbot is
    /// disabled rather than silently downgraded. Without embeddings, a
    /// configured Groq key selects the direct mode.
    pub async fn initialize(config: &Config) -> Self {
        if !config.chat.is_enabled() {
            tracing::warn!("chat provider disabled in config - chatbot endpoint unavailable");
            return Self::unavailable();
        }

        let chat = match GroqChat::from_env(&config.chat) {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(error = %e, "Groq initialization failed - chatbot endpoint unavailable");
                return Self::unavailable();
            }
        };

        if !config.embedding.is_enabled() {
            tracing::info!(model = %config.chat.model, "chatbot initialized in direct mode");
            return Self {
                mode: ChatMode::Direct(chat),
            };
        }

        match Self::initialize_retriever(config).await {
            Ok(retriever) => {
                tracing::info!(
                    model = %config.chat.model,
                    index = %config.index.name,
                    top_k = config.index.top_k,
                    "chatbot initialized in retrieval-augmented mode"
                );
                Self {
                    mode: ChatMode::Retrieval { chat, retriever },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "retriever initialization failed - chatbot endpoint unavailable");
                Self::unavailable()
            }
        }
    }

    async fn initialize_retriever(config: &Config) -> Result<Retriever> {
        let embedder = Embedder::from_config(&config.embedding)?;
        let client = PineconeClient::from_env()?;
        let index = client.connect(&config.index.name).await?;

        Ok(Retriever {
            embedder,
            index,
            top_k: config.index.top_k,
        })
    }

    /// Answer a farming question. Infallible by contract: failures come back
    /// as the unavailable or apology literal, never as an `Err`.
    pub async fn ask(&self, question: &str) -> String {
        match &self.mode {
            ChatMode::Unavailable => UNAVAILABLE_MESSAGE.to_string(),
            ChatMode::Direct(chat) => match chat.complete(SYSTEM_PROMPT, question).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::error!(error = %e, "chat completion failed");
                    APOLOGY_MESSAGE.to_string()
                }
            },
            ChatMode::Retrieval { chat, retriever } => {
                match self.ask_with_retrieval(chat, retriever, question).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        tracing::error!(error = %e, "retrieval-augmented answer failed");
                        APOLOGY_MESSAGE.to_string()
                    }
                }
            }
        }
    }

    async fn ask_with_retrieval(
        &self,
        chat: &GroqChat,
        retriever: &Retriever,
        question: &str,
    ) -> Result<String> {
        let passages = retriever.retrieve(question).await?;
        let system = rag_system_prompt(&passages);
        chat.complete(&system, question).await
    }
}

/// Build the RAG system prompt: the fixed persona followed by the retrieved
/// passages as a context block. Empty retrieval falls back to the plain
/// persona prompt.
fn rag_system_prompt(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return SYSTEM_PROMPT.to_string();
    }

    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\nUse the following context from the knowledge base to answer. \
        If the context does not cover the question, answer from general agricultural knowledge.\n");

    for passage in passages {
        prompt.push_str("\n---\nSource: ");
        prompt.push_str(&passage.source);
        prompt.push('\n');
        prompt.push_str(&passage.text);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_chatbot_returns_literal() {
        let chatbot = Chatbot::unavailable();
        let answer = chatbot.ask("When should I plant wheat?").await;
        assert_eq!(answer, UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn chat_body_carries_system_and_user_turns() {
        let body = chat_body("llama-3.3-70b-versatile", SYSTEM_PROMPT, "How deep to sow maize?", 0.7, 500);
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 500);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "How deep to sow maize?");
    }

    #[test]
    fn parses_chat_response_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Sow at 5 cm depth." } }
            ]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Sow at 5 cm depth.");
    }

    #[test]
    fn rejects_empty_choices() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_chat_response(&json).is_err());
    }

    #[test]
    fn rag_prompt_includes_passages_and_sources() {
        let passages = vec![
            RetrievedPassage {
                source: "soil.txt".to_string(),
                text: "Loam holds moisture well.".to_string(),
                score: 0.9,
            },
            RetrievedPassage {
                source: "crops.txt".to_string(),
                text: "Rotate legumes with cereals.".to_string(),
                score: 0.8,
            },
        ];
        let prompt = rag_system_prompt(&passages);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("Source: soil.txt"));
        assert!(prompt.contains("Loam holds moisture well."));
        assert!(prompt.contains("Rotate legumes with cereals."));
    }

    #[test]
    fn rag_prompt_without_passages_is_plain_persona() {
        assert_eq!(rag_system_prompt(&[]), SYSTEM_PROMPT);
    }
}
