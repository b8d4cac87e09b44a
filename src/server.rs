//! HTTP surface of the backend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness text |
//! | `GET`  | `/get_field_health?lat=..&lon=..` | Field-health report |
//! | `POST` | `/ask-chatbot` | Farming chatbot |
//!
//! # Error Contract
//!
//! The field-health endpoint reports handled failures as a JSON body
//! `{"error": "..."}` with HTTP **200** - the frontend checks for the
//! `error` key, not the status code. The chatbot endpoint likewise never
//! surfaces generation failures as HTTP errors; it answers with a static
//! apology string instead.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted: the browser frontend is
//! served from a different origin.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::Chatbot;
use crate::config::Config;
use crate::ee::EarthEngineClient;
use crate::field_health;
use crate::models::{ChatAnswer, ChatRequest};

/// Shared application state, built once at startup and passed to handlers
/// via Axum's `State` extractor. External clients live here explicitly; no
/// mutable globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// `None` when Earth Engine credentials were missing at startup.
    pub earth_engine: Option<Arc<EarthEngineClient>>,
    pub chatbot: Arc<Chatbot>,
}

impl AppState {
    /// Initialize all external clients from config and environment.
    /// Initialization failures degrade the affected endpoint; they never
    /// abort startup.
    pub async fn initialize(config: Config) -> Self {
        let earth_engine = EarthEngineClient::initialize(&config.earth_engine).map(Arc::new);
        let chatbot = Arc::new(Chatbot::initialize(&config).await);

        Self {
            config: Arc::new(config),
            earth_engine,
            chatbot,
        }
    }
}

/// Build the application router. Split out of [`run_server`] so tests can
/// drive it in process.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/get_field_health", get(handle_field_health))
        .route("/ask-chatbot", post(handle_ask_chatbot))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::initialize(config).await;
    let app = router(state);

    tracing::info!(addr = %bind_addr, "backend listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "AgriVision backend running" }))
}

// ============ GET /get_field_health ============

#[derive(Debug, Deserialize)]
struct FieldHealthParams {
    lat: f64,
    lon: f64,
}

/// Runs the full aggregation. Handled failures (missing credentials,
/// upstream errors) come back as `{"error": ...}` with HTTP 200.
async fn handle_field_health(
    State(state): State<AppState>,
    Query(params): Query<FieldHealthParams>,
) -> Json<serde_json::Value> {
    let Some(client) = &state.earth_engine else {
        return Json(serde_json::json!({
            "error": "Earth Engine is not initialized. Configure earth_engine.project and EARTHENGINE_TOKEN."
        }));
    };

    match field_health::build_report(
        client,
        &state.config.earth_engine,
        params.lat,
        params.lon,
    )
    .await
    {
        Ok(report) => Json(serde_json::to_value(report).unwrap_or_else(
            |e| serde_json::json!({ "error": format!("Report serialization failed: {}", e) }),
        )),
        Err(e) => {
            tracing::error!(lat = params.lat, lon = params.lon, error = %e, "field health failed");
            Json(serde_json::json!({ "error": format!("Earth Engine processing error: {}", e) }))
        }
    }
}

// ============ POST /ask-chatbot ============

async fn handle_ask_chatbot(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatAnswer> {
    tracing::info!(question = %request.question, "processing chatbot question");
    let answer = state.chatbot.ask(&request.question).await;
    Json(ChatAnswer { answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    /// State with every external client unconfigured, as on a bare machine.
    pub(crate) fn degraded_state() -> AppState {
        AppState {
            config: Arc::new(default_config()),
            earth_engine: None,
            chatbot: Arc::new(Chatbot::unavailable()),
        }
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let response = handle_root().await;
        assert_eq!(response.0["status"], "AgriVision backend running");
    }

    #[tokio::test]
    async fn field_health_without_credentials_returns_error_payload() {
        let state = degraded_state();
        let response = handle_field_health(
            State(state),
            Query(FieldHealthParams { lat: 0.0, lon: 0.0 }),
        )
        .await;
        let error = response.0["error"].as_str().unwrap();
        assert!(error.contains("Earth Engine"));
    }

    #[tokio::test]
    async fn chatbot_without_credentials_returns_unavailable_literal() {
        let state = degraded_state();
        let response = handle_ask_chatbot(
            State(state),
            Json(ChatRequest {
                user_id: "u-1".to_string(),
                question: "When should I irrigate?".to_string(),
            }),
        )
        .await;
        assert_eq!(response.0.answer, crate::chat::UNAVAILABLE_MESSAGE);
    }
}
