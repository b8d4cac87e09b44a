//! Earth Engine REST client.
//!
//! Two operations cover everything the field-health pipeline needs:
//!
//! - `value:compute` - evaluate an expression graph to a JSON scalar
//!   (collection sizes, region means).
//! - `maps` - register an image expression with visualization options and
//!   return a slippy-map tile URL template.
//!
//! Authentication uses an OAuth bearer token from the `EARTHENGINE_TOKEN`
//! environment variable (service-account token minting is a deployment
//! concern, handled outside the process). A missing token or project leaves
//! the client unconfigured; the HTTP layer degrades the endpoint to an
//! `{"error"}` payload instead of failing startup.

pub mod expr;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::{self, EarthEngineConfig};
use expr::Expr;

const API_BASE: &str = "https://earthengine.googleapis.com/v1";

/// Visualization parameters for a map layer: a single value range mapped
/// onto a color palette.
#[derive(Debug, Clone)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: &'static [&'static str],
}

pub struct EarthEngineClient {
    http: reqwest::Client,
    project: String,
    token: String,
}

impl EarthEngineClient {
    pub fn new(project: String, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            project,
            token,
        })
    }

    /// Best-effort startup initialization. Returns `None` (with a warning)
    /// when the project or token is missing, mirroring how the chatbot
    /// degrades instead of refusing to start.
    pub fn initialize(config: &EarthEngineConfig) -> Option<Self> {
        let Some(project) = config.project.clone() else {
            tracing::warn!("earth_engine.project not configured - field health endpoint unavailable");
            return None;
        };

        let Ok(token) = std::env::var(config::EARTHENGINE_TOKEN) else {
            tracing::warn!("EARTHENGINE_TOKEN not set - field health endpoint unavailable");
            return None;
        };

        match Self::new(project, token) {
            Ok(client) => {
                tracing::info!("Earth Engine client initialized");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Earth Engine initialization failed");
                None
            }
        }
    }

    /// Evaluate an expression to a JSON value via `value:compute`.
    pub async fn compute_value(&self, expression: Expr) -> Result<Value> {
        let url = format!("{}/projects/{}/value:compute", API_BASE, self.project);
        let body = serde_json::json!({ "expression": expression.into_expression() });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Earth Engine compute request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            bail!("Earth Engine compute error {}: {}", status, body_text);
        }

        let json: Value = resp.json().await?;
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Evaluate an expression expected to yield a number. A null result
    /// (e.g. a fully masked region mean) maps to `None`.
    pub async fn compute_number(&self, expression: Expr) -> Result<Option<f64>> {
        let value = self.compute_value(expression).await?;
        match value {
            Value::Null => Ok(None),
            other => other
                .as_f64()
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Earth Engine returned a non-numeric result: {}", other)),
        }
    }

    /// Register `image` as a map layer and return its tile URL template
    /// (`{z}/{x}/{y}` placeholders left for the map widget to fill).
    pub async fn map_tile_url(&self, image: Expr, vis: &VisParams) -> Result<String> {
        let url = format!("{}/projects/{}/maps", API_BASE, self.project);
        let body = serde_json::json!({
            "expression": image.into_expression(),
            "fileFormat": "PNG",
            "visualizationOptions": {
                "ranges": [{ "min": vis.min, "max": vis.max }],
                "paletteColors": vis.palette,
            },
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Earth Engine maps request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            bail!("Earth Engine maps error {}: {}", status, body_text);
        }

        let json: Value = resp.json().await?;
        let name = json
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| anyhow::anyhow!("Earth Engine maps response missing name"))?;

        Ok(tile_url_format(name))
    }

    /// Evaluate `collection.size()`; when positive, return the collection's
    /// first image for further derivation. `None` means no scene matched.
    pub async fn best_scene(&self, collection: Expr) -> Result<Option<Expr>> {
        let size = self
            .compute_number(collection.clone().size())
            .await?
            .unwrap_or(0.0);

        if size > 0.0 {
            Ok(Some(collection.first()))
        } else {
            Ok(None)
        }
    }
}

fn tile_url_format(map_name: &str) -> String {
    format!("{}/{}/tiles/{{z}}/{{x}}/{{y}}", API_BASE, map_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_url_keeps_placeholders() {
        let url = tile_url_format("projects/demo/maps/abc123");
        assert_eq!(
            url,
            "https://earthengine.googleapis.com/v1/projects/demo/maps/abc123/tiles/{z}/{x}/{y}"
        );
    }

    #[test]
    fn initialize_without_project_degrades() {
        let config = EarthEngineConfig::default();
        assert!(EarthEngineClient::initialize(&config).is_none());
    }
}
