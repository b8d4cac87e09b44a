//! Core data types flowing through the service.
//!
//! The field-health types mirror the JSON contract consumed by the web
//! frontend: optional scalar readings serialize as the literal string `"N/A"`
//! when absent, and handled failures are reported as an `{"error": ...}`
//! payload with HTTP 200 rather than an error status.

use serde::{Deserialize, Serialize, Serializer};

/// Qualitative crop-health bucket derived from the mean NDVI over the AOI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No NDVI reading was available (no optical scene in the window).
    Analyzing,
    VeryHealthy,
    Healthy,
    Stressed,
    VeryStressed,
}

impl HealthStatus {
    /// Bucket a mean NDVI value using the fixed threshold ladder.
    pub fn from_ndvi(ndvi: f64) -> Self {
        if ndvi >= 0.6 {
            HealthStatus::VeryHealthy
        } else if ndvi >= 0.4 {
            HealthStatus::Healthy
        } else if ndvi >= 0.2 {
            HealthStatus::Stressed
        } else {
            HealthStatus::VeryStressed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Analyzing => "Analyzing...",
            HealthStatus::VeryHealthy => "Very Healthy",
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Stressed => "Stressed",
            HealthStatus::VeryStressed => "Very Stressed / Bare Soil",
        }
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Serialize `None` as the literal `"N/A"` expected by the frontend.
fn na_if_none<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match value {
        Some(v) => v.serialize(serializer),
        None => serializer.serialize_str("N/A"),
    }
}

/// Assembled field-health record returned by `GET /get_field_health`.
///
/// Each satellite source contributes its fields only when a scene was found
/// inside the trailing window; a missing source leaves its URL fields `null`
/// and its scalar fields `"N/A"` without failing the request.
#[derive(Debug, Clone, Serialize)]
pub struct FieldHealthReport {
    pub health_status: HealthStatus,
    #[serde(serialize_with = "na_if_none")]
    pub avg_temp_celsius: Option<f64>,
    #[serde(serialize_with = "na_if_none")]
    pub soil_organic_carbon: Option<String>,
    pub ndvi_map_url: Option<String>,
    pub ndwi_map_url: Option<String>,
    pub soil_moisture_map_url: Option<String>,
    pub lst_map_url: Option<String>,
    /// Approximate field boundary: a fixed-offset square around the query
    /// point, `[lat, lon]` corners in SW, NW, NE, SE order.
    pub field_boundary: [[f64; 2]; 4],
}

/// Request body for `POST /ask-chatbot`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Accepted for API compatibility; no per-user state is kept.
    pub user_id: String,
    pub question: String,
}

/// Response body for `POST /ask-chatbot`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
}

/// A knowledge-base text file loaded for ingestion.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    /// File name relative to the knowledge-base root.
    pub source: String,
    pub body: String,
}

/// A unit of ingested text: at most `chunk_size` characters, overlapping its
/// neighbors, embedded and upserted into the vector index.
#[derive(Debug, Clone)]
pub struct KnowledgeChunk {
    pub id: String,
    /// Source file the chunk came from.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text, for staleness checks.
    pub hash: String,
}

/// A passage retrieved from the vector index for RAG prompting.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub source: String,
    pub text: String,
    pub score: f64,
}
