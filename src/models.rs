use serde::{Deserialize, Serialize};

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat/search request as posted by the browser.
///
/// Field names are camelCase on the wire. On a refinement turn the browser
/// replays the full result set from the first search instead of asking the
/// database again.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub min_age: Option<i32>,
    #[serde(default)]
    pub max_age: Option<i32>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub is_refinement: bool,
    #[serde(default)]
    pub existing_results: Vec<ProfileHit>,
}

/// One row returned by the `hybrid_search_singles` stored procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileHit {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub age_years: Option<i32>,
    pub gender: Option<String>,
    pub personal_summary: Option<String>,
    pub primary_image_url: Option<String>,
    pub status: Option<String>,
    pub final_score: f64,
}

/// Chat response: LLM summary plus the full result set.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub results: Vec<ProfileHit>,
}

/// Full profile detail: the raw row plus its gallery images.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDetail {
    pub profile: serde_json::Value,
    pub images: Vec<serde_json::Value>,
}

/// Backfill request: embed everything, or just the given profile ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackfillRequest {
    pub ids: Option<Vec<i64>>,
}

/// Sync request: bound on how many dirty profiles to process.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRequest {
    pub limit: Option<usize>,
}

/// Per-row failure in a backfill/sync batch.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub id: i64,
    pub error: String,
}

/// Report for a full backfill run.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub updated: usize,
    pub total: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}

/// Report for a dirty-profile sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub updated: usize,
    pub checked: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RowError>,
}
