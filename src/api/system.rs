use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::state::AppState;

/// GET /api/diagnostics — presence of required secrets, never their values.
pub async fn diagnostics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "environment": {
            "hasOpenAIKey": config.llm.api_key.is_some(),
            "hasSupabaseUrl": !config.supabase.url.is_empty(),
            "hasSupabaseAnonKey": !config.supabase.anon_key.is_empty(),
            "hasSupabaseServiceKey": config.supabase.service_role_key.is_some(),
        },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/reset — the server is stateless; the browser clears its own
/// transcript and result set, this just acknowledges.
pub async fn reset() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Conversation cleared. New search started.",
    }))
}
