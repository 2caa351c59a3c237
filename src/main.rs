use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use profile_search::api;
use profile_search::config::Config;
use profile_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    tracing::info!("Supabase project: {}", config.supabase.url);
    tracing::info!(
        "LLM: {} / {} ({})",
        config.llm.chat_model,
        config.llm.embedding_model,
        config.llm.base_url
    );
    if config.supabase.service_role_key.is_none() {
        tracing::warn!("No service-role key set; embedding endpoints are disabled");
    }

    let state = AppState::new(config.clone())?;

    // No CORS layer: the SPA is served from the same origin so cross-origin
    // access is unnecessary.
    let app = Router::new()
        // Serve frontend
        .route("/", get(serve_index))
        // API routes
        .route("/api/chat", post(api::chat::chat))
        .route("/api/profile/{id}", get(api::profiles::get_profile))
        .route("/api/embeddings", post(api::embeddings::backfill))
        .route("/api/embeddings/sync", post(api::embeddings::sync))
        .route("/api/diagnostics", get(api::system::diagnostics))
        .route("/api/reset", post(api::system::reset))
        .with_state(state)
        .fallback(get(serve_index));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
