use std::sync::Arc;

use crate::config::Config;
use crate::db::Postgrest;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    /// Anon-key client: reads and the search RPC
    pub db: Postgrest,
    /// Service-role client: embedding writes. None when no service-role
    /// key is configured, which disables the backfill/sync endpoints.
    pub admin_db: Option<Postgrest>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
    /// Single permit: at most one backfill/sync batch at a time
    pub embed_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let db = Postgrest::new(
            &config.supabase.url,
            &config.supabase.anon_key,
            http_client.clone(),
        );

        let admin_db = config
            .supabase
            .service_role_key
            .as_deref()
            .map(|key| Postgrest::new(&config.supabase.url, key, http_client.clone()));

        Ok(Self {
            config,
            http_client,
            db,
            admin_db,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
            embed_semaphore: Arc::new(tokio::sync::Semaphore::new(1)),
        })
    }
}
