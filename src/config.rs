use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Supabase / PostgREST connection settings
    pub supabase: SupabaseConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Search tuning defaults
    pub search: SearchConfig,
    /// Maximum dirty profiles processed per sync call
    pub sync_batch_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project base URL (e.g. "https://xyz.supabase.co")
    pub url: String,
    /// Anon key used for reads and the search RPC
    pub anon_key: String,
    /// Service-role key for embedding writes. If None, the
    /// backfill/sync endpoints are disabled.
    pub service_role_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API
    pub base_url: String,
    /// API key
    pub api_key: Option<String>,
    /// Model name for chat summaries
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default vector-vs-keyword blend passed to the hybrid search RPC
    pub default_alpha: f64,
    /// Default match count requested from the RPC. Deliberately large so a
    /// single search returns the whole candidate set and the browser can
    /// refine it locally without re-querying.
    pub default_match_count: i64,
    /// Maximum results forwarded to the chat model (token budget)
    pub max_results_for_llm: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            supabase: SupabaseConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            sync_batch_limit: 50,
        }
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            service_role_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: 1536,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_alpha: 0.6,
            default_match_count: 10_000,
            max_results_for_llm: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PROFILE_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            config.supabase.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            config.supabase.anon_key = key;
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            config.supabase.service_role_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(val) = std::env::var("PROFILE_SEARCH_ALPHA") {
            if let Ok(v) = val.parse() {
                config.search.default_alpha = v;
            }
        }
        if let Ok(val) = std::env::var("PROFILE_SEARCH_MATCH_COUNT") {
            if let Ok(v) = val.parse() {
                config.search.default_match_count = v;
            }
        }
        if let Ok(val) = std::env::var("PROFILE_SEARCH_MAX_LLM_RESULTS") {
            if let Ok(v) = val.parse() {
                config.search.max_results_for_llm = v;
            }
        }
        if let Ok(val) = std::env::var("PROFILE_SEARCH_SYNC_LIMIT") {
            if let Ok(v) = val.parse() {
                config.sync_batch_limit = v;
            }
        }

        config
    }

    /// Check that the settings required to serve any request are present.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.supabase.url.trim().is_empty() {
            anyhow::bail!("SUPABASE_URL is not set");
        }
        if self.supabase.anon_key.trim().is_empty() {
            anyhow::bail!("SUPABASE_ANON_KEY is not set");
        }
        Ok(())
    }
}
