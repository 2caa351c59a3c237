//! # profile-search
//!
//! A Rust web application serving a conversational search UI over a
//! relational profile database, combining vector-similarity and keyword
//! search ("hybrid search") with an LLM-generated natural-language summary.
//!
//! ## Architecture
//!
//! The ranking algorithm itself lives in a remote stored procedure
//! (`hybrid_search_singles`, reached over PostgREST); this service is the
//! glue around it:
//!
//! ```text
//!   ┌──────────┐   message + filters    ┌───────────────────┐
//!   │ Browser  │ ─────────────────────▶ │  POST /api/chat    │
//!   └────┬─────┘                        └─────────┬─────────┘
//!        │                                        │ fresh turn
//!        │ refinement turn:                       ▼
//!        │ replays existing            ┌───────────────────────┐
//!        │ results, no DB hit         │ /v1/embeddings (query) │
//!        │                             └─────────┬─────────────┘
//!        │                                       ▼
//!        │                             ┌───────────────────────┐
//!        │                             │ rpc/hybrid_search_    │
//!        │                             │ singles (PostgREST)   │
//!        │                             └─────────┬─────────────┘
//!        │                                       ▼
//!        │                             ┌───────────────────────┐
//!        └───────────────────────────▶ │ condense top 100 +    │
//!                                      │ /v1/chat/completions  │
//!                                      └─────────┬─────────────┘
//!                                                ▼
//!                                       { answer, results }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, Supabase, and LLM settings
//! - [`models`] - Wire types: chat requests, profile rows, batch reports
//! - [`db`] - PostgREST client: the search RPC, profile reads, embedding writes
//! - [`llm::embeddings`] - Query/profile embedding via an OpenAI-compatible API
//! - [`llm::chat`] - Non-streaming chat completions for result summaries
//! - [`api`] - Axum HTTP handlers for chat, profiles, embedding batches, diagnostics
//! - [`state`] - Shared application state holding config, HTTP client, and semaphores

pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod models;
pub mod state;
