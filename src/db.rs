//! Thin PostgREST client for the Supabase backend.
//!
//! Supabase exposes the database over PostgREST, so all access here is plain
//! HTTP: the `hybrid_search_singles` stored procedure via `/rest/v1/rpc/`,
//! and filtered reads/patches on the profile tables. The hybrid ranking
//! itself runs entirely inside the stored procedure.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::ProfileHit;

pub const PROFILE_TABLE: &str = "singles_form_data";
pub const IMAGE_TABLE: &str = "singles_form_images";

/// Client bound to one API key. Reads and the search RPC go through an
/// anon-key client; embedding writes require a service-role client.
#[derive(Clone)]
pub struct Postgrest {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

/// Arguments for the `hybrid_search_singles` stored procedure. Absent
/// filters are serialized as JSON null, which the procedure treats as
/// "no filter".
#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchParams {
    pub p_query_text: String,
    /// Query embedding as a JSON-encoded float array string
    pub p_query_embedding: String,
    pub p_alpha: f64,
    pub p_match_count: i64,
    pub p_gender: Option<String>,
    pub p_min_age: Option<i32>,
    pub p_max_age: Option<i32>,
    pub p_state: Option<String>,
}

/// Projection used by the embedding backfill and sync loops.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingTarget {
    pub id: i64,
    pub searchable_text: Option<String>,
}

impl Postgrest {
    pub fn new(base_url: &str, api_key: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    /// Run the remote hybrid search and return the ranked profile rows.
    pub async fn hybrid_search(&self, params: &HybridSearchParams) -> Result<Vec<ProfileHit>> {
        let resp = self
            .http
            .post(self.rpc_url("hybrid_search_singles"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await
            .context("Failed to call hybrid_search_singles RPC")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("hybrid_search_singles returned {status}: {body}");
        }

        resp.json()
            .await
            .context("Failed to parse hybrid_search_singles response")
    }

    /// Fetch a full profile row by id. Returns None when no row matches.
    pub async fn fetch_profile(&self, id: i64) -> Result<Option<serde_json::Value>> {
        let mut rows: Vec<serde_json::Value> = self
            .get_rows(
                PROFILE_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{id}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    /// Fetch gallery images for a profile, primary image first.
    pub async fn fetch_profile_images(&self, id: i64) -> Result<Vec<serde_json::Value>> {
        self.get_rows(
            IMAGE_TABLE,
            &[
                ("select", "*".to_string()),
                ("singles_form_data_id", format!("eq.{id}")),
                ("order", "is_primary.desc,image_order.asc".to_string()),
            ],
        )
        .await
    }

    /// Rows to embed for a full backfill: all profiles, or the given ids.
    pub async fn embedding_targets(&self, ids: Option<&[i64]>) -> Result<Vec<EmbeddingTarget>> {
        let mut query = vec![("select", "id,searchable_text".to_string())];
        if let Some(ids) = ids {
            if !ids.is_empty() {
                query.push(("id", in_filter(ids)));
            }
        }
        self.get_rows(PROFILE_TABLE, &query).await
    }

    /// Rows whose embedding is stale, most recently updated first.
    pub async fn dirty_targets(&self, limit: usize) -> Result<Vec<EmbeddingTarget>> {
        self.get_rows(
            PROFILE_TABLE,
            &[
                ("select", "id,searchable_text".to_string()),
                ("embedding_dirty", "eq.true".to_string()),
                ("order", "updated_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// Write a fresh embedding and clear the dirty flag.
    pub async fn store_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        let body = serde_json::json!({
            "embedding": serde_json::to_string(embedding)?,
            "embedding_dirty": false,
            "embedding_updated_at": Utc::now().to_rfc3339(),
            "embedding_version": 1,
        });
        self.patch_profile(id, &body).await
    }

    /// Clear the dirty flag without touching the embedding. Used for rows
    /// with no searchable text, so sync doesn't revisit them forever.
    pub async fn mark_embedding_clean(&self, id: i64) -> Result<()> {
        let body = serde_json::json!({
            "embedding_dirty": false,
            "embedding_updated_at": Utc::now().to_rfc3339(),
        });
        self.patch_profile(id, &body).await
    }

    async fn get_rows<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let resp = self
            .http
            .get(self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to query {table}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("PostgREST query on {table} returned {status}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {table} rows"))
    }

    async fn patch_profile(&self, id: i64, body: &serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .patch(self.table_url(PROFILE_TABLE))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .query(&[("id", format!("eq.{id}"))])
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to update profile {id}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Profile update for {id} returned {status}: {body}");
        }
        Ok(())
    }
}

/// PostgREST `in` filter: `in.(1,2,3)`
fn in_filter(ids: &[i64]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({joined})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Postgrest {
        Postgrest::new(
            "https://example.supabase.co/",
            "anon-key",
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let c = client();
        assert_eq!(
            c.table_url("singles_form_data"),
            "https://example.supabase.co/rest/v1/singles_form_data"
        );
    }

    #[test]
    fn test_rpc_url() {
        let c = client();
        assert_eq!(
            c.rpc_url("hybrid_search_singles"),
            "https://example.supabase.co/rest/v1/rpc/hybrid_search_singles"
        );
    }

    #[test]
    fn test_in_filter_formatting() {
        assert_eq!(in_filter(&[1, 2, 3]), "in.(1,2,3)");
        assert_eq!(in_filter(&[42]), "in.(42)");
    }

    #[test]
    fn test_hybrid_params_serialize_nulls_for_absent_filters() {
        let params = HybridSearchParams {
            p_query_text: "hikers".into(),
            p_query_embedding: "[0.1,0.2]".into(),
            p_alpha: 0.6,
            p_match_count: 10_000,
            p_gender: None,
            p_min_age: None,
            p_max_age: None,
            p_state: Some("CO".into()),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json["p_gender"].is_null());
        assert!(json["p_min_age"].is_null());
        assert_eq!(json["p_state"], "CO");
        assert_eq!(json["p_match_count"], 10_000);
        // The embedding travels as a string, not a JSON array
        assert!(json["p_query_embedding"].is_string());
    }
}
