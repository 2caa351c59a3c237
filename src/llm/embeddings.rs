use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

/// Maximum characters to send per text to the embedding API.
/// text-embedding-3-small has an 8 192-token context; prose tokenises at
/// roughly 4 chars per token, so 24 000 chars stays comfortably under it
/// even for dense profile text.
const MAX_EMBED_CHARS: usize = 24_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: String,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Generate an embedding for a single text via the OpenAI-compatible API.
/// Rejects empty input and validates the returned vector dimension.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    if text.trim().is_empty() {
        anyhow::bail!("Text cannot be empty for embedding generation");
    }

    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let req = EmbedRequest {
        model: config.embedding_model.clone(),
        input: truncate_for_embedding(text).to_string(),
        encoding_format: "float",
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&req)
        .send()
        .await
        .context("Failed to call embeddings API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Embeddings API returned {status}: {body}");
    }

    let body: EmbedResponse = resp
        .json()
        .await
        .context("Failed to parse embeddings response")?;

    let embedding = body
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("No embedding returned")?;

    if embedding.len() != config.embedding_dim {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            config.embedding_dim,
            embedding.len()
        );
    }

    Ok(embedding)
}
