use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::ApiError;
use crate::db::{EmbeddingTarget, Postgrest};
use crate::models::{BackfillReport, BackfillRequest, RowError, SyncReport, SyncRequest};
use crate::state::AppState;

/// Pause between bursts of embedding API calls to stay under rate limits.
const PACING_INTERVAL: usize = 10;
const PACING_DELAY_MS: u64 = 100;

/// POST /api/embeddings — backfill embeddings for all profiles, or for the
/// given ids. Requires the service-role client.
pub async fn backfill(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BackfillReport>, ApiError> {
    // Body is optional: an empty or malformed body means "backfill everything"
    let req: BackfillRequest = serde_json::from_slice(&body).unwrap_or_default();
    let db = admin_db(&state)?;
    let _permit = acquire_batch_permit(&state)?;

    let targets = db
        .embedding_targets(req.ids.as_deref())
        .await
        .map_err(|e| ApiError::internal("Failed to fetch profiles", &e))?;

    if targets.is_empty() {
        return Ok(Json(BackfillReport {
            updated: 0,
            total: 0,
            message: "No profiles found to update".to_string(),
            errors: Vec::new(),
        }));
    }

    let total = targets.len();
    tracing::info!("Processing {total} profiles for embedding generation");

    let (updated, errors) = embed_batch(&state, db, targets, false).await;

    Ok(Json(BackfillReport {
        updated,
        total,
        message: format!("Successfully updated {updated} out of {total} profiles"),
        errors,
    }))
}

/// POST /api/embeddings/sync — re-embed profiles whose text changed since
/// their last embedding. Bounded batch; callable from a cron or the UI.
pub async fn sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncReport>, ApiError> {
    let req: SyncRequest = serde_json::from_slice(&body).unwrap_or_default();
    let db = admin_db(&state)?;
    let _permit = acquire_batch_permit(&state)?;

    let limit = req.limit.unwrap_or(state.config.sync_batch_limit);
    let targets = db
        .dirty_targets(limit)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch profiles", &e))?;

    if targets.is_empty() {
        return Ok(Json(SyncReport {
            updated: 0,
            checked: 0,
            message: "No dirty profiles found. All embeddings are up to date.".to_string(),
            errors: Vec::new(),
        }));
    }

    let checked = targets.len();
    tracing::info!("Processing {checked} dirty profiles for embedding sync");

    let (updated, errors) = embed_batch(&state, db, targets, true).await;

    Ok(Json(SyncReport {
        updated,
        checked,
        message: format!("Successfully synced {updated} out of {checked} dirty profiles"),
        errors,
    }))
}

fn admin_db(state: &AppState) -> Result<&Postgrest, ApiError> {
    state.admin_db.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Embedding endpoints require SUPABASE_SERVICE_ROLE_KEY",
        )
    })
}

/// One batch at a time: concurrent backfills would double-embed rows and
/// burn through the rate limit.
fn acquire_batch_permit(
    state: &AppState,
) -> Result<tokio::sync::OwnedSemaphorePermit, ApiError> {
    state
        .embed_semaphore
        .clone()
        .try_acquire_owned()
        .map_err(|_| {
            ApiError::new(
                StatusCode::CONFLICT,
                "An embedding batch is already running",
            )
        })
}

/// Embed each target and write it back. Per-row failures are collected, not
/// fatal. When `mark_clean_on_empty` is set, rows with no searchable text
/// get their dirty flag cleared so sync doesn't pick them up again.
async fn embed_batch(
    state: &AppState,
    db: &Postgrest,
    targets: Vec<EmbeddingTarget>,
    mark_clean_on_empty: bool,
) -> (usize, Vec<RowError>) {
    let mut updated = 0usize;
    let mut errors = Vec::new();

    for target in targets {
        let text = target.searchable_text.as_deref().unwrap_or("").trim();
        if text.is_empty() {
            tracing::info!("Skipping profile {}: empty searchable_text", target.id);
            if mark_clean_on_empty {
                if let Err(e) = db.mark_embedding_clean(target.id).await {
                    tracing::warn!("Failed to mark profile {} clean: {e:#}", target.id);
                }
            }
            continue;
        }

        let embedding = match crate::llm::embeddings::embed_single(
            &state.http_client,
            &state.config.llm,
            text,
        )
        .await
        {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::error!("Error embedding profile {}: {e:#}", target.id);
                errors.push(RowError {
                    id: target.id,
                    error: format!("{e:#}"),
                });
                continue;
            }
        };

        match db.store_embedding(target.id, &embedding).await {
            Ok(()) => {
                updated += 1;
                tracing::info!("Updated embedding for profile {}", target.id);
                // Pause only on the update that completed an interval, so a
                // run of failed rows never re-triggers the sleep.
                if should_pause(updated) {
                    tokio::time::sleep(std::time::Duration::from_millis(PACING_DELAY_MS)).await;
                }
            }
            Err(e) => {
                tracing::error!("Error updating profile {}: {e:#}", target.id);
                errors.push(RowError {
                    id: target.id,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    (updated, errors)
}

fn should_pause(updated: usize) -> bool {
    updated > 0 && updated % PACING_INTERVAL == 0
}
