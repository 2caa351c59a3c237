use axum::extract::{Path, State};
use axum::Json;

use crate::api::ApiError;
use crate::models::ProfileDetail;
use crate::state::AppState;

/// GET /api/profile/{id} — full profile row plus its gallery images.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileDetail>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid profile ID"))?;

    let profile = state
        .db
        .fetch_profile(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch profile", &e))?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    // Images are best effort: a missing gallery shouldn't fail the page
    let images = match state.db.fetch_profile_images(id).await {
        Ok(images) => images,
        Err(e) => {
            tracing::warn!("Failed to fetch images for profile {id}: {e:#}");
            Vec::new()
        }
    };

    Ok(Json(ProfileDetail { profile, images }))
}
