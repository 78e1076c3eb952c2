use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::{
    dto::{AnalyticsResponse, LikeResponse, SaveResponse},
    repo::{self, Reaction, SavedShard},
};
use crate::{
    analytics::{daily_series, window_start, WINDOW_DAYS},
    auth::{AuthContext, Scope},
    error::ApiError,
    shards::Shard,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/shards/:slug/like", post(toggle_like))
        .route("/shards/:slug/save", post(toggle_save))
        .route("/dashboard/saved-shards", get(saved_shards))
        .route("/dashboard/analytics", get(received_analytics))
}

/// Shard the caller may react to: hidden shards only exist for their owner.
async fn reactable_shard(
    state: &AppState,
    auth: &AuthContext,
    slug: &str,
) -> Result<Shard, ApiError> {
    auth.require(Scope::Shards)?;
    match Shard::find_by_slug(&state.db, slug).await? {
        Some(shard) if shard.is_visible || auth.is(shard.user_id) => Ok(shard),
        _ => Err(ApiError::not_found("Shard not found")),
    }
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn toggle_like(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let shard = reactable_shard(&state, &auth, &slug).await?;
    let (liked, count) = repo::toggle(&state.db, Reaction::Like, auth.user_id, shard.id).await?;
    debug!(shard_id = %shard.id, liked, count, "like toggled");
    Ok(Json(LikeResponse { liked, count }))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn toggle_save(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<SaveResponse>, ApiError> {
    let shard = reactable_shard(&state, &auth, &slug).await?;
    let (saved, count) = repo::toggle(&state.db, Reaction::Save, auth.user_id, shard.id).await?;
    debug!(shard_id = %shard.id, saved, count, "save toggled");
    Ok(Json(SaveResponse { saved, count }))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn saved_shards(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<SavedShard>>, ApiError> {
    Ok(Json(repo::saved_by_user(&state.db, auth.user_id).await?))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn received_analytics(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let today = OffsetDateTime::now_utc().date();
    let since = window_start(today, WINDOW_DAYS);
    let (likes, saves, views) = repo::received_since(&state.db, auth.user_id, since).await?;
    let days = daily_series(today, WINDOW_DAYS, &likes, &saves, Some(&views));
    Ok(Json(AnalyticsResponse::from_days(days)))
}
