use axum::{
    extract::{Query, State},
    routing::{get, put},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ProfileQuery, UpdateProfileRequest, UserIdQuery},
    repo_types::{Activity, PublicProfile, User, UserStats},
};
use crate::{
    analytics::{daily_series, window_start, WINDOW_DAYS},
    auth::{AuthContext, MaybeAuth},
    db::is_unique_violation,
    engagement::AnalyticsResponse,
    error::ApiError,
    shards::ShardCard,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(public_profile))
        .route("/user/dashboard", get(dashboard))
        .route("/user/update", put(update_profile))
        .route("/user/shards", get(user_shards))
        .route("/user/stats", get(user_stats))
        .route("/user/activity", get(user_activity))
        .route("/user/analytics", get(given_analytics))
}

/// The `user_id` query parameter, falling back to the signed-in caller.
fn target_user(query: &UserIdQuery, auth: &MaybeAuth) -> Result<Uuid, ApiError> {
    query
        .user_id
        .or_else(|| auth.user_id())
        .ok_or_else(|| ApiError::bad_request("user_id is required"))
}

#[instrument(skip(state))]
pub async fn public_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<PublicProfile>, ApiError> {
    User::find_public_by_username(&state.db, query.username.trim())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<User>, ApiError> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let (name, username, bio) = payload.validated()?;

    if User::username_taken_by_other(&state.db, username, auth.user_id).await? {
        return Err(ApiError::Conflict("Username is already taken".into()));
    }

    let user = match User::update_profile(&state.db, auth.user_id, name, username, bio).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!(%username, "username claimed concurrently");
            return Err(ApiError::Conflict("Username is already taken".into()));
        }
        Err(e) => return Err(e.into()),
    };
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;
    info!(%username, "profile updated");
    Ok(Json(user))
}

/// Every shard for the owner, only visible ones for anybody else.
#[instrument(skip(state, auth))]
pub async fn user_shards(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Vec<ShardCard>>, ApiError> {
    let owner = target_user(&query, &auth)?;
    let include_hidden = auth.user_id() == Some(owner);
    Ok(Json(
        ShardCard::list_by_owner(&state.db, owner, include_hidden).await?,
    ))
}

#[instrument(skip(state, auth))]
pub async fn user_stats(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<UserStats>, ApiError> {
    let user_id = target_user(&query, &auth)?;
    Ok(Json(User::stats(&state.db, user_id).await?))
}

#[instrument(skip(state, auth))]
pub async fn user_activity(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Query(query): Query<UserIdQuery>,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let user_id = target_user(&query, &auth)?;
    let since = OffsetDateTime::now_utc() - Duration::days(WINDOW_DAYS);
    Ok(Json(User::activity_since(&state.db, user_id, since).await?))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn given_analytics(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let today = OffsetDateTime::now_utc().date();
    let since = window_start(today, WINDOW_DAYS);
    let (likes, saves) = User::given_engagement_since(&state.db, auth.user_id, since).await?;
    let days = daily_series(today, WINDOW_DAYS, &likes, &saves, None);
    Ok(Json(AnalyticsResponse::from_days(days)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::JwtKeys, auth::Scope, state::AppState};
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[test]
    fn target_user_prefers_query_then_caller() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let auth = MaybeAuth(Some(AuthContext { user_id: me, scopes: vec![] }));

        let q = UserIdQuery { user_id: Some(other) };
        assert_eq!(target_user(&q, &auth).unwrap(), other);
        let q = UserIdQuery { user_id: None };
        assert_eq!(target_user(&q, &auth).unwrap(), me);
        assert!(matches!(
            target_user(&q, &MaybeAuth(None)),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn update_rejects_invalid_username_before_touching_the_database() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state)
            .sign_access(Uuid::new_v4(), vec![Scope::Shards])
            .unwrap();
        let res = crate::app::build_app(state)
            .oneshot(
                Request::put("/api/user/update")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"Ada","username":"no spaces please"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn anonymous_stats_need_a_user_id() {
        let res = crate::app::build_app(AppState::fake())
            .oneshot(Request::get("/api/user/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
