use axum::{
    extract::{FromRef, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use rand::{distributions::Alphanumeric, Rng};
use tracing::{error, info, instrument, warn};

use super::{
    claims::Scope,
    dto::{AuthResponse, CallbackQuery, RefreshRequest, SessionUser},
    extractors::AuthContext,
    jwt::JwtKeys,
};
use crate::{error::ApiError, state::AppState, users::repo_types::User};

const STATE_COOKIE: &str = "shards_oauth_state";
const CLEARED_STATE_COOKIE: &str =
    "shards_oauth_state=; HttpOnly; Path=/api/auth; Max-Age=0; SameSite=Lax";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/refresh", post(refresh))
        .route("/auth/session", get(session))
}

fn new_state_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn issue_tokens(state: &AppState, user: &User) -> Result<(String, String), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id, Scope::for_user(user.is_banned))?;
    let refresh_token = keys.sign_refresh(user.id)?;
    Ok((access_token, refresh_token))
}

#[instrument(skip(state))]
pub async fn github_login(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let nonce = new_state_nonce();
    let url = state.github.authorize_url(&nonce)?;
    let cookie = format!(
        "{STATE_COOKIE}={nonce}; HttpOnly; Path=/api/auth; Max-Age=600; SameSite=Lax"
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(anyhow::Error::from)?,
    );
    Ok((headers, Redirect::to(&url)))
}

/// Completes sign-in. The state cookie is cleared whatever the outcome.
#[instrument(skip(state, headers, query))]
pub async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    let mut clear = HeaderMap::new();
    clear.insert(
        header::SET_COOKIE,
        HeaderValue::from_static(CLEARED_STATE_COOKIE),
    );
    (clear, complete_sign_in(&state, &headers, query).await)
}

async fn complete_sign_in(
    state: &AppState,
    headers: &HeaderMap,
    query: CallbackQuery,
) -> Result<Json<AuthResponse>, ApiError> {
    match cookie_value(headers, STATE_COOKIE) {
        Some(expected) if expected == query.state => {}
        _ => {
            warn!("oauth state mismatch");
            return Err(ApiError::unauthorized("Invalid OAuth state"));
        }
    }

    let github_token = state.github.exchange_code(&query.code).await.map_err(|e| {
        warn!(error = %e, "github code exchange failed");
        ApiError::unauthorized("GitHub sign-in failed")
    })?;
    let profile = state.github.fetch_profile(&github_token).await.map_err(|e| {
        error!(error = %e, "github profile fetch failed");
        ApiError::Upstream("Could not load GitHub profile".into())
    })?;

    let user = User::upsert_from_github(&state.db, &profile, state.config.credits.signup).await?;
    if user.is_banned {
        warn!(user_id = %user.id, "banned user sign-in refused");
        return Err(ApiError::forbidden("Account is banned"));
    }

    let (access_token, refresh_token) = issue_tokens(state, &user)?;
    info!(user_id = %user.id, github_login = %profile.login, "user signed in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        github_token: Some(github_token),
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    if user.is_banned {
        return Err(ApiError::forbidden("Account is banned"));
    }

    let (access_token, refresh_token) = issue_tokens(&state, &user)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        github_token: None,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn session(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<SessionUser>, ApiError> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| {
            error!(user_id = %auth.user_id, "user not found");
            ApiError::unauthorized("User not found")
        })?;
    Ok(Json(user.into()))
}
