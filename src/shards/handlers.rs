use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        CreateShardRequest, ExploreQuery, OwnerResponse, UpdateShardRequest, UploadedImages,
        VisibilityRequest,
    },
    images::{self, ext_from_mime, UploadItem},
    repo::NewShard,
    repo_types::{Shard, ShardCard, ShardDetail},
    slug::slugify,
};
use crate::{
    auth::{AuthContext, MaybeAuth, Scope},
    error::ApiError,
    pagination::Page,
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const MAX_IMAGES: usize = 10;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/shards/explore", get(explore))
        .route("/shards/:slug/owner", get(verify_owner))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/shards", post(create_shard))
        .route(
            "/shards/:slug",
            get(get_shard).put(update_shard).delete(delete_shard),
        )
        .route("/shards/:slug/visibility", patch(set_visibility))
        .route(
            "/shards/images",
            post(upload_images).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

/// 403 unless the caller owns `shard`.
pub fn ensure_owner(shard: &Shard, auth: &AuthContext) -> Result<(), ApiError> {
    if auth.is(shard.user_id) {
        Ok(())
    } else {
        warn!(user_id = %auth.user_id, shard_id = %shard.id, "not the shard owner");
        Err(ApiError::forbidden("You do not own this shard"))
    }
}

async fn load_shard(state: &AppState, slug: &str) -> Result<Shard, ApiError> {
    Shard::find_by_slug(&state.db, slug)
        .await?
        .ok_or_else(|| ApiError::not_found("Shard not found"))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn create_shard(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CreateShardRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Shard>), ApiError> {
    auth.require(Scope::Shards)?;
    payload.validate()?;

    let title = payload.title.trim();
    let shard = Shard::create(
        &state.db,
        &slugify(title),
        &NewShard {
            user_id: auth.user_id,
            title,
            description: payload.description.trim(),
            github_repo: payload.github_repo.trim(),
            image_urls: &payload.image_urls,
            content: payload.content.as_ref(),
        },
    )
    .await?;
    info!(shard_id = %shard.id, slug = %shard.slug, "shard created");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/api/shards/{}", shard.slug))
            .map_err(anyhow::Error::from)?,
    );
    Ok((StatusCode::CREATED, headers, Json(shard)))
}

#[instrument(skip(state))]
pub async fn explore(
    State(state): State<AppState>,
    Query(query): Query<ExploreQuery>,
) -> Result<Json<Page<ShardCard>>, ApiError> {
    let params = query.page_params();
    let (items, total) = ShardCard::explore(
        &state.db,
        query.search(),
        query.sort,
        params.limit(),
        params.offset(),
    )
    .await?;
    Ok(Json(Page::new(items, params, total)))
}

#[instrument(skip(state, auth))]
pub async fn get_shard(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Path(slug): Path<String>,
) -> Result<Json<ShardDetail>, ApiError> {
    let viewer = auth.user_id();
    let detail = Shard::detail(&state.db, &slug, viewer)
        .await?
        .ok_or_else(|| ApiError::not_found("Shard not found"))?;

    let is_owner = viewer == Some(detail.shard.user_id);
    if !detail.shard.is_visible && !is_owner {
        return Err(ApiError::not_found("Shard not found"));
    }
    if !is_owner {
        if let Err(e) = Shard::record_view(&state.db, detail.shard.id, viewer).await {
            warn!(error = %e, shard_id = %detail.shard.id, "failed to record view");
        }
    }
    Ok(Json(detail))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn update_shard(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(payload): Json<UpdateShardRequest>,
) -> Result<Json<Shard>, ApiError> {
    auth.require(Scope::Shards)?;
    let shard = load_shard(&state, &slug).await?;
    ensure_owner(&shard, &auth)?;
    payload.validate()?;

    let title = payload.title.as_deref().map(str::trim).unwrap_or(&shard.title);
    let description = payload
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or(&shard.description);
    let new_base = (title != shard.title)
        .then(|| slugify(title))
        .filter(|base| *base != shard.slug);

    let updated = Shard::update(
        &state.db,
        shard.id,
        auth.user_id,
        title,
        description,
        payload.content.as_ref(),
        new_base.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Shard not found"))?;
    info!(shard_id = %updated.id, slug = %updated.slug, "shard updated");
    Ok(Json(updated))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn set_visibility(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(payload): Json<VisibilityRequest>,
) -> Result<Json<Shard>, ApiError> {
    auth.require(Scope::Shards)?;
    let shard = load_shard(&state, &slug).await?;
    ensure_owner(&shard, &auth)?;

    let updated = Shard::set_visibility(&state.db, shard.id, auth.user_id, payload.is_visible)
        .await?
        .ok_or_else(|| ApiError::not_found("Shard not found"))?;
    Ok(Json(updated))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn delete_shard(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.require(Scope::Shards)?;
    let shard = load_shard(&state, &slug).await?;
    ensure_owner(&shard, &auth)?;

    let urls = Shard::delete(&state.db, shard.id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shard not found"))?;
    let removed = images::delete_images(state.storage.as_ref(), &urls).await;
    info!(shard_id = %shard.id, images_removed = removed, "shard deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, auth))]
pub async fn verify_owner(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Path(slug): Path<String>,
) -> Result<Json<OwnerResponse>, ApiError> {
    let shard = load_shard(&state, &slug).await?;
    Ok(Json(OwnerResponse {
        is_owner: auth.user_id() == Some(shard.user_id),
    }))
}

#[instrument(skip(state, mp), fields(user_id = %auth.user_id))]
pub async fn upload_images(
    State(state): State<AppState>,
    auth: AuthContext,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<UploadedImages>), ApiError> {
    auth.require(Scope::Shards)?;

    let mut files = Vec::new();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if !matches!(field.name(), Some("files") | Some("files[]")) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        if ext_from_mime(&content_type).is_none() {
            return Err(ApiError::bad_request(format!(
                "Unsupported image type {content_type:?}"
            )));
        }
        let body = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        files.push(UploadItem { body, content_type });
        if files.len() > MAX_IMAGES {
            return Err(ApiError::bad_request(format!(
                "At most {MAX_IMAGES} images per upload"
            )));
        }
    }
    if files.is_empty() {
        return Err(ApiError::bad_request("files[] is required"));
    }

    let urls = images::upload_images(state.storage.as_ref(), auth.user_id, files).await?;
    info!(count = urls.len(), "shard images uploaded");
    Ok((StatusCode::CREATED, Json(UploadedImages { urls })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::JwtKeys, state::AppState};
    use axum::{body::Body, extract::FromRef, http::Request};
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn shard_owned_by(user_id: Uuid) -> Shard {
        Shard {
            id: Uuid::new_v4(),
            user_id,
            title: "My Project".into(),
            description: "d".into(),
            slug: "my-project".into(),
            github_repo: "https://github.com/me/p".into(),
            image_url: vec![],
            content: None,
            is_visible: true,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        }
    }

    fn bearer(state: &AppState, scopes: Vec<Scope>) -> String {
        let token = JwtKeys::from_ref(state)
            .sign_access(Uuid::new_v4(), scopes)
            .unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn only_the_owner_passes() {
        let owner = Uuid::new_v4();
        let shard = shard_owned_by(owner);
        let me = AuthContext { user_id: owner, scopes: vec![Scope::Shards] };
        let other = AuthContext { user_id: Uuid::new_v4(), scopes: vec![Scope::Shards] };
        assert!(ensure_owner(&shard, &me).is_ok());
        assert!(matches!(ensure_owner(&shard, &other), Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn create_requires_auth() {
        let app = crate::app::build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::post("/api/shards")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"title":"t","description":"d","githubRepo":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_rejects_non_github_repo() {
        let state = AppState::fake();
        let auth = bearer(&state, vec![Scope::Shards, Scope::AiToolkit]);
        let res = crate::app::build_app(state)
            .oneshot(
                Request::post("/api/shards")
                    .header(header::AUTHORIZATION, auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"title":"t","description":"d","githubRepo":"https://example.com/x"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn banned_accounts_cannot_create() {
        let state = AppState::fake();
        let auth = bearer(&state, vec![]);
        let res = crate::app::build_app(state)
            .oneshot(
                Request::post("/api/shards")
                    .header(header::AUTHORIZATION, auth)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"title":"t","description":"d","githubRepo":"https://github.com/a/b"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn explore_rejects_unknown_sort() {
        let app = crate::app::build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::get("/api/shards/explore?sort=popular")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_without_files_is_bad_request() {
        let state = AppState::fake();
        let auth = bearer(&state, vec![Scope::Shards]);
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let res = crate::app::build_app(state)
            .oneshot(
                Request::post("/api/shards/images")
                    .header(header::AUTHORIZATION, auth)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_stores_images_and_returns_urls() {
        let state = AppState::fake();
        let auth = bearer(&state, vec![Scope::Shards]);
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        );
        let res = crate::app::build_app(state)
            .oneshot(
                Request::post("/api/shards/images")
                    .header(header::AUTHORIZATION, auth)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let url = json["urls"][0].as_str().unwrap();
        assert!(url.contains("/shards/"));
        assert!(url.ends_with(".png"));
    }
}
