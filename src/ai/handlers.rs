use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    credits::{metered, metered_then, Metered},
    dto::{
        CompetitiveRequest, CreditsResponse, Idea, IdeaRequest, ReadmeMetadata, ReadmeRequest,
        ReadmeTask, ReadmeUserInput, SaveStackRequest, StackRequest, ToolResponse, ToolResult,
        ToolTask,
    },
    saves::{self, SaveKind, SavedObject},
};
use crate::{
    auth::{AuthContext, Scope},
    error::ApiError,
    shards::{ensure_owner, Shard},
    state::AppState,
};

const GITHUB_TOKEN_HEADER: &str = "x-github-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ai-toolkit/credits", get(get_credits).post(topup_credits))
        .route("/ai-toolkit/idea-generator", post(idea_generator))
        .route("/ai-toolkit/stack-generator", post(stack_generator))
        .route("/ai-toolkit/readme-builder", post(readme_builder))
        .route("/ai-toolkit/competitive-analysis", post(competitive_analysis))
        .route("/ai-toolkit/idea-generator/save", post(save_idea))
        .route("/ai-toolkit/stack-generator/save", post(save_stack))
        .route("/ai-toolkit/saves/ideas", get(list_saved_ideas))
        .route("/ai-toolkit/saves/stack", get(list_saved_stacks))
}

async fn run_tool(state: &AppState, auth: &AuthContext, task: &ToolTask) -> Result<Metered, ApiError> {
    metered(
        state.ledger.as_ref(),
        state.worker.as_ref(),
        auth.user_id,
        state.config.credits.reservation,
        task,
    )
    .await
}

fn respond(m: Metered) -> Json<ToolResponse> {
    Json(ToolResponse {
        result: m.result,
        used_credits: m.used_credits,
        remaining_credits: m.remaining_credits,
    })
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn get_credits(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = state
        .ledger
        .balance(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(CreditsResponse { credits }))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn topup_credits(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<CreditsResponse>, ApiError> {
    auth.require(Scope::AiToolkit)?;
    let amount = state.config.credits.topup;
    let credits = state
        .ledger
        .grant(auth.user_id, amount)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!(amount, credits, "credits topped up");
    Ok(Json(CreditsResponse { credits }))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn idea_generator(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<IdeaRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    auth.require(Scope::AiToolkit)?;
    let task = payload.into_task()?;
    Ok(respond(run_tool(&state, &auth, &task).await?))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn stack_generator(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<StackRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    auth.require(Scope::AiToolkit)?;
    let task = payload.into_task()?;
    Ok(respond(run_tool(&state, &auth, &task).await?))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn competitive_analysis(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CompetitiveRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    auth.require(Scope::AiToolkit)?;
    let task = payload.into_task()?;
    Ok(respond(run_tool(&state, &auth, &task).await?))
}

/// Generates a README for one of the caller's shards and stores it as the
/// shard's content. Shard checks happen before any credit is reserved, and
/// the call is refunded when the README cannot be stored.
#[instrument(skip(state, headers, payload), fields(user_id = %auth.user_id))]
pub async fn readme_builder(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(payload): Json<ReadmeRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    auth.require(Scope::AiToolkit)?;
    let shard = Shard::find_by_id(&state.db, payload.shard_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shard not found"))?;
    ensure_owner(&shard, &auth)?;
    if shard.github_repo.trim().is_empty() {
        return Err(ApiError::bad_request("No GitHub repository linked to this shard"));
    }

    let github_token = headers
        .get(GITHUB_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let task = ToolTask::Readme(ReadmeTask {
        github_repo: shard.github_repo.clone(),
        user_input: ReadmeUserInput {
            description: payload.description.unwrap_or_default(),
            features: payload.features.unwrap_or_default(),
        },
        shard_id: shard.id,
        metadata: ReadmeMetadata {
            user_id: auth.user_id,
            project_name: shard.title.clone(),
        },
        github_token,
    });

    let db = state.db.clone();
    let (shard_id, owner) = (shard.id, auth.user_id);
    let outcome = metered_then(
        state.ledger.as_ref(),
        state.worker.as_ref(),
        auth.user_id,
        state.config.credits.reservation,
        &task,
        move |result| async move {
            if let ToolResult::Readme(readme) = &result {
                if !Shard::set_content(&db, shard_id, owner, &readme.content).await? {
                    return Err(ApiError::not_found("Shard not found"));
                }
                info!(%shard_id, "readme written to shard");
            }
            Ok(result)
        },
    )
    .await?;
    Ok(respond(outcome))
}

#[instrument(skip(state, idea), fields(user_id = %auth.user_id))]
pub async fn save_idea(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(idea): Json<Idea>,
) -> Result<(StatusCode, Json<SavedObject>), ApiError> {
    auth.require(Scope::AiToolkit)?;
    idea.validate()?;
    let object = serde_json::to_value(&idea).map_err(anyhow::Error::from)?;
    let saved = saves::insert(&state.db, SaveKind::Idea, auth.user_id, &object).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[instrument(skip(state, payload), fields(user_id = %auth.user_id))]
pub async fn save_stack(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<SaveStackRequest>,
) -> Result<(StatusCode, Json<SavedObject>), ApiError> {
    auth.require(Scope::AiToolkit)?;
    let object = serde_json::to_value(&payload.object).map_err(anyhow::Error::from)?;
    let saved = saves::insert(&state.db, SaveKind::Stack, auth.user_id, &object).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn list_saved_ideas(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<SavedObject>>, ApiError> {
    Ok(Json(saves::list(&state.db, SaveKind::Idea, auth.user_id).await?))
}

#[instrument(skip(state), fields(user_id = %auth.user_id))]
pub async fn list_saved_stacks(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<SavedObject>>, ApiError> {
    Ok(Json(saves::list(&state.db, SaveKind::Stack, auth.user_id).await?))
}
