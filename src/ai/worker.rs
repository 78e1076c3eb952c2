use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use super::dto::{
    CompetitiveAnalysisResult, IdeaResult, ReadmeResult, StackRecommendation, ToolKind,
    ToolResult, ToolTask,
};
use crate::{config::WorkerConfig, error::ApiError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker unreachable: {0}")]
    Transport(String),

    #[error("worker timed out: {0}")]
    Timeout(String),

    #[error("worker returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The worker ran out of the budget it was given.
    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("worker rejected the request: {0}")]
    Rejected(String),

    #[error("unusable worker response: {0}")]
    Decode(String),
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::InsufficientCredits => ApiError::InsufficientCredits,
            WorkerError::Timeout(_) => ApiError::Upstream("AI service timed out".into()),
            WorkerError::Rejected(msg) => ApiError::Upstream(msg),
            _ => ApiError::Upstream("AI service failed".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub result: ToolResult,
    /// Credits the worker reports having spent, never negative.
    pub used_credits: i64,
}

#[async_trait]
pub trait AiWorker: Send + Sync {
    async fn run(&self, task: &ToolTask, budget: i64) -> Result<WorkerOutcome, WorkerError>;
}

pub struct HttpWorker {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpWorker {
    pub fn new(cfg: &WorkerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl AiWorker for HttpWorker {
    async fn run(&self, task: &ToolTask, budget: i64) -> Result<WorkerOutcome, WorkerError> {
        let kind = task.kind();
        let response = self
            .client
            .post(format!("{}{}", self.base_url, kind.path()))
            .header("X-API-Key", self.api_key.as_str())
            .header("X-User-Credits", budget.to_string())
            .header(reqwest::header::ACCEPT, "application/json")
            .json(task)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        decode_outcome(kind, status, body.as_ref())
    }
}

fn map_transport_error(error: reqwest::Error) -> WorkerError {
    if error.is_timeout() {
        WorkerError::Timeout(error.to_string())
    } else {
        WorkerError::Transport(error.to_string())
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// `used_credits`, or `used_tokens` from older workers; clamped at zero.
fn used_credits(value: &Value) -> i64 {
    ["used_credits", "used_tokens"]
        .iter()
        .find_map(|k| {
            let v = value.get(*k)?;
            v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
        })
        .unwrap_or(0)
        .max(0)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, WorkerError> {
    serde_json::from_value(value).map_err(|e| WorkerError::Decode(format!("{what}: {e}")))
}

pub(crate) fn decode_outcome(
    kind: ToolKind,
    status: StatusCode,
    body: &[u8],
) -> Result<WorkerOutcome, WorkerError> {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();

    if status == StatusCode::PAYMENT_REQUIRED
        || parsed.as_ref().and_then(|v| str_field(v, "error")) == Some("insufficient_credits")
    {
        return Err(WorkerError::InsufficientCredits);
    }
    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|v| {
                str_field(v, "detail")
                    .or_else(|| str_field(v, "message"))
                    .or_else(|| str_field(v, "error"))
            })
            .map(str::to_string)
            .unwrap_or_else(|| body_preview(body));
        return Err(WorkerError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let mut value = parsed
        .ok_or_else(|| WorkerError::Decode(format!("invalid JSON: {}", body_preview(body))))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = str_field(&value, "message")
            .or_else(|| str_field(&value, "error"))
            .unwrap_or("AI service could not complete the request");
        return Err(WorkerError::Rejected(message.to_string()));
    }
    let used_credits = used_credits(&value);

    let result = match kind {
        ToolKind::Ideas => ToolResult::Ideas(decode::<IdeaResult>(value, "ideas")?),
        ToolKind::Stack => {
            let recommendation = value
                .get_mut("recommendation")
                .map(Value::take)
                .ok_or_else(|| WorkerError::Decode("missing recommendation".into()))?;
            ToolResult::Stack(decode::<StackRecommendation>(recommendation, "recommendation")?)
        }
        ToolKind::Readme => {
            let content = ["readme", "readme_json"]
                .iter()
                .find_map(|k| value.get_mut(*k).map(Value::take))
                .ok_or_else(|| WorkerError::Decode("missing readme".into()))?;
            if !ReadmeResult::is_document(&content) {
                return Err(WorkerError::Decode("readme is not a document".into()));
            }
            ToolResult::Readme(ReadmeResult { content })
        }
        ToolKind::Competitive => {
            let analysis = if value.get("analysis").map_or(false, Value::is_object) {
                value["analysis"].take()
            } else {
                value
            };
            ToolResult::Competitive(decode::<CompetitiveAnalysisResult>(analysis, "analysis")?)
        }
    };

    Ok(WorkerOutcome {
        result,
        used_credits,
    })
}
