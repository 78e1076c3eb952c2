use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

const MIN_IDEA_INPUT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Beginner,
    Intermediate,
    Advanced,
    Any,
}

impl Complexity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

// --- requests ---

#[derive(Debug, Deserialize)]
pub struct IdeaRequest {
    pub topic: String,
    pub skills: String,
    pub complexity: String,
}

impl IdeaRequest {
    pub fn into_task(self) -> Result<ToolTask, ApiError> {
        let topic = self.topic.trim();
        let skills = self.skills.trim();
        if topic.chars().count() < MIN_IDEA_INPUT {
            return Err(ApiError::bad_request(format!(
                "topic must be at least {MIN_IDEA_INPUT} characters long"
            )));
        }
        if skills.chars().count() < MIN_IDEA_INPUT {
            return Err(ApiError::bad_request(format!(
                "skills must be at least {MIN_IDEA_INPUT} characters long"
            )));
        }
        let complexity = Complexity::parse(self.complexity.trim()).ok_or_else(|| {
            ApiError::bad_request("complexity must be one of beginner, intermediate, advanced, any")
        })?;
        Ok(ToolTask::Ideas(IdeaTask {
            topic: topic.to_string(),
            skills: skills.to_string(),
            complexity,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackRequest {
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub requirements: String,
    pub preferences: Option<String>,
}

impl StackRequest {
    pub fn into_task(self) -> Result<ToolTask, ApiError> {
        if self.project_type.trim().is_empty() || self.requirements.trim().is_empty() {
            return Err(ApiError::bad_request(
                "Project type and requirements are required",
            ));
        }
        Ok(ToolTask::Stack(StackTask {
            project_type: self.project_type.trim().to_string(),
            requirements: self.requirements.trim().to_string(),
            preferences: optional(self.preferences),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeRequest {
    pub shard_id: Uuid,
    pub description: Option<String>,
    pub features: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveRequest {
    #[serde(default)]
    pub project_description: String,
    pub competitors: Option<String>,
    pub target_audience: Option<String>,
}

impl CompetitiveRequest {
    pub fn into_task(self) -> Result<ToolTask, ApiError> {
        Ok(ToolTask::Competitive(CompetitiveTask {
            project_description: required(&self.project_description, "projectDescription")?,
            competitors: optional(self.competitors),
            target_audience: optional(self.target_audience),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveStackRequest {
    pub object: StackRecommendation,
}

// --- worker tasks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Ideas,
    Stack,
    Readme,
    Competitive,
}

impl ToolKind {
    pub fn path(self) -> &'static str {
        match self {
            Self::Ideas => "/idea-generator",
            Self::Stack => "/stack-generator",
            Self::Readme => "/readme-builder",
            Self::Competitive => "/competitive-analysis",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ideas => "idea-generator",
            Self::Stack => "stack-generator",
            Self::Readme => "readme-builder",
            Self::Competitive => "competitive-analysis",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeaTask {
    pub topic: String,
    pub skills: String,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Serialize)]
pub struct StackTask {
    pub project_type: String,
    pub requirements: String,
    pub preferences: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadmeUserInput {
    pub description: String,
    pub features: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadmeMetadata {
    pub user_id: Uuid,
    pub project_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadmeTask {
    pub github_repo: String,
    pub user_input: ReadmeUserInput,
    pub shard_id: Uuid,
    pub metadata: ReadmeMetadata,
    pub github_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitiveTask {
    pub project_description: String,
    pub competitors: String,
    pub target_audience: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolTask {
    Ideas(IdeaTask),
    Stack(StackTask),
    Readme(ReadmeTask),
    Competitive(CompetitiveTask),
}

impl ToolTask {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::Ideas(_) => ToolKind::Ideas,
            Self::Stack(_) => ToolKind::Stack,
            Self::Readme(_) => ToolKind::Readme,
            Self::Competitive(_) => ToolKind::Competitive,
        }
    }
}

// --- results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "estimated_time")]
    pub estimated_time: String,
}

impl Idea {
    pub fn validate(&self) -> Result<(), ApiError> {
        required(&self.title, "title").map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaResult {
    pub ideas: Vec<Idea>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackRecommendation {
    pub title: String,
    pub frontend: String,
    pub backend: String,
    pub database: String,
    pub authentication: String,
    pub deployment: String,
    pub reasoning: String,
}

/// Generated README as a rich-text document (`{"type": "doc", ...}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadmeResult {
    pub content: serde_json::Value,
}

impl ReadmeResult {
    pub fn is_document(content: &serde_json::Value) -> bool {
        content.get("type").and_then(|t| t.as_str()) == Some("doc")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetitiveAnalysisResult {
    #[serde(alias = "unique_value_proposition")]
    pub unique_value_proposition: Vec<String>,
    #[serde(alias = "competitive_advantages")]
    pub competitive_advantages: Vec<String>,
    #[serde(alias = "target_audience_alignment")]
    pub target_audience_alignment: String,
    #[serde(alias = "recommended_positioning")]
    pub recommended_positioning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Ideas(IdeaResult),
    Stack(StackRecommendation),
    Readme(ReadmeResult),
    Competitive(CompetitiveAnalysisResult),
}

#[derive(Debug, Serialize)]
pub struct ToolResponse {
    #[serde(flatten)]
    pub result: ToolResult,
    pub used_credits: i64,
    pub remaining_credits: i64,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
}
