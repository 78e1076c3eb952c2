use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Shard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub github_repo: String,
    pub image_url: Vec<String>,
    pub content: Option<serde_json::Value>,
    pub is_visible: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShardCard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub github_repo: String,
    pub image_url: Vec<String>,
    pub is_visible: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author_username: Option<String>,
    pub author_image: Option<String>,
    pub like_count: i64,
    pub save_count: i64,
}

/// A single shard as shown on its page.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShardDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub shard: Shard,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub author_image: Option<String>,
    pub like_count: i64,
    pub save_count: i64,
    /// Whether the caller liked / saved it; false for anonymous callers.
    pub liked: bool,
    pub saved: bool,
}
