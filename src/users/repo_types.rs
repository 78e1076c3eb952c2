use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub github_id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub ai_credits: i64,
    pub access_level: String,
    pub is_banned: bool,
    pub settings: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Profile fields safe to show to anyone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub username: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserStats {
    pub total_shards: i64,
    pub total_likes: i64,
    pub total_saves: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Created,
    Updated,
    Liked,
    Saved,
}

impl TryFrom<String> for ActivityKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "liked" => Ok(Self::Liked),
            "saved" => Ok(Self::Saved),
            other => Err(format!("unknown activity kind {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: ActivityKind,
    pub shard_title: String,
    pub shard_slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
