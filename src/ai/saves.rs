use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Idea,
    Stack,
}

impl SaveKind {
    fn table(self) -> &'static str {
        match self {
            Self::Idea => "saved_ideas",
            Self::Stack => "saved_stack",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SavedObject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub object: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn insert(
    db: &PgPool,
    kind: SaveKind,
    user_id: Uuid,
    object: &serde_json::Value,
) -> anyhow::Result<SavedObject> {
    let table = kind.table();
    let row = sqlx::query_as::<_, SavedObject>(&format!(
        "INSERT INTO {table} (user_id, object) VALUES ($1, $2) \
         RETURNING id, user_id, object, created_at"
    ))
    .bind(user_id)
    .bind(object)
    .fetch_one(db)
    .await
    .with_context(|| format!("insert into {table}"))?;
    Ok(row)
}

/// The user's saved outputs of `kind`, newest first.
pub async fn list(db: &PgPool, kind: SaveKind, user_id: Uuid) -> anyhow::Result<Vec<SavedObject>> {
    let table = kind.table();
    let rows = sqlx::query_as::<_, SavedObject>(&format!(
        "SELECT id, user_id, object, created_at FROM {table} \
         WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .with_context(|| format!("list {table}"))?;
    Ok(rows)
}
