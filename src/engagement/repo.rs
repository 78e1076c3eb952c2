use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::shards::ShardCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Save,
}

impl Reaction {
    fn table(self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Save => "saves",
        }
    }
}

/// Flip `reaction` for (`user_id`, `shard_id`). Returns whether it is now
/// set and the shard's resulting total.
pub async fn toggle(
    db: &PgPool,
    reaction: Reaction,
    user_id: Uuid,
    shard_id: Uuid,
) -> anyhow::Result<(bool, i64)> {
    let table = reaction.table();
    let mut tx = db.begin().await.context("begin tx")?;

    let removed = sqlx::query(&format!(
        "DELETE FROM {table} WHERE user_id = $1 AND shard_id = $2"
    ))
    .bind(user_id)
    .bind(shard_id)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("delete from {table}"))?
    .rows_affected();

    let active = removed == 0;
    if active {
        sqlx::query(&format!(
            "INSERT INTO {table} (user_id, shard_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, shard_id) DO NOTHING"
        ))
        .bind(user_id)
        .bind(shard_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert into {table}"))?;
    }

    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table} WHERE shard_id = $1"
    ))
    .bind(shard_id)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("count {table}"))?;

    tx.commit().await.context("commit tx")?;
    Ok((active, count))
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SavedShard {
    #[sqlx(rename = "save_id")]
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    #[sqlx(flatten)]
    pub shard: ShardCard,
}

/// Shards saved by `user_id`, most recently saved first. Shards hidden by
/// their owner since are left out.
pub async fn saved_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SavedShard>> {
    let rows = sqlx::query_as::<_, SavedShard>(
        r#"
        SELECT sv.id AS save_id, sv.created_at AS saved_at,
               s.id, s.user_id, s.title, s.description, s.slug, s.github_repo,
               s.image_url, s.is_visible, s.created_at,
               u.username AS author_username, u.image AS author_image,
               (SELECT COUNT(*) FROM likes l WHERE l.shard_id = s.id) AS like_count,
               (SELECT COUNT(*) FROM saves v WHERE v.shard_id = s.id) AS save_count
          FROM saves sv
          JOIN shards s ON s.id = sv.shard_id
          JOIN users u ON u.id = s.user_id
         WHERE sv.user_id = $1
           AND (s.is_visible OR s.user_id = $1)
         ORDER BY sv.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list saved shards")?;
    Ok(rows)
}

async fn received_in(
    db: &PgPool,
    table: &str,
    owner: Uuid,
    since: OffsetDateTime,
) -> anyhow::Result<Vec<OffsetDateTime>> {
    let rows = sqlx::query_scalar::<_, OffsetDateTime>(&format!(
        r#"
        SELECT e.created_at
          FROM {table} e
          JOIN shards s ON s.id = e.shard_id
         WHERE s.user_id = $1 AND e.created_at >= $2
        "#
    ))
    .bind(owner)
    .bind(since)
    .fetch_all(db)
    .await
    .with_context(|| format!("received {table}"))?;
    Ok(rows)
}

pub async fn received_since(
    db: &PgPool,
    owner: Uuid,
    since: OffsetDateTime,
) -> anyhow::Result<(Vec<OffsetDateTime>, Vec<OffsetDateTime>, Vec<OffsetDateTime>)> {
    let likes = received_in(db, "likes", owner, since).await?;
    let saves = received_in(db, "saves", owner, since).await?;
    let views = received_in(db, "views", owner, since).await?;
    Ok((likes, saves, views))
}
