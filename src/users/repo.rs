use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Activity, PublicProfile, User, UserStats};

const USER_COLUMNS: &str = "id, github_id, name, username, email, image, bio, ai_credits, \
                            access_level, is_banned, settings, created_at";

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_public_by_username(
        db: &PgPool,
        username: &str,
    ) -> anyhow::Result<Option<PublicProfile>> {
        let profile = sqlx::query_as::<_, PublicProfile>(
            r#"
            SELECT id, name, username, image, bio, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }

    pub async fn username_taken_by_other(
        db: &PgPool,
        username: &str,
        user_id: Uuid,
    ) -> anyhow::Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
        )
        .bind(username)
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(taken)
    }

    /// Update editable profile fields; `None` when the user does not exist.
    pub async fn update_profile(
        db: &PgPool,
        user_id: Uuid,
        name: &str,
        username: &str,
        bio: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2, username = $3, bio = $4
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(name)
        .bind(username)
        .bind(bio)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn stats(db: &PgPool, user_id: Uuid) -> anyhow::Result<UserStats> {
        let stats = sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM shards WHERE user_id = $1) AS total_shards,
                (SELECT COUNT(*) FROM likes  WHERE user_id = $1) AS total_likes,
                (SELECT COUNT(*) FROM saves  WHERE user_id = $1) AS total_saves
            "#,
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(stats)
    }

    /// Created, updated, liked and saved events since `since`, newest first.
    pub async fn activity_since(
        db: &PgPool,
        user_id: Uuid,
        since: OffsetDateTime,
    ) -> anyhow::Result<Vec<Activity>> {
        let rows = sqlx::query_as::<_, Activity>(
            r#"
            SELECT 'created-' || s.id::text AS id, 'created' AS kind,
                   s.title AS shard_title, s.slug AS shard_slug, s.created_at
              FROM shards s
             WHERE s.user_id = $1 AND s.created_at >= $2
            UNION ALL
            SELECT 'updated-' || s.id::text, 'updated',
                   s.title, s.slug, s.updated_at
              FROM shards s
             WHERE s.user_id = $1 AND s.updated_at IS NOT NULL AND s.updated_at >= $2
            UNION ALL
            SELECT 'liked-' || l.id::text, 'liked',
                   s.title, s.slug, l.created_at
              FROM likes l JOIN shards s ON s.id = l.shard_id
             WHERE l.user_id = $1 AND l.created_at >= $2
            UNION ALL
            SELECT 'saved-' || v.id::text, 'saved',
                   s.title, s.slug, v.created_at
              FROM saves v JOIN shards s ON s.id = v.shard_id
             WHERE v.user_id = $1 AND v.created_at >= $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Timestamps of likes and saves given by the user since `since`.
    pub async fn given_engagement_since(
        db: &PgPool,
        user_id: Uuid,
        since: OffsetDateTime,
    ) -> anyhow::Result<(Vec<OffsetDateTime>, Vec<OffsetDateTime>)> {
        let likes = sqlx::query_scalar::<_, OffsetDateTime>(
            "SELECT created_at FROM likes WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(db)
        .await?;
        let saves = sqlx::query_scalar::<_, OffsetDateTime>(
            "SELECT created_at FROM saves WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok((likes, saves))
    }
}
