use sqlx::PgPool;
use uuid::Uuid;

use super::{
    dto::ShardSort,
    repo_types::{Shard, ShardCard, ShardDetail},
    slug::next_available_slug,
};
use crate::db::is_unique_violation;

const SHARD_COLUMNS: &str = "s.id, s.user_id, s.title, s.description, s.slug, s.github_repo, \
                             s.image_url, s.content, s.is_visible, s.created_at, s.updated_at";

const CARD_SELECT: &str = r#"
    SELECT s.id, s.user_id, s.title, s.description, s.slug, s.github_repo,
           s.image_url, s.is_visible, s.created_at,
           u.username AS author_username, u.image AS author_image,
           (SELECT COUNT(*) FROM likes l WHERE l.shard_id = s.id) AS like_count,
           (SELECT COUNT(*) FROM saves v WHERE v.shard_id = s.id) AS save_count
      FROM shards s
      JOIN users u ON u.id = s.user_id
"#;

/// Attempts at claiming a slug before giving up on a racing writer.
const SLUG_ATTEMPTS: usize = 5;

pub struct NewShard<'a> {
    pub user_id: Uuid,
    pub title: &'a str,
    pub description: &'a str,
    pub github_repo: &'a str,
    pub image_urls: &'a [String],
    pub content: Option<&'a serde_json::Value>,
}

/// `ILIKE` pattern matching `q` anywhere, with wildcards in `q` escaped.
pub(crate) fn contains_pattern(q: &str) -> String {
    let mut out = String::with_capacity(q.len() + 2);
    out.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl Shard {
    pub async fn find_by_slug(db: &PgPool, slug: &str) -> anyhow::Result<Option<Shard>> {
        let shard = sqlx::query_as::<_, Shard>(&format!(
            "SELECT {SHARD_COLUMNS} FROM shards s WHERE s.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(db)
        .await?;
        Ok(shard)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Shard>> {
        let shard = sqlx::query_as::<_, Shard>(&format!(
            "SELECT {SHARD_COLUMNS} FROM shards s WHERE s.id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(shard)
    }

    async fn slugs_with_base(
        db: &PgPool,
        base: &str,
        exclude: Option<Uuid>,
    ) -> anyhow::Result<Vec<String>> {
        let slugs = sqlx::query_scalar::<_, String>(
            r#"
            SELECT slug FROM shards
             WHERE (slug = $1 OR slug LIKE $2)
               AND ($3::uuid IS NULL OR id <> $3)
            "#,
        )
        .bind(base)
        .bind(format!("{base}-%"))
        .bind(exclude)
        .fetch_all(db)
        .await?;
        Ok(slugs)
    }

    pub async fn create(db: &PgPool, base: &str, new: &NewShard<'_>) -> anyhow::Result<Shard> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let taken = Self::slugs_with_base(db, base, None).await?;
            let slug = next_available_slug(base, &taken);
            let res = sqlx::query_as::<_, Shard>(
                r#"
                INSERT INTO shards AS s (user_id, title, description, slug, github_repo, image_url, content)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING s.id, s.user_id, s.title, s.description, s.slug, s.github_repo,
                          s.image_url, s.content, s.is_visible, s.created_at, s.updated_at
                "#,
            )
            .bind(new.user_id)
            .bind(new.title)
            .bind(new.description)
            .bind(&slug)
            .bind(new.github_repo)
            .bind(new.image_urls)
            .bind(new.content)
            .fetch_one(db)
            .await
            .map_err(anyhow::Error::from);

            match res {
                Err(e) if attempt < SLUG_ATTEMPTS && is_unique_violation(&e) => {
                    tracing::debug!(%slug, attempt, "slug taken concurrently, retrying");
                }
                other => return other,
            }
        }
    }

    /// Owner-scoped edit. A `new_slug_base` re-derives the slug from it.
    /// `None` when the row is gone or owned by someone else.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
        title: &str,
        description: &str,
        content: Option<&serde_json::Value>,
        new_slug_base: Option<&str>,
    ) -> anyhow::Result<Option<Shard>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let slug = match new_slug_base {
                Some(base) => {
                    let taken = Self::slugs_with_base(db, base, Some(id)).await?;
                    Some(next_available_slug(base, &taken))
                }
                None => None,
            };
            let res = sqlx::query_as::<_, Shard>(&format!(
                r#"
                UPDATE shards AS s
                   SET title = $3,
                       description = $4,
                       content = COALESCE($5, s.content),
                       slug = COALESCE($6, s.slug),
                       updated_at = now()
                 WHERE s.id = $1 AND s.user_id = $2
                RETURNING {SHARD_COLUMNS}
                "#
            ))
            .bind(id)
            .bind(owner)
            .bind(title)
            .bind(description)
            .bind(content)
            .bind(slug.as_deref())
            .fetch_optional(db)
            .await
            .map_err(anyhow::Error::from);

            match res {
                Err(e) if attempt < SLUG_ATTEMPTS && is_unique_violation(&e) => {
                    tracing::debug!(?slug, attempt, "slug taken concurrently, retrying");
                }
                other => return other,
            }
        }
    }

    pub async fn set_visibility(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
        visible: bool,
    ) -> anyhow::Result<Option<Shard>> {
        let shard = sqlx::query_as::<_, Shard>(&format!(
            r#"
            UPDATE shards AS s
               SET is_visible = $3, updated_at = now()
             WHERE s.id = $1 AND s.user_id = $2
            RETURNING {SHARD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(visible)
        .fetch_optional(db)
        .await?;
        Ok(shard)
    }

    pub async fn set_content(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
        content: &serde_json::Value,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE shards SET content = $3, updated_at = now() WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .bind(content)
        .execute(db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Delete an owned shard; returns its image URLs, `None` if nothing was deleted.
    pub async fn delete(db: &PgPool, id: Uuid, owner: Uuid) -> anyhow::Result<Option<Vec<String>>> {
        let images = sqlx::query_scalar::<_, Vec<String>>(
            "DELETE FROM shards WHERE id = $1 AND user_id = $2 RETURNING image_url",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await?;
        Ok(images)
    }

    pub async fn detail(
        db: &PgPool,
        slug: &str,
        viewer: Option<Uuid>,
    ) -> anyhow::Result<Option<ShardDetail>> {
        let detail = sqlx::query_as::<_, ShardDetail>(&format!(
            r#"
            SELECT {SHARD_COLUMNS},
                   u.name AS author_name, u.username AS author_username, u.image AS author_image,
                   (SELECT COUNT(*) FROM likes l WHERE l.shard_id = s.id) AS like_count,
                   (SELECT COUNT(*) FROM saves v WHERE v.shard_id = s.id) AS save_count,
                   EXISTS (SELECT 1 FROM likes l WHERE l.shard_id = s.id AND l.user_id = $2) AS liked,
                   EXISTS (SELECT 1 FROM saves v WHERE v.shard_id = s.id AND v.user_id = $2) AS saved
              FROM shards s
              JOIN users u ON u.id = s.user_id
             WHERE s.slug = $1
            "#
        ))
        .bind(slug)
        .bind(viewer)
        .fetch_optional(db)
        .await?;
        Ok(detail)
    }

    pub async fn record_view(db: &PgPool, shard_id: Uuid, viewer: Option<Uuid>) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO views (shard_id, viewer_id) VALUES ($1, $2)")
            .bind(shard_id)
            .bind(viewer)
            .execute(db)
            .await?;
        Ok(())
    }
}

impl ShardCard {
    pub async fn explore(
        db: &PgPool,
        search: Option<&str>,
        sort: ShardSort,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<ShardCard>, i64)> {
        let pattern = search.map(contains_pattern);
        let rows = sqlx::query_as::<_, ShardCard>(&format!(
            r#"
            {CARD_SELECT}
             WHERE s.is_visible
               AND ($1::text IS NULL OR s.title ILIKE $1)
             ORDER BY {}
             LIMIT $2 OFFSET $3
            "#,
            sort.order_by()
        ))
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shards s WHERE s.is_visible AND ($1::text IS NULL OR s.title ILIKE $1)",
        )
        .bind(pattern.as_deref())
        .fetch_one(db)
        .await?;
        Ok((rows, total))
    }

    pub async fn list_by_owner(
        db: &PgPool,
        owner: Uuid,
        include_hidden: bool,
    ) -> anyhow::Result<Vec<ShardCard>> {
        let rows = sqlx::query_as::<_, ShardCard>(&format!(
            r#"
            {CARD_SELECT}
             WHERE s.user_id = $1 AND ($2 OR s.is_visible)
             ORDER BY s.created_at DESC, s.id
            "#
        ))
        .bind(owner)
        .bind(include_hidden)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
