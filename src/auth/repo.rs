use sqlx::PgPool;
use tracing::warn;

use super::github::GithubProfile;
use crate::{db::is_unique_violation, users::repo_types::User};

impl User {
    /// Create the user on first GitHub sign-in, otherwise refresh the
    /// GitHub-sourced fields. Profile edits (name, username, bio) are kept.
    /// The GitHub login becomes the username only when nobody holds it yet.
    pub async fn upsert_from_github(
        db: &PgPool,
        profile: &GithubProfile,
        signup_credits: i64,
    ) -> anyhow::Result<User> {
        match upsert(db, profile, Some(profile.login.as_str()), signup_credits).await {
            Err(e) if is_unique_violation(&e) => {
                warn!(github_login = %profile.login, "username claimed concurrently, signing up without one");
                upsert(db, profile, None, signup_credits).await
            }
            other => other,
        }
    }
}

async fn upsert(
    db: &PgPool,
    profile: &GithubProfile,
    username: Option<&str>,
    signup_credits: i64,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (github_id, name, username, email, image, ai_credits)
        VALUES (
            $1, $2,
            CASE WHEN EXISTS (SELECT 1 FROM users WHERE username = $3) THEN NULL ELSE $3 END,
            $4, $5, $6
        )
        ON CONFLICT (github_id) DO UPDATE
           SET email = COALESCE(EXCLUDED.email, users.email),
               image = COALESCE(EXCLUDED.image, users.image),
               name  = COALESCE(users.name, EXCLUDED.name)
        RETURNING id, github_id, name, username, email, image, bio, ai_credits,
                  access_level, is_banned, settings, created_at
        "#,
    )
    .bind(profile.id.to_string())
    .bind(profile.name.as_deref().unwrap_or(&profile.login))
    .bind(username)
    .bind(profile.email.as_deref())
    .bind(profile.avatar_url.as_deref())
    .bind(signup_credits.max(0))
    .fetch_one(db)
    .await?;
    Ok(user)
}
