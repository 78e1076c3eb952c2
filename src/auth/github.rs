use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Client, Url};
use serde::Deserialize;

use crate::config::GithubConfig;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "shards-backend";
const SCOPES: &str = "read:user user:email";

#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct GithubOAuth {
    http: Client,
    cfg: GithubConfig,
}

impl GithubOAuth {
    pub fn new(cfg: GithubConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("build github http client")?;
        Ok(Self { http, cfg })
    }

    pub fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.cfg.client_id.as_str()),
                ("redirect_uri", self.cfg.redirect_url.as_str()),
                ("scope", SCOPES),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<String> {
        let res: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.cfg.redirect_url.as_str()),
            ])
            .send()
            .await
            .context("github token exchange")?
            .error_for_status()
            .context("github token exchange status")?
            .json()
            .await
            .context("decode github token response")?;

        match res.access_token {
            Some(token) => Ok(token),
            None => anyhow::bail!(
                "github rejected code: {}",
                res.error_description
                    .or(res.error)
                    .unwrap_or_else(|| "unknown error".into())
            ),
        }
    }

    pub async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<GithubProfile> {
        self.http
            .get(format!("{API_URL}/user"))
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .context("github user request")?
            .error_for_status()
            .context("github user status")?
            .json()
            .await
            .context("decode github user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_client_and_state() {
        let gh = GithubOAuth::new(GithubConfig {
            client_id: "abc".into(),
            client_secret: "shh".into(),
            redirect_url: "http://localhost:8080/api/auth/github/callback".into(),
        })
        .unwrap();
        let url = Url::parse(&gh.authorize_url("nonce123").unwrap()).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".into(), "abc".into())));
        assert!(pairs.contains(&("state".into(), "nonce123".into())));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn profile_decodes_github_payload() {
        let p: GithubProfile = serde_json::from_str(
            r#"{"id": 42, "login": "octo", "name": null, "avatar_url": "https://a/x.png", "bio": "ignored"}"#,
        )
        .unwrap();
        assert_eq!(p.id, 42);
        assert_eq!(p.login, "octo");
        assert!(p.email.is_none());
    }
}
