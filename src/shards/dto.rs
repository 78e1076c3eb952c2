use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, pagination::PageParams};

pub(crate) fn is_github_repo_url(url: &str) -> bool {
    lazy_static! {
        static ref GITHUB_REPO_RE: Regex =
            Regex::new(r"^https://github\.com/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/?$").unwrap();
    }
    GITHUB_REPO_RE.is_match(url)
}

fn required(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShardRequest {
    pub title: String,
    pub description: String,
    pub github_repo: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub content: Option<serde_json::Value>,
}

impl CreateShardRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        required(&self.title, "title")?;
        required(&self.description, "description")?;
        if !is_github_repo_url(self.github_repo.trim()) {
            return Err(ApiError::bad_request(
                "githubRepo must be a https://github.com/<owner>/<repo> URL",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateShardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<serde_json::Value>,
}

impl UpdateShardRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(title) = &self.title {
            required(title, "title")?;
        }
        if let Some(description) = &self.description {
            required(description, "description")?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub is_visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardSort {
    #[default]
    Recent,
    Title,
}

impl ShardSort {
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            Self::Recent => "s.created_at DESC, s.id",
            Self::Title => "lower(s.title), s.id",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExploreQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort: ShardSort,
    pub q: Option<String>,
}

impl ExploreQuery {
    pub fn page_params(&self) -> PageParams {
        let defaults = PageParams::default();
        PageParams {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }

    /// Title filter, `None` when absent or blank.
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerResponse {
    pub is_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadedImages {
    pub urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(title: &str, repo: &str) -> CreateShardRequest {
        CreateShardRequest {
            title: title.into(),
            description: "A thing".into(),
            github_repo: repo.into(),
            image_urls: vec![],
            content: None,
        }
    }

    #[test]
    fn github_repo_urls() {
        assert!(is_github_repo_url("https://github.com/rust-lang/rust"));
        assert!(is_github_repo_url("https://github.com/a_b/c.d-e/"));
        assert!(!is_github_repo_url("http://github.com/a/b"));
        assert!(!is_github_repo_url("https://gitlab.com/a/b"));
        assert!(!is_github_repo_url("https://github.com/a"));
        assert!(!is_github_repo_url("https://github.com/a/b/tree/main"));
    }

    #[test]
    fn create_requires_fields_and_repo() {
        assert!(create("My Project", "https://github.com/me/proj").validate().is_ok());
        assert!(matches!(
            create("  ", "https://github.com/me/proj").validate(),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            create("My Project", "not a url").validate(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn create_accepts_camel_case_body() {
        let req: CreateShardRequest = serde_json::from_value(serde_json::json!({
            "title": "T",
            "description": "D",
            "githubRepo": "https://github.com/me/t",
            "imageUrls": ["https://cdn/x.png"]
        }))
        .unwrap();
        assert_eq!(req.image_urls.len(), 1);
        assert!(req.content.is_none());
    }

    #[test]
    fn update_rejects_blank_title() {
        let req = UpdateShardRequest {
            title: Some(" ".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
        assert!(UpdateShardRequest::default().validate().is_ok());
    }

    #[test]
    fn explore_query_defaults() {
        let q: ExploreQuery = serde_json::from_str(r#"{"q":"  "}"#).unwrap();
        assert_eq!(q.sort, ShardSort::Recent);
        assert_eq!(q.search(), None);
        let p = q.page_params();
        assert_eq!((p.page(), p.limit()), (1, 20));

        let q: ExploreQuery = serde_json::from_str(r#"{"sort":"title","page":3}"#).unwrap();
        assert_eq!(q.sort, ShardSort::Title);
        assert_eq!(q.page_params().offset(), 40);
    }
}
