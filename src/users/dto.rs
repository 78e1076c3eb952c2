use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub username: String,
}

/// `?user_id=`; the caller when omitted.
#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub username: String,
    pub bio: Option<String>,
}

impl UpdateProfileRequest {
    /// Trimmed `(name, username, bio)`; an empty bio clears it.
    pub fn validated(&self) -> Result<(&str, &str, Option<&str>), ApiError> {
        let name = self.name.trim();
        let username = self.username.trim();
        if name.is_empty() || username.is_empty() {
            return Err(ApiError::bad_request("Name and username are required"));
        }
        if !is_valid_username(username) {
            return Err(ApiError::bad_request(
                "Username can only contain letters, numbers, underscores and hyphens",
            ));
        }
        let bio = self.bio.as_deref().map(str::trim).filter(|b| !b.is_empty());
        Ok((name, username, bio))
    }
}
