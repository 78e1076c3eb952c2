use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// What an access token lets its bearer do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Shards,
    AiToolkit,
}

impl Scope {
    /// Scopes granted at sign-in. Banned users get none.
    pub fn for_user(is_banned: bool) -> Vec<Scope> {
        if is_banned {
            Vec::new()
        } else {
            vec![Scope::Shards, Scope::AiToolkit]
        }
    }
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,      // user ID
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub kind: TokenKind,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banned_users_get_no_scopes() {
        assert!(Scope::for_user(true).is_empty());
        assert_eq!(Scope::for_user(false), vec![Scope::Shards, Scope::AiToolkit]);
    }

    #[test]
    fn scopes_serialize_snake_case() {
        let json = serde_json::to_string(&Scope::AiToolkit).unwrap();
        assert_eq!(json, "\"ai_toolkit\"");
    }
}
