use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::{
    claims::{Scope, TokenKind},
    jwt::JwtKeys,
};
use crate::error::ApiError;

/// Authenticated caller, resolved from the `Authorization: Bearer` access token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub scopes: Vec<Scope>,
}

impl AuthContext {
    pub fn require(&self, scope: Scope) -> Result<(), ApiError> {
        if self.scopes.contains(&scope) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Account is not allowed to do this"))
        }
    }

    pub fn is(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}

/// Present when the request carries a bearer token; anonymous otherwise.
#[derive(Debug, Clone)]
pub struct MaybeAuth(pub Option<AuthContext>);

impl MaybeAuth {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|a| a.user_id)
    }
}

fn bearer(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header"))?;
    Ok(Some(token))
}

fn resolve(keys: &JwtKeys, token: &str) -> Result<AuthContext, ApiError> {
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(_) => {
            warn!("invalid or expired token");
            return Err(ApiError::unauthorized("Invalid or expired token"));
        }
    };

    if claims.kind != TokenKind::Access {
        return Err(ApiError::unauthorized("Access token required"));
    }

    Ok(AuthContext {
        user_id: claims.sub,
        scopes: claims.scopes,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
        resolve(&JwtKeys::from_ref(state), token)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer(parts)? {
            Some(token) => Ok(MaybeAuth(Some(resolve(&JwtKeys::from_ref(state), token)?))),
            None => Ok(MaybeAuth(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::http::{Request, StatusCode};

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "extractor-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        })
    }

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(v) = auth {
            req = req.header("authorization", v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn access_token_yields_context_with_scopes() {
        let k = keys();
        let user = Uuid::new_v4();
        let token = k.sign_access(user, vec![Scope::AiToolkit]).unwrap();
        let mut p = parts(Some(&format!("Bearer {token}")));
        let ctx = AuthContext::from_request_parts(&mut p, &k).await.unwrap();
        assert_eq!(ctx.user_id, user);
        assert!(ctx.require(Scope::AiToolkit).is_ok());
        assert_eq!(
            ctx.require(Scope::Shards).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn missing_header_is_401_but_anonymous_for_maybe() {
        let k = keys();
        let err = AuthContext::from_request_parts(&mut parts(None), &k)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let anon = MaybeAuth::from_request_parts(&mut parts(None), &k).await.unwrap();
        assert!(anon.0.is_none());
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let k = keys();
        let token = k.sign_refresh(Uuid::new_v4()).unwrap();
        let mut p = parts(Some(&format!("Bearer {token}")));
        let err = AuthContext::from_request_parts(&mut p, &k).await.unwrap_err();
        assert_eq!(err.to_string(), "Access token required");
    }

    #[tokio::test]
    async fn garbage_token_rejected_even_when_optional() {
        let k = keys();
        let mut p = parts(Some("Bearer not-a-jwt"));
        let err = MaybeAuth::from_request_parts(&mut p, &k).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
