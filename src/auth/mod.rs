use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod github;
pub mod handlers;
pub mod jwt;
mod repo;

pub use claims::Scope;
pub use extractors::{AuthContext, MaybeAuth};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
