pub mod dto;
pub mod handlers;
mod images;
mod repo;
pub mod repo_types;
pub mod slug;

pub use handlers::ensure_owner;
pub use repo_types::{Shard, ShardCard, ShardDetail};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
