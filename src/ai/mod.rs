pub mod credits;
pub mod dto;
pub mod handlers;
mod saves;
pub mod worker;

pub use credits::{CreditLedger, PgCreditLedger};
pub use worker::{AiWorker, HttpWorker};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
