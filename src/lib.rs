pub mod ai;
pub mod analytics;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod pagination;
pub mod shards;
pub mod state;
pub mod storage;
pub mod users;
