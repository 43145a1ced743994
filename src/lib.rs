// Lenta - a small blog/social-posting service
//
// Users publish text posts (optionally with an image and a group tag),
// browse paginated feeds, comment on posts, and follow other authors.

pub mod app_state;
pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod pagination;

// Re-exports for convenience
pub use error::{AppError, AppResult};
