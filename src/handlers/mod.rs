// HTTP surface. Listing pages render JSON; mutations take HTML forms and
// answer with redirects, keeping the original navigation flow.

pub mod feeds;
pub mod posts;
pub mod users;

use axum::{
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

use crate::app_state::AppState;

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "lenta",
        "timestamp": chrono::Utc::now().timestamp()
    }))
}

pub fn router(state: AppState) -> Router {
    let media_dir = ServeDir::new(&state.config.media.root);

    Router::new()
        .route("/", get(feeds::index))
        .route("/follow", get(feeds::follow_index))
        .route("/group/{slug}", get(feeds::group_list))
        .route("/profile/{username}", get(feeds::profile))
        .route("/posts/{id}", get(posts::post_detail))
        .route("/create", post(posts::post_create))
        .route("/posts/{id}/edit", post(posts::post_edit))
        .route("/posts/{id}/comment", post(posts::add_comment))
        .route("/signup", post(users::signup))
        .route("/auth/login", post(users::login))
        .route("/auth/logout", post(users::logout))
        .route("/profile/{username}/update", post(users::profile_update))
        .route("/profile/{username}/follow", post(users::follow))
        .route("/profile/{username}/unfollow", post(users::unfollow))
        .route("/api/health", get(health_check))
        .nest_service("/media", media_dir)
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
