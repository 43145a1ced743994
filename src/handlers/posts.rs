// Post detail, creation, editing, and comments.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::media;
use crate::models::{Comment, Post};

pub const COMMENT_MAX_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub text: String,
    pub group_id: Option<i64>,
    /// Base64-encoded image payload, stored under the media root.
    pub image_b64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Serialize)]
struct PostDetailBody {
    post: Post,
    /// Total number of posts by this post's author.
    author_post_count: i64,
    comments: Vec<Comment>,
}

pub async fn post_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<impl Serialize>> {
    let post = state
        .db
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no post with id {}", id)))?;
    let author_post_count = state.db.count_posts_by_author(post.author_id).await?;
    let comments = state.db.comments_for_post(post.id).await?;
    Ok(Json(PostDetailBody {
        post,
        author_post_count,
        comments,
    }))
}

pub async fn post_create(
    State(state): State<AppState>,
    auth: AuthUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let text = form.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    let group_id = resolve_group(&state, form.group_id).await?;
    let image = store_image(&state, form.image_b64.as_deref())?;

    let post = state
        .db
        .create_post(auth.user.id, text, group_id, image.as_deref())
        .await?;
    info!(post_id = post.id, author = %auth.user.username, "created post");

    Ok(Redirect::to(&format!("/profile/{}", auth.user.username)).into_response())
}

/// Only the author may edit; anyone else is bounced back to the detail
/// page with no change and no error.
pub async fn post_edit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    auth: AuthUser,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let post = state
        .db
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no post with id {}", id)))?;

    if post.author_id != auth.user.id {
        warn!(
            post_id = id,
            user = %auth.user.username,
            "non-author edit attempt, redirecting"
        );
        return Ok(Redirect::to(&format!("/posts/{}", id)).into_response());
    }

    let text = form.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    let group_id = resolve_group(&state, form.group_id).await?;
    let image = store_image(&state, form.image_b64.as_deref())?;

    state
        .db
        .update_post(id, text, group_id, image.as_deref())
        .await?;
    Ok(Redirect::to(&format!("/posts/{}", id)).into_response())
}

/// Persists a valid comment and redirects to the detail page either way;
/// an invalid comment is dropped with only a log line. This mirrors the
/// observed behavior of the system being reimplemented.
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    auth: AuthUser,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let post = state
        .db
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no post with id {}", id)))?;

    let text = form.text.trim();
    if text.is_empty() || text.chars().count() > COMMENT_MAX_CHARS {
        warn!(post_id = id, "discarding invalid comment");
    } else {
        state.db.create_comment(post.id, auth.user.id, text).await?;
    }

    Ok(Redirect::to(&format!("/posts/{}", id)).into_response())
}

async fn resolve_group(state: &AppState, group_id: Option<i64>) -> AppResult<Option<i64>> {
    match group_id {
        Some(id) => {
            state
                .db
                .get_group(id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("no group with id {}", id)))?;
            Ok(Some(id))
        }
        None => Ok(None),
    }
}

fn store_image(state: &AppState, payload: Option<&str>) -> AppResult<Option<String>> {
    match payload.map(str::trim).filter(|p| !p.is_empty()) {
        Some(b64) => Ok(Some(media::save_base64_image(
            &state.config.media.root,
            "posts",
            b64,
        )?)),
        None => Ok(None),
    }
}
