// Paginated post listings: global, per-group, per-author, and the
// followed-authors feed.

use axum::{
    extract::{Path, Query, State},
    http::{header, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::{FeedFilter, Group, Post, User};
use crate::pagination::{page_offset, resolve_page, Page, POSTS_PER_PAGE};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Raw `page` parameter; anything unparsable falls back to page 1.
    pub page: Option<String>,
}

#[derive(Serialize)]
struct FeedBody {
    page: Page<Post>,
}

#[derive(Serialize)]
struct GroupFeedBody {
    group: Group,
    page: Page<Post>,
}

#[derive(Serialize)]
struct ProfileBody {
    author: User,
    post_count: i64,
    page: Page<Post>,
}

pub(crate) async fn feed_page(
    db: &Database,
    filter: FeedFilter,
    raw_page: Option<&str>,
) -> AppResult<Page<Post>> {
    let total = db.count_posts(filter).await?;
    let number = resolve_page(raw_page, total, POSTS_PER_PAGE);
    let items = db
        .list_posts(
            filter,
            POSTS_PER_PAGE as i64,
            page_offset(number, POSTS_PER_PAGE),
        )
        .await?;
    Ok(Page::new(items, number, total, POSTS_PER_PAGE))
}

/// Global feed. The rendered body is cached per URL for the configured
/// TTL (15 minutes by default), so a fresh post may not show up here
/// immediately.
pub async fn index(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let key = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    if let Some(body) = state.page_cache.get(&key).await {
        return Ok(cached_json(body));
    }

    let page = feed_page(&state.db, FeedFilter::All, query.page.as_deref()).await?;
    let body = serde_json::to_string(&FeedBody { page })
        .map_err(|e| AppError::Internal(format!("failed to serialize feed: {}", e)))?;
    state.page_cache.put(key, body.clone()).await;
    Ok(cached_json(body))
}

pub async fn group_list(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<impl Serialize>> {
    let group = state
        .db
        .get_group_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no group with slug '{}'", slug)))?;
    let page = feed_page(&state.db, FeedFilter::Group(group.id), query.page.as_deref()).await?;
    Ok(Json(GroupFeedBody { group, page }))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<impl Serialize>> {
    let author = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no user '{}'", username)))?;
    let page = feed_page(
        &state.db,
        FeedFilter::Author(author.id),
        query.page.as_deref(),
    )
    .await?;
    let post_count = page.total_items;
    Ok(Json(ProfileBody {
        author,
        post_count,
        page,
    }))
}

/// Posts by authors the requester follows.
pub async fn follow_index(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<impl Serialize>> {
    let page = feed_page(
        &state.db,
        FeedFilter::FollowedBy(auth.user.id),
        query.page.as_deref(),
    )
    .await?;
    Ok(Json(FeedBody { page }))
}

fn cached_json(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}
