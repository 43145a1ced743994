// Registration, sessions, profile updates, and follow edges.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Form,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::app_state::AppState;
use crate::auth::{self, AuthUser};
use crate::error::{AppError, AppResult};
use crate::media;
use crate::models::UserUpdate;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]{1,150}$").unwrap());

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_b64: Option<String>,
}

fn validate_username(username: &str) -> AppResult<()> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "username may only contain letters, digits and .@+-_".to_string(),
        ))
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    if email.contains('@') && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(AppError::Validation("invalid email address".to_string()))
    }
}

/// Creates the account and logs the new user straight in.
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    validate_username(&form.username)?;
    validate_email(&form.email)?;
    if form.password.chars().count() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = auth::hash_password(&form.password)?;
    let user = state
        .db
        .create_user(
            &form.username,
            &form.email,
            form.first_name.as_deref().unwrap_or(""),
            form.last_name.as_deref().unwrap_or(""),
            &password_hash,
        )
        .await?;
    info!(user_id = user.id, username = %user.username, "registered user");

    let token = state.sessions.create(user.id).await;
    Ok((
        AppendHeaders([(header::SET_COOKIE, auth::session_cookie(&token))]),
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let user = state
        .db
        .get_user_by_username(&form.username)
        .await?
        .filter(|u| auth::verify_password(&form.password, &u.password_hash))
        .ok_or_else(|| AppError::Unauthorized("invalid username or password".to_string()))?;

    let token = state.sessions.create(user.id).await;
    Ok((
        AppendHeaders([(header::SET_COOKIE, auth::session_cookie(&token))]),
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = auth::session_token(&headers) {
        state.sessions.revoke(&token).await;
    }
    Ok((
        AppendHeaders([(header::SET_COOKIE, auth::clear_session_cookie())]),
        Redirect::to("/"),
    )
        .into_response())
}

/// Only the owning user may edit their profile; unlike post edits this is
/// rejected outright rather than silently redirected.
pub async fn profile_update(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth: AuthUser,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    if auth.user.username != username {
        return Err(AppError::Forbidden(
            "you may only edit your own profile".to_string(),
        ));
    }

    validate_username(&form.username)?;
    validate_email(&form.email)?;

    let profile_picture = match form.avatar_b64.as_deref().map(str::trim).filter(|p| !p.is_empty())
    {
        Some(b64) => Some(media::save_base64_image(
            &state.config.media.root,
            "avatars",
            b64,
        )?),
        None => None,
    };

    let update = UserUpdate {
        username: form.username.clone(),
        email: form.email,
        first_name: form.first_name.unwrap_or_default(),
        last_name: form.last_name.unwrap_or_default(),
        profile_picture,
    };
    state.db.update_user(auth.user.id, &update).await?;

    Ok(Redirect::to(&format!("/profile/{}", form.username)).into_response())
}

pub async fn follow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth: AuthUser,
) -> AppResult<Response> {
    let target = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no user '{}'", username)))?;

    state.db.create_follow(auth.user.id, target.id).await?;
    info!(follower = %auth.user.username, author = %username, "follow created");
    Ok(Redirect::to(&format!("/profile/{}", username)).into_response())
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    auth: AuthUser,
) -> AppResult<Response> {
    let target = state
        .db
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no user '{}'", username)))?;

    state.db.delete_follow(auth.user.id, target.id).await?;
    Ok(Redirect::to(&format!("/profile/{}", username)).into_response())
}
