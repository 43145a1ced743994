// Handler semantics over the real router: auth flow, redirects, the
// silent non-author edit, the comment-discard quirk, and feed scoping.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use lenta::app_state::AppState;
use lenta::config::{CacheConfig, Config, DatabaseConfig, MediaConfig, ServerConfig};
use lenta::database::Database;
use lenta::handlers;

struct TestApp {
    router: Router,
    db: Arc<Database>,
    _media: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let db = Arc::new(Database::in_memory().await.unwrap());
    db.init().await.unwrap();
    let media = tempfile::tempdir().unwrap();
    let config = Config {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        media: MediaConfig {
            root: media.path().to_str().unwrap().to_string(),
        },
        cache: CacheConfig {
            capacity: 16,
            page_ttl_secs: 900,
        },
    };
    let state = AppState::with_database(db.clone(), config);
    TestApp {
        router: handlers::router(state),
        db,
        _media: media,
    }
}

fn form_post(uri: &str, cookie: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie.to_string());
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Registers a user and returns the session cookie pair (`session=...`).
async fn signup(app: &TestApp, username: &str) -> String {
    let body = format!(
        "username={}&email={}%40example.com&password=password123",
        username, username
    );
    let response = send(app, form_post("/signup", None, body)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("signup must set a session cookie")
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_signup_create_and_profile_feed() {
    let app = test_app().await;
    let cookie = signup(&app, "alice").await;

    let response = send(
        &app,
        form_post("/create", Some(&cookie), "text=hello+world".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice");

    let response = send(&app, get("/profile/alice", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["post_count"], 1);
    assert_eq!(body["page"]["items"][0]["text"], "hello world");
    assert_eq!(body["author"]["username"], "alice");
    // The password hash must never leak into responses.
    assert!(body["author"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_create_requires_auth() {
    let app = test_app().await;
    let response = send(&app, form_post("/create", None, "text=nope".to_string())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_rejects_empty_text() {
    let app = test_app().await;
    let cookie = signup(&app, "alice").await;
    let response = send(
        &app,
        form_post("/create", Some(&cookie), "text=++".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_author_edit_redirects_without_change() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let bob_cookie = signup(&app, "bob").await;

    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    let post = app
        .db
        .create_post(alice.id, "original text", None, None)
        .await
        .unwrap();

    let response = send(
        &app,
        form_post(
            &format!("/posts/{}/edit", post.id),
            Some(&bob_cookie),
            "text=hijacked".to_string(),
        ),
    )
    .await;
    // Silent redirect to the detail page, no error surfaced.
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}", post.id));

    let unchanged = app.db.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(unchanged.text, "original text");
}

#[tokio::test]
async fn test_author_edit_applies() {
    let app = test_app().await;
    let cookie = signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    let post = app
        .db
        .create_post(alice.id, "first draft", None, None)
        .await
        .unwrap();

    let response = send(
        &app,
        form_post(
            &format!("/posts/{}/edit", post.id),
            Some(&cookie),
            "text=second+draft".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let edited = app.db.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(edited.text, "second draft");
    assert_eq!(edited.created, post.created);
}

#[tokio::test]
async fn test_comment_valid_and_silently_dropped() {
    let app = test_app().await;
    let cookie = signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    let post = app
        .db
        .create_post(alice.id, "discuss", None, None)
        .await
        .unwrap();

    let response = send(
        &app,
        form_post(
            &format!("/posts/{}/comment", post.id),
            Some(&cookie),
            "text=nice+post".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{}", post.id));
    assert_eq!(app.db.comments_for_post(post.id).await.unwrap().len(), 1);

    // Over-long comment: still a redirect, but nothing is persisted.
    let long = format!("text={}", "x".repeat(501));
    let response = send(
        &app,
        form_post(&format!("/posts/{}/comment", post.id), Some(&cookie), long),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.db.comments_for_post(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_post_detail_includes_comments_and_count() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    let post = app.db.create_post(alice.id, "one", None, None).await.unwrap();
    app.db.create_post(alice.id, "two", None, None).await.unwrap();
    app.db
        .create_comment(post.id, alice.id, "self-reply")
        .await
        .unwrap();

    let response = send(&app, get(&format!("/posts/{}", post.id), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["post"]["text"], "one");
    assert_eq!(body["author_post_count"], 2);
    assert_eq!(body["comments"][0]["text"], "self-reply");
}

#[tokio::test]
async fn test_post_detail_404() {
    let app = test_app().await;
    let response = send(&app, get("/posts/999", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_feed_scoping_over_http() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    let group = app.db.create_group("G1", "g-one", "").await.unwrap();
    app.db.create_group("G2", "g-two", "").await.unwrap();
    app.db
        .create_post(alice.id, "in g-one", Some(group.id), None)
        .await
        .unwrap();

    let body = json_body(send(&app, get("/group/g-one", None)).await).await;
    assert_eq!(body["page"]["items"][0]["text"], "in g-one");
    assert_eq!(body["group"]["slug"], "g-one");

    let body = json_body(send(&app, get("/group/g-two", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 0);

    let response = send(&app, get("/group/missing", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_update_forbidden_for_other_user() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let bob_cookie = signup(&app, "bob").await;

    let response = send(
        &app,
        form_post(
            "/profile/alice/update",
            Some(&bob_cookie),
            "username=alice&email=alice%40example.com".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_update_by_owner() {
    let app = test_app().await;
    let cookie = signup(&app, "alice").await;

    let response = send(
        &app,
        form_post(
            "/profile/alice/update",
            Some(&cookie),
            "username=alice2&email=alice%40example.com&first_name=Alice".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/alice2");

    let renamed = app.db.get_user_by_username("alice2").await.unwrap().unwrap();
    assert_eq!(renamed.first_name, "Alice");
    assert!(app
        .db
        .get_user_by_username("alice")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_follow_unfollow_and_conflict() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let bob_cookie = signup(&app, "bob").await;

    let response = send(
        &app,
        form_post("/profile/alice/follow", Some(&bob_cookie), String::new()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = send(
        &app,
        form_post("/profile/alice/follow", Some(&bob_cookie), String::new()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The follow feed now carries alice's posts.
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    app.db
        .create_post(alice.id, "for my followers", None, None)
        .await
        .unwrap();
    let body = json_body(send(&app, get("/follow", Some(&bob_cookie))).await).await;
    assert_eq!(body["page"]["items"][0]["text"], "for my followers");

    let response = send(
        &app,
        form_post("/profile/alice/unfollow", Some(&bob_cookie), String::new()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let body = json_body(send(&app, get("/follow", Some(&bob_cookie))).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_login_logout_roundtrip() {
    let app = test_app().await;
    signup(&app, "alice").await;

    let response = send(
        &app,
        form_post(
            "/auth/login",
            None,
            "username=alice&password=password123".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = send(
        &app,
        form_post(
            "/auth/login",
            None,
            "username=alice&password=wrong-password".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, form_post("/auth/logout", Some(&cookie), String::new())).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // The revoked session no longer authenticates.
    let response = send(
        &app,
        form_post("/create", Some(&cookie), "text=ghost".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_validation_and_duplicates() {
    let app = test_app().await;
    signup(&app, "alice").await;

    // Duplicate username.
    let response = send(
        &app,
        form_post(
            "/signup",
            None,
            "username=alice&email=dup%40example.com&password=password123".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Short password.
    let response = send(
        &app,
        form_post(
            "/signup",
            None,
            "username=carol&email=carol%40example.com&password=short".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Bad username characters.
    let response = send(
        &app,
        form_post(
            "/signup",
            None,
            "username=not+ok&email=carol%40example.com&password=password123".to_string(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_index_page_is_cached() {
    let app = test_app().await;

    let body = json_body(send(&app, get("/", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 0);

    signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    app.db
        .create_post(alice.id, "too fresh for the cache", None, None)
        .await
        .unwrap();

    // Same URL within the TTL: the cached (stale) page is served.
    let body = json_body(send(&app, get("/", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 0);

    // A different URL misses the cache and sees current data.
    let body = json_body(send(&app, get("/?page=1", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_pagination_over_http() {
    let app = test_app().await;
    signup(&app, "alice").await;
    let alice = app.db.get_user_by_username("alice").await.unwrap().unwrap();
    for i in 0..13 {
        app.db
            .create_post(alice.id, &format!("post {}", i), None, None)
            .await
            .unwrap();
    }

    let body = json_body(send(&app, get("/profile/alice?page=1", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 10);
    assert_eq!(body["page"]["num_pages"], 2);
    assert_eq!(body["page"]["has_next"], true);

    let body = json_body(send(&app, get("/profile/alice?page=2", None)).await).await;
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 3);
    assert_eq!(body["page"]["has_previous"], true);

    // Out-of-range page clamps to the last page.
    let body = json_body(send(&app, get("/profile/alice?page=42", None)).await).await;
    assert_eq!(body["page"]["number"], 2);
    assert_eq!(body["page"]["items"].as_array().unwrap().len(), 3);
}
