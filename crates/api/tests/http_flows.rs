//! End-to-end request flows against in-memory stores

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use storefront_api::{
    auth::{hash_password, MemorySessionBackend},
    routes::{
        create_router,
        password_reset::{reset_link_for, MIN_RESPONSE_TIME},
    },
    websocket::{Connection, NotificationHub, WsResponse},
    AppState, Config,
};
use storefront_shared::{MemoryStore, User, UserStore};
use tokio::sync::mpsc;
use tower::ServiceExt;
use url::Url;

const PUBLIC_URL: &str = "http://localhost:4000";
const PASSWORD: &str = "correct horse battery";

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        public_url: PUBLIC_URL.to_string(),
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        db_timeout: Duration::from_secs(3),
        redis_url: None,
        session_ttl_hours: 24,
        cookie_secure: false,
        signing_secret: "test-signing-secret-must-be-at-least-32-chars".to_string(),
        encryption_key: "a1b2c3d4e5f6789012345678901234567890abcdef1234567890abcdef123456"
            .to_string(),
        token_ttl_hours: 24,
        reset_link_ttl_minutes: 60,
        ws_allowed_origins: Vec::new(),
        resend_api_key: String::new(),
        email_from: "Storefront <noreply@example.com>".to_string(),
        email_api_url: "http://127.0.0.1:9".to_string(),
    }
}

struct TestApp {
    state: AppState,
    store: Arc<MemoryStore>,
    admin: User,
}

impl TestApp {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let hash = hash_password(PASSWORD).unwrap();
        let admin = store
            .insert_user("Admin", "User", "admin@example.com", &hash)
            .await;

        let state = AppState::new(
            test_config(),
            store.clone(),
            store.clone(),
            Arc::new(MemorySessionBackend::new()),
            NotificationHub::new(),
        )
        .unwrap();

        Self { state, store, admin }
    }

    fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn bearer_token(&self) -> String {
        let response = self
            .post_json(
                "/api/authenticate",
                json!({"email": "admin@example.com", "password": PASSWORD}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

/// `session=<id>` from the response's Set-Cookie header
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn login_form(cookie: Option<&str>, password: &str) -> Request<Body> {
    let mut builder = Request::post("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(format!(
            "email=admin%40example.com&password={}",
            password.replace(' ', "+")
        )))
        .unwrap()
}

// =============================================================================
// Bearer tokens
// =============================================================================

#[tokio::test]
async fn test_authenticate_issues_usable_token() {
    let app = TestApp::new().await;
    let token = app.bearer_token().await;
    assert_eq!(token.len(), 26);
    assert_eq!(app.store.token_count().await, 1);

    let response = app
        .send(
            Request::post("/api/is-authenticated")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"], false);
    assert_eq!(body["message"], "authenticated user admin@example.com");
}

#[tokio::test]
async fn test_credential_failures_look_identical() {
    let app = TestApp::new().await;

    let wrong_password = app
        .post_json(
            "/api/authenticate",
            json!({"email": "admin@example.com", "password": "not the password"}),
        )
        .await;
    let unknown_email = app
        .post_json(
            "/api/authenticate",
            json!({"email": "nobody@example.com", "password": PASSWORD}),
        )
        .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong_password).await, body_json(unknown_email).await);
    assert_eq!(app.store.token_count().await, 0);
}

#[tokio::test]
async fn test_bad_bearer_headers_are_invalid_credentials() {
    let app = TestApp::new().await;

    for header_value in [None, Some("Bearer short"), Some("Token ABCDEFGHIJKLMNOPQRSTUVWXYZ"), Some("Bearer ABCDEFGHIJKLMNOPQRSTUVWXYZ")] {
        let mut builder = Request::post("/api/is-authenticated");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = app.send(builder.body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header_value:?}");
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }
}

// =============================================================================
// Web sessions
// =============================================================================

#[tokio::test]
async fn test_protected_page_redirects_anonymous_visitor() {
    let app = TestApp::new().await;
    let response = app
        .send(Request::get("/account").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_login_rotates_session_and_logout_invalidates_it() {
    let app = TestApp::new().await;

    // Anonymous visit hands out a session cookie
    let page = app
        .send(Request::get("/login").body(Body::empty()).unwrap())
        .await;
    let anonymous = session_cookie(&page).unwrap();

    // Logging in rotates it
    let login = app.send(login_form(Some(&anonymous), PASSWORD)).await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&login), "/");
    let logged_in = session_cookie(&login).unwrap();
    assert_ne!(logged_in, anonymous);

    let account = app.send(get_with_cookie("/account", &logged_in)).await;
    assert_eq!(account.status(), StatusCode::OK);
    assert!(body_text(account)
        .await
        .contains(&format!("User #{}", app.admin.id)));

    // Logging out rotates again and the old id stops working
    let logout = app.send(get_with_cookie("/logout", &logged_in)).await;
    assert_eq!(logout.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&logout), "/login");
    let after_logout = session_cookie(&logout).unwrap();
    assert_ne!(after_logout, logged_in);

    let stale = app.send(get_with_cookie("/account", &logged_in)).await;
    assert_eq!(stale.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&stale), "/login");
}

#[tokio::test]
async fn test_failed_login_returns_to_login_with_generic_message() {
    let app = TestApp::new().await;

    let login = app.send(login_form(None, "wrong password")).await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&login), "/login");
    let cookie = session_cookie(&login).unwrap();

    let page = app.send(get_with_cookie("/login", &cookie)).await;
    assert!(body_text(page).await.contains("Invalid login credentials"));

    // Flash is shown once
    let again = app.send(get_with_cookie("/login", &cookie)).await;
    assert!(!body_text(again).await.contains("Invalid login credentials"));
}

// =============================================================================
// Password reset
// =============================================================================

fn link_params(link: &str) -> (String, String, String, String) {
    let url = Url::parse(link).unwrap();
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    };
    let path_and_query = link.strip_prefix(PUBLIC_URL).unwrap().to_string();
    (path_and_query, param("email"), param("timestamp"), param("signature"))
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = TestApp::new().await;

    let known = app
        .post_json("/api/forgot-password", json!({"email": "admin@example.com"}))
        .await;
    let unknown = app
        .post_json("/api/forgot-password", json!({"email": "nobody@example.com"}))
        .await;

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(body_json(known).await, body_json(unknown).await);
}

#[tokio::test(start_paused = true)]
async fn test_forgot_password_answers_no_faster_than_floor() {
    let app = TestApp::new().await;

    for email in ["admin@example.com", "nobody@example.com"] {
        let started = tokio::time::Instant::now();
        let response = app
            .post_json("/api/forgot-password", json!({ "email": email }))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            started.elapsed() >= MIN_RESPONSE_TIME,
            "{email} answered after {:?}",
            started.elapsed()
        );
    }
}

#[tokio::test]
async fn test_reset_link_round_trip_changes_password() {
    let app = TestApp::new().await;
    let link = reset_link_for(&app.state, "admin@example.com").unwrap();
    assert!(link.starts_with("http://localhost:4000/reset-password?email="));
    assert!(!link.contains("admin%40example.com"));
    let (path_and_query, email, timestamp, signature) = link_params(&link);

    let page = app
        .send(Request::get(path_and_query.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_text(page).await;
    assert!(html.contains(&email));
    assert!(html.contains(&signature));

    let response = app
        .post_json(
            "/api/reset-password",
            json!({
                "email": email,
                "timestamp": timestamp,
                "signature": signature,
                "password": "a brand new password"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app.store.get_user_by_email("admin@example.com").await.unwrap();
    assert!(storefront_api::auth::verify_password("a brand new password", &user.password_hash).unwrap());
}

#[tokio::test]
async fn test_tampered_reset_link_is_rejected() {
    let app = TestApp::new().await;
    let link = reset_link_for(&app.state, "admin@example.com").unwrap();
    let (path_and_query, email, timestamp, signature) = link_params(&link);

    let tampered = path_and_query.replace(&timestamp, &(timestamp.parse::<i64>().unwrap() + 3600).to_string());
    let response = app
        .send(Request::get(tampered.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], "INVALID_LINK");

    let unsigned = app
        .send(Request::get("/reset-password?email=abc").body(Body::empty()).unwrap())
        .await;
    assert_eq!(unsigned.status(), StatusCode::FORBIDDEN);

    // Submitting with a forged signature changes nothing
    let forged = app
        .post_json(
            "/api/reset-password",
            json!({
                "email": email,
                "timestamp": timestamp,
                "signature": "0".repeat(64),
                "password": "a brand new password"
            }),
        )
        .await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);
    let user = app.store.get_user_by_email("admin@example.com").await.unwrap();
    assert!(storefront_api::auth::verify_password(PASSWORD, &user.password_hash).unwrap());
    assert_eq!(signature.len(), 64);
}

#[tokio::test]
async fn test_signed_link_with_corrupt_identity_is_rejected() {
    let app = TestApp::new().await;
    let link = app
        .state
        .signer
        .sign(&format!("{PUBLIC_URL}/reset-password?email=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"))
        .unwrap();
    let (path_and_query, ..) = link_params(&link);

    let response = app
        .send(Request::get(path_and_query.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reset_rejects_short_password() {
    let app = TestApp::new().await;
    let link = reset_link_for(&app.state, "admin@example.com").unwrap();
    let (_, email, timestamp, signature) = link_params(&link);

    let response = app
        .post_json(
            "/api/reset-password",
            json!({"email": email, "timestamp": timestamp, "signature": signature, "password": "short"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
}

// =============================================================================
// Admin API and notifications
// =============================================================================

#[tokio::test]
async fn test_admin_delete_requires_bearer_and_notifies_clients() {
    let app = TestApp::new().await;
    let customer = app
        .store
        .insert_user("Jane", "Doe", "jane@example.com", "unused-hash")
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    app.state.hub.register(Connection::new("", tx)).await.unwrap();
    assert_eq!(rx.recv().await, Some(WsResponse::greeting()));
    let dispatcher = app.state.hub.spawn_dispatcher().await.unwrap();

    let uri = format!("/api/admin/all-users/delete/{}", customer.id);
    let anonymous = app
        .send(Request::post(uri.as_str()).body(Body::empty()).unwrap())
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let token = app.bearer_token().await;
    let response = app
        .send(
            Request::post(uri.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.get_user_by_email("jane@example.com").await.is_err());

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(WsResponse::logout(customer.id.0)));

    app.state.hub.shutdown().await;
    dispatcher.await.unwrap();
}

// =============================================================================
// Ambient surface
// =============================================================================

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = TestApp::new().await;

    for path in ["/health/live", "/health/ready"] {
        let response = app.send(Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }
}

#[tokio::test]
async fn test_api_cors_preflight() {
    let app = TestApp::new().await;
    let response = app
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/authenticate")
                .header(header::ORIGIN, "https://admin.example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "https://admin.example.com"
    );
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(),
        "300"
    );
}
