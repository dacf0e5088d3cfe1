//! HTTP routes

pub mod admin;
pub mod api_auth;
pub mod health;
pub mod password_reset;
pub mod web;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::{require_bearer, require_session, session_layer},
    security::security_headers_middleware,
    state::AppState,
    websocket::ws_handler,
};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Admin API (bearer token required)
    let admin_routes = Router::new()
        .route("/all-users/delete/:id", post(admin::delete_user))
        .route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            require_bearer,
        ));

    // JSON API under /api
    let api_routes = Router::new()
        .route("/authenticate", post(api_auth::authenticate))
        .route("/is-authenticated", post(api_auth::is_authenticated))
        .route("/forgot-password", post(password_reset::forgot_password_api))
        .route("/reset-password", post(password_reset::reset_password_api))
        .nest("/admin", admin_routes)
        .layer(cors_layer());

    // Web pages behind a logged-in session
    let protected_web_routes = Router::new()
        .route("/account", get(web::account))
        .route("/logout", get(web::logout))
        .route_layer(middleware::from_fn(require_session));

    // Web pages (cookie session on every request)
    let web_routes = Router::new()
        .route("/", get(web::home))
        .route("/login", get(web::login_page).post(web::login))
        .route(
            "/forgot-password",
            get(password_reset::forgot_password_page).post(password_reset::forgot_password_form),
        )
        .route(
            password_reset::RESET_PATH,
            get(password_reset::reset_password_page).post(password_reset::reset_password_form),
        )
        .merge(protected_web_routes)
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session_layer,
        ));

    Router::new()
        .merge(health_routes)
        .merge(web_routes)
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the JSON API: any http(s) origin, no credentials
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| o.starts_with("https://") || o.starts_with("http://"))
                .unwrap_or(false)
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .max_age(Duration::from_secs(300))
}
