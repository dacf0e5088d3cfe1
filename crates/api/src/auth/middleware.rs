//! Authentication middleware for the web and API surfaces

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use storefront_shared::User;

use super::sessions::{Session, SessionKey, SessionManager};
use super::tokens::TokenAuthenticator;
use crate::error::ApiError;

/// Where unauthenticated web requests are sent
pub const LOGIN_PATH: &str = "/login";

/// User resolved from a bearer token, available to admin handlers
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Load the request's session, run the handler, then commit the session and
/// emit a new cookie if the id changed.
pub async fn session_layer(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match manager.load(request.headers()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load session");
            return ApiError::ServiceUnavailable.into_response();
        }
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    match manager.commit(&session).await {
        Ok(Some(cookie)) => {
            response.headers_mut().append(SET_COOKIE, cookie);
            response
        }
        Ok(None) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to commit session");
            ApiError::ServiceUnavailable.into_response()
        }
    }
}

/// Gate a route on a logged-in session; everyone else goes to the login page
pub async fn require_session(session: Session, request: Request, next: Next) -> Response {
    if !session.exists(SessionKey::UserId).await {
        return Redirect::to(LOGIN_PATH).into_response();
    }
    next.run(request).await
}

/// Gate a route on a valid `Authorization: Bearer` token
pub async fn require_bearer(
    State(authenticator): State<TokenAuthenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticator.authenticate(request.headers()).await?;

    tracing::debug!(user_id = %user.id, path = %request.uri().path(), "Bearer token accepted");
    request.extensions_mut().insert(AuthUser(user));

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("Session requested on a route without the session layer");
            ApiError::Internal
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::InvalidCredentials)
    }
}
