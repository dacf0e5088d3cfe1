//! Bearer token issuance and validation

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use storefront_shared::{BearerToken, TokenScope};

use crate::{
    auth::{verify_credentials, TokenAuthenticator},
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Envelope shared by the JSON endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub error: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            error: false,
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub error: bool,
    pub message: String,
    pub authentication_token: BearerToken,
}

/// POST /api/authenticate
pub async fn authenticate(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<Json<TokenResponse>> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("email and password are required".to_string()));
    }

    let user = verify_credentials(
        state.users.as_ref(),
        state.config.db_timeout,
        req.email.trim(),
        &req.password,
    )
    .await?;

    let token = TokenAuthenticator::generate_token(
        user.id,
        state.config.token_lifetime(),
        TokenScope::Authentication,
    );
    state.tokens.persist(&token, &user).await?;

    Ok(Json(TokenResponse {
        error: false,
        message: format!("token for {} created", user.email),
        authentication_token: token,
    }))
}

/// POST /api/is-authenticated
pub async fn is_authenticated(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let user = state.tokens.authenticate(&headers).await?;
    Ok(MessageResponse::ok(format!("authenticated user {}", user.email)))
}
