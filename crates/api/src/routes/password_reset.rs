//! Password reset round trip
//!
//! 1. The user asks for a reset; if the email is known, a link
//!    `PUBLIC_URL/reset-password?email=<encrypted>` is signed and mailed.
//! 2. Opening the link re-verifies it against `PUBLIC_URL` and decrypts the
//!    identity before the form is shown.
//! 3. Submitting the form sends the link parameters back; they are verified
//!    and decrypted again before the password changes.

use axum::{
    extract::{OriginalUri, State},
    response::{Html, Redirect},
    Form, Json,
};
use serde::Deserialize;
use std::time::Duration;
use storefront_shared::{with_deadline, StoreError, UserId};
use tokio::time::Instant;
use url::Url;

use super::{
    api_auth::MessageResponse,
    web::{page, take_flash},
};
use crate::{
    auth::{hash_password, signed_link::SIGNATURE_PARAM, signed_link::TIMESTAMP_PARAM, validate_password, Session, SessionValue, LOGIN_PATH},
    error::{ApiError, ApiResult},
    state::AppState,
};

pub const RESET_PATH: &str = "/reset-password";
const EMAIL_PARAM: &str = "email";

/// Known and unknown emails take at least this long to answer
pub const MIN_RESPONSE_TIME: Duration = Duration::from_millis(500);

const REQUEST_ACCEPTED: &str =
    "If that email address belongs to an account, a reset link is on its way";

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Parameters of a signed reset link plus the new password
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub timestamp: String,
    pub signature: String,
    pub password: String,
}

/// A verified reset link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTarget {
    /// Identity as it appears in the link
    pub encrypted_email: String,
    pub email: String,
    pub timestamp: String,
    pub signature: String,
}

/// Build the signed reset link for `email`
pub fn reset_link_for(state: &AppState, email: &str) -> ApiResult<String> {
    let encrypted = state.encryptor.encrypt(email).map_err(|e| {
        tracing::error!(error = %e, "Failed to encrypt reset identity");
        ApiError::Internal
    })?;

    let raw = format!("{}{RESET_PATH}?{EMAIL_PARAM}={encrypted}", state.config.public_url);
    state.signer.sign(&raw).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign reset link");
        ApiError::Internal
    })
}

/// Verify a presented reset link (path and query) and recover its identity.
///
/// Every failure is `InvalidLink`: tampered, expired and undecryptable links
/// look the same to the client.
pub fn open_reset_link(state: &AppState, path_and_query: &str) -> ApiResult<ResetTarget> {
    let presented = format!("{}{path_and_query}", state.config.public_url);
    if !state.signer.verify(&presented) {
        return Err(ApiError::InvalidLink);
    }

    let url = Url::parse(&presented).map_err(|_| ApiError::InvalidLink)?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .ok_or(ApiError::InvalidLink)
    };
    let encrypted_email = param(EMAIL_PARAM)?;
    let timestamp = param(TIMESTAMP_PARAM)?;
    let signature = param(SIGNATURE_PARAM)?;

    let email = state.encryptor.decrypt(&encrypted_email).map_err(|e| {
        tracing::warn!(error = %e, "Signed reset link carried an undecryptable identity");
        ApiError::InvalidLink
    })?;

    Ok(ResetTarget {
        encrypted_email,
        email,
        timestamp,
        signature,
    })
}

async fn request_reset(state: &AppState, email: &str) -> ApiResult<()> {
    let start = Instant::now();
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("email is required".to_string()));
    }

    let outcome = match with_deadline(state.config.db_timeout, state.users.get_user_by_email(email)).await {
        Ok(user) => reset_link_for(state, &user.email).map(|link| {
            tracing::info!(user_id = %user.id, "Password reset requested");
            state.mailer.spawn_password_reset(user.email, link);
        }),
        Err(StoreError::NotFound) => {
            tracing::debug!("Password reset requested for unknown email");
            Ok(())
        }
        Err(e) => Err(ApiError::from(e)),
    };

    let elapsed = start.elapsed();
    if elapsed < MIN_RESPONSE_TIME {
        tokio::time::sleep(MIN_RESPONSE_TIME - elapsed).await;
    }
    outcome
}

async fn apply_reset(state: &AppState, req: &ResetPasswordRequest) -> ApiResult<UserId> {
    let path = format!(
        "{RESET_PATH}?{EMAIL_PARAM}={}&{TIMESTAMP_PARAM}={}&{SIGNATURE_PARAM}={}",
        req.email, req.timestamp, req.signature
    );
    let target = open_reset_link(state, &path)?;

    validate_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let user = match with_deadline(state.config.db_timeout, state.users.get_user_by_email(&target.email)).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(ApiError::InvalidLink),
        Err(e) => return Err(e.into()),
    };

    let password = req.password.clone();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::Internal
        })?;

    with_deadline(state.config.db_timeout, state.users.update_password(user.id, &hash)).await?;

    tracing::info!(user_id = %user.id, "Password reset completed");
    state.mailer.spawn_password_changed(user.email);
    Ok(user.id)
}

/// GET /forgot-password
pub async fn forgot_password_page(session: Session) -> Html<String> {
    let flash = take_flash(&session).await;
    Html(page(
        "Forgot Password",
        &format!(
            r#"{flash}
<form method="post" action="/forgot-password">
    <label>Email <input type="email" name="email" required></label>
    <button type="submit">Send reset link</button>
</form>"#
        ),
    ))
}

/// POST /forgot-password
pub async fn forgot_password_form(
    State(state): State<AppState>,
    session: Session,
    Form(req): Form<ForgotPasswordRequest>,
) -> ApiResult<Redirect> {
    request_reset(&state, &req.email).await?;
    session.put(SessionValue::Flash(REQUEST_ACCEPTED.to_string())).await;
    Ok(Redirect::to("/forgot-password"))
}

/// POST /api/forgot-password
pub async fn forgot_password_api(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request_reset(&state, &req.email).await?;
    Ok(MessageResponse::ok(REQUEST_ACCEPTED))
}

/// GET /reset-password
pub async fn reset_password_page(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<Html<String>> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(RESET_PATH);
    let target = open_reset_link(&state, path_and_query)?;

    // Every embedded value is base64url, digits or hex by the time it verified
    Ok(Html(page(
        "Reset Password",
        &format!(
            r#"<form method="post" action="{RESET_PATH}">
    <input type="hidden" name="email" value="{}">
    <input type="hidden" name="timestamp" value="{}">
    <input type="hidden" name="signature" value="{}">
    <label>New password <input type="password" name="password" minlength="8" required></label>
    <button type="submit">Reset password</button>
</form>"#,
            target.encrypted_email, target.timestamp, target.signature
        ),
    )))
}

/// POST /reset-password
pub async fn reset_password_form(
    State(state): State<AppState>,
    session: Session,
    Form(req): Form<ResetPasswordRequest>,
) -> ApiResult<Redirect> {
    apply_reset(&state, &req).await?;
    session
        .put(SessionValue::Flash("Password changed, please log in".to_string()))
        .await;
    Ok(Redirect::to(LOGIN_PATH))
}

/// POST /api/reset-password
pub async fn reset_password_api(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    apply_reset(&state, &req).await?;
    Ok(MessageResponse::ok("password changed"))
}
