//! Stateful bearer tokens for the admin API
//!
//! Tokens are random, fixed-length identifiers persisted (hashed) through a
//! [`TokenStore`]. Validation happens on every request: header shape and
//! token length are checked locally before the store is consulted, and the
//! store lookup itself runs under a hard deadline.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::sync::Arc;
use std::time::Duration;
use storefront_shared::{with_deadline, BearerToken, StoreError, TokenScope, TokenStore, User, UserId};
use time::OffsetDateTime;

use crate::error::ApiError;

/// Length of every bearer token identifier
pub const TOKEN_LENGTH: usize = 26;

/// Issues and validates bearer tokens
#[derive(Clone)]
pub struct TokenAuthenticator {
    store: Arc<dyn TokenStore>,
    timeout: Duration,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn TokenStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Generate a fresh token. Nothing is persisted.
    pub fn generate_token(user_id: UserId, lifetime: time::Duration, scope: TokenScope) -> BearerToken {
        let plaintext: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let now = OffsetDateTime::now_utc();

        BearerToken {
            hash: BearerToken::hash_plaintext(&plaintext),
            plaintext,
            user_id,
            scope,
            created_at: now,
            expiry: now + lifetime,
        }
    }

    /// Persist a token for `user`. The token must not be handed out unless
    /// this succeeds.
    pub async fn persist(&self, token: &BearerToken, user: &User) -> Result<(), StoreError> {
        with_deadline(self.timeout, self.store.insert_token(token, user)).await?;

        tracing::info!(
            user_id = %user.id,
            scope = token.scope.as_str(),
            expires_at = %token.expiry,
            "Bearer token issued"
        );
        Ok(())
    }

    /// Resolve the user behind the request's `Authorization: Bearer` header
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let token = extract_bearer(headers)?;

        match with_deadline(
            self.timeout,
            self.store.get_user_for_token(token, TokenScope::Authentication),
        )
        .await
        {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(AuthError::UnknownToken),
            Err(e) => Err(AuthError::Store(e)),
        }
    }
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// Exactly two space-separated parts are accepted, the first being the
/// literal `Bearer`, and the token must be [`TOKEN_LENGTH`] bytes.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(AuthError::MalformedHeader);
    }

    let token = parts[1];
    if token.len() != TOKEN_LENGTH {
        return Err(AuthError::WrongLength);
    }

    Ok(token)
}

/// Bearer authentication failures.
///
/// The variants exist for logging only; callers see a single
/// `InvalidCredentials` for every one of them except store outages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No authorization header received")]
    MissingHeader,
    #[error("Malformed authorization header")]
    MalformedHeader,
    #[error("Authentication token wrong size")]
    WrongLength,
    #[error("No matching user found")]
    UnknownToken,
    #[error("Token store error: {0}")]
    Store(StoreError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(e) if e.is_transient() => ApiError::from(e),
            other => {
                tracing::debug!(reason = %other, "Bearer authentication rejected");
                ApiError::InvalidCredentials
            }
        }
    }
}
