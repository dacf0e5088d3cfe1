//! Credential verification and the session login/logout transitions

use std::sync::OnceLock;
use std::time::Duration;
use storefront_shared::{with_deadline, StoreError, User, UserId, UserStore};

use super::password::{hash_password, verify_password};
use super::sessions::{Session, SessionValue};
use crate::error::ApiError;

/// Check an email/password pair against the user store.
///
/// Unknown email and wrong password are indistinguishable to the caller, and
/// an unknown email still pays for one hash verification.
pub async fn verify_credentials(
    users: &dyn UserStore,
    timeout: Duration,
    email: &str,
    password: &str,
) -> Result<User, LoginError> {
    let user = match with_deadline(timeout, users.get_user_by_email(email)).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let _ = verify_password(password, decoy_hash());
            return Err(LoginError::UnknownEmail);
        }
        Err(e) => return Err(LoginError::Store(e)),
    };

    match verify_password(password, &user.password_hash) {
        Ok(true) => Ok(user),
        Ok(false) => Err(LoginError::WrongPassword),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
            Err(LoginError::WrongPassword)
        }
    }
}

/// Log the session in as the user behind `email`/`password`.
///
/// The session id is rotated before the user id is stored.
pub async fn login(
    session: &Session,
    users: &dyn UserStore,
    timeout: Duration,
    email: &str,
    password: &str,
) -> Result<UserId, LoginError> {
    let user = verify_credentials(users, timeout, email, password).await?;

    session.renew_token().await;
    session.put(SessionValue::UserId(user.id)).await;

    tracing::info!(user_id = %user.id, "Session login");
    Ok(user.id)
}

/// Destroy all session state, then rotate the id so nothing old stays valid
pub async fn logout(session: &Session) {
    let user_id = session.user_id().await;

    session.destroy().await;
    session.renew_token().await;

    if let Some(user_id) = user_id {
        tracing::info!(user_id = %user_id, "Session logout");
    }
}

fn decoy_hash() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| hash_password("decoy-password-never-matches").unwrap_or_default())
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("No user with that email")]
    UnknownEmail,
    #[error("Password mismatch")]
    WrongPassword,
    #[error("User store error: {0}")]
    Store(StoreError),
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Store(e) => ApiError::from(e),
            other => {
                tracing::debug!(reason = %other, "Login rejected");
                ApiError::InvalidCredentials
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sessions::{MemorySessionBackend, SessionKey, SessionManager};
    use axum::http::HeaderMap;
    use std::sync::Arc;
    use storefront_shared::MemoryStore;

    const TIMEOUT: Duration = Duration::from_secs(3);

    async fn store_with_user() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let hash = hash_password("correct horse battery").unwrap();
        let user = store.insert_user("Admin", "User", "admin@example.com", &hash).await;
        (store, user)
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let (store, user) = store_with_user().await;

        let found = verify_credentials(&store, TIMEOUT, "admin@example.com", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        assert!(matches!(
            verify_credentials(&store, TIMEOUT, "admin@example.com", "wrong").await,
            Err(LoginError::WrongPassword)
        ));
        assert!(matches!(
            verify_credentials(&store, TIMEOUT, "nobody@example.com", "correct horse battery").await,
            Err(LoginError::UnknownEmail)
        ));
    }

    #[test]
    fn test_credential_failures_are_indistinguishable() {
        let unknown = ApiError::from(LoginError::UnknownEmail);
        let wrong = ApiError::from(LoginError::WrongPassword);
        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert!(matches!(wrong, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_rotates_and_stores_user() {
        let (store, user) = store_with_user().await;
        let manager = SessionManager::new(
            Arc::new(MemorySessionBackend::new()),
            Duration::from_secs(3600),
            TIMEOUT,
            false,
        );
        let session = manager.load(&HeaderMap::new()).await.unwrap();
        let before = session.id().await;

        let id = login(&session, &store, TIMEOUT, "admin@example.com", "correct horse battery")
            .await
            .unwrap();

        assert_eq!(id, user.id);
        assert_ne!(session.id().await, before);
        assert_eq!(session.user_id().await, Some(user.id));
    }

    #[tokio::test]
    async fn test_failed_login_leaves_session_untouched() {
        let (store, _) = store_with_user().await;
        let manager = SessionManager::new(
            Arc::new(MemorySessionBackend::new()),
            Duration::from_secs(3600),
            TIMEOUT,
            false,
        );
        let session = manager.load(&HeaderMap::new()).await.unwrap();
        let before = session.id().await;

        assert!(login(&session, &store, TIMEOUT, "admin@example.com", "nope").await.is_err());
        assert_eq!(session.id().await, before);
        assert!(!session.exists(SessionKey::UserId).await);
    }

    #[tokio::test]
    async fn test_logout_clears_user() {
        let (store, _) = store_with_user().await;
        let manager = SessionManager::new(
            Arc::new(MemorySessionBackend::new()),
            Duration::from_secs(3600),
            TIMEOUT,
            false,
        );
        let session = manager.load(&HeaderMap::new()).await.unwrap();
        login(&session, &store, TIMEOUT, "admin@example.com", "correct horse battery")
            .await
            .unwrap();
        let logged_in_id = session.id().await;

        logout(&session).await;

        assert!(!session.exists(SessionKey::UserId).await);
        assert_ne!(session.id().await, logged_in_id);
    }
}
