//! Storage contracts consumed by the authentication core, plus the
//! PostgreSQL implementation used in production.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::types::{BearerToken, TokenScope, User, UserId};

/// Persists and resolves bearer tokens.
///
/// Expiry is enforced on lookup: `get_user_for_token` must never return the
/// owner of an expired token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &BearerToken, user: &User) -> Result<(), StoreError>;

    async fn get_user_for_token(
        &self,
        plaintext: &str,
        scope: TokenScope,
    ) -> Result<User, StoreError>;
}

/// Narrow view of the user table needed by login and password reset
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError>;

    async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError>;

    /// Cheap connectivity check for readiness
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed token and user store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: &BearerToken, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (user_id, name, email, token_hash, scope, expiry, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&token.hash)
        .bind(token.scope.as_str())
        .bind(token.expiry)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %user.id, scope = token.scope.as_str(), "Token persisted");
        Ok(())
    }

    async fn get_user_for_token(
        &self,
        plaintext: &str,
        scope: TokenScope,
    ) -> Result<User, StoreError> {
        let hash = BearerToken::hash_plaintext(plaintext);

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, u.password_hash,
                   u.created_at, u.updated_at
            FROM users u
            INNER JOIN tokens t ON t.user_id = u.id
            WHERE t.token_hash = $1 AND t.scope = $2 AND t.expiry > $3
            "#,
        )
        .bind(&hash)
        .bind(scope.as_str())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, first_name, last_name, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
