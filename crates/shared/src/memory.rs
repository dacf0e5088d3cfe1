//! In-process store for local development and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{TokenStore, UserStore};
use crate::types::{BearerToken, TokenScope, User, UserId};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: UserId,
    hash: Vec<u8>,
    scope: TokenScope,
    expiry: OffsetDateTime,
}

/// Token and user store held in memory.
///
/// Mirrors the relational behaviour that matters to callers: tokens must
/// reference an existing user, deleting a user drops their tokens, and
/// expired tokens are filtered on lookup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    tokens: RwLock<Vec<StoredToken>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user and return it with its assigned id
    pub async fn insert_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> User {
        let id = UserId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = OffsetDateTime::now_utc();
        let user = User {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.users.write().await.insert(id, user.clone());
        user
    }

    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &BearerToken, user: &User) -> Result<(), StoreError> {
        if !self.users.read().await.contains_key(&user.id) {
            return Err(StoreError::Constraint(format!(
                "token references unknown user {}",
                user.id
            )));
        }

        let mut tokens = self.tokens.write().await;
        if tokens.iter().any(|t| t.hash == token.hash) {
            return Err(StoreError::Constraint("duplicate token hash".to_string()));
        }
        tokens.push(StoredToken {
            user_id: user.id,
            hash: token.hash.clone(),
            scope: token.scope,
            expiry: token.expiry,
        });
        Ok(())
    }

    async fn get_user_for_token(
        &self,
        plaintext: &str,
        scope: TokenScope,
    ) -> Result<User, StoreError> {
        let hash = BearerToken::hash_plaintext(plaintext);
        let now = OffsetDateTime::now_utc();

        let owner = {
            let tokens = self.tokens.read().await;
            tokens
                .iter()
                .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
                .map(|t| t.user_id)
        };

        let owner = owner.ok_or(StoreError::NotFound)?;
        self.users
            .read()
            .await
            .get(&owner)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError> {
        if self.users.write().await.remove(&user_id).is_none() {
            return Err(StoreError::NotFound);
        }
        self.tokens.write().await.retain(|t| t.user_id != user_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token_for(user_id: UserId, plaintext: &str, expiry: OffsetDateTime) -> BearerToken {
        BearerToken {
            plaintext: plaintext.to_string(),
            user_id,
            hash: BearerToken::hash_plaintext(plaintext),
            scope: TokenScope::Authentication,
            created_at: OffsetDateTime::now_utc(),
            expiry,
        }
    }

    #[tokio::test]
    async fn test_lookup_filters_expired_tokens() {
        let store = MemoryStore::new();
        let user = store.insert_user("Ada", "Admin", "admin@example.com", "hash").await;

        let live = token_for(user.id, "LIVELIVELIVELIVELIVELIVE01", OffsetDateTime::now_utc() + Duration::hours(1));
        let dead = token_for(user.id, "DEADDEADDEADDEADDEADDEAD01", OffsetDateTime::now_utc() - Duration::seconds(1));
        store.insert_token(&live, &user).await.unwrap();
        store.insert_token(&dead, &user).await.unwrap();

        let found = store
            .get_user_for_token("LIVELIVELIVELIVELIVELIVE01", TokenScope::Authentication)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        let expired = store
            .get_user_for_token("DEADDEADDEADDEADDEADDEAD01", TokenScope::Authentication)
            .await;
        assert!(matches!(expired, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_insert_token_requires_existing_user() {
        let store = MemoryStore::new();
        let user = store.insert_user("Ada", "Admin", "admin@example.com", "hash").await;
        store.delete_user(user.id).await.unwrap();

        let token = token_for(user.id, "ORPHANORPHANORPHANORPHAN01", OffsetDateTime::now_utc() + Duration::hours(1));
        let result = store.insert_token(&token, &user).await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_duplicate_token_hash_rejected() {
        let store = MemoryStore::new();
        let user = store.insert_user("Ada", "Admin", "admin@example.com", "hash").await;
        let token = token_for(user.id, "TWINSTWINSTWINSTWINSTWIN01", OffsetDateTime::now_utc() + Duration::hours(1));

        store.insert_token(&token, &user).await.unwrap();
        let again = store.insert_token(&token, &user).await;
        assert!(matches!(again, Err(StoreError::Constraint(_))));
        assert_eq!(store.token_count().await, 1);
    }

    #[test]
    fn test_tokens_migration_keeps_hashes_unique() {
        let migration = include_str!("../../../migrations/20240101000100_create_tokens.sql");
        assert!(migration.contains("CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_token_hash"));
    }

    #[tokio::test]
    async fn test_delete_user_drops_tokens() {
        let store = MemoryStore::new();
        let user = store.insert_user("Ada", "Admin", "admin@example.com", "hash").await;
        let token = token_for(user.id, "TOKENTOKENTOKENTOKENTOKEN1", OffsetDateTime::now_utc() + Duration::hours(1));
        store.insert_token(&token, &user).await.unwrap();
        assert_eq!(store.token_count().await, 1);

        store.delete_user(user.id).await.unwrap();
        assert_eq!(store.token_count().await, 0);
        assert!(matches!(store.delete_user(user.id).await, Err(StoreError::NotFound)));
    }
}
