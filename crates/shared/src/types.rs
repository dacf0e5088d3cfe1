//! Common types used across the storefront

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Purpose a bearer token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Authentication,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Storefront user (admin or customer account)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Opaque bearer credential bound to one user and one scope.
///
/// Only `token` and `expiry` are ever serialized back to the client; the
/// SHA-256 hash is what gets persisted.
#[derive(Debug, Clone, Serialize)]
pub struct BearerToken {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub scope: TokenScope,
    #[serde(skip)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expiry: OffsetDateTime,
}

impl BearerToken {
    /// SHA-256 of a plaintext token, as stored at rest
    pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
        Sha256::digest(plaintext.as_bytes()).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_scope_as_str() {
        assert_eq!(TokenScope::Authentication.as_str(), "authentication");
    }

    #[test]
    fn test_hash_plaintext_is_deterministic() {
        let a = BearerToken::hash_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        let b = BearerToken::hash_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        let c = BearerToken::hash_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYz");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_token_serialization_hides_hash_and_owner() {
        let now = OffsetDateTime::now_utc();
        let token = BearerToken {
            plaintext: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
            user_id: UserId(7),
            hash: BearerToken::hash_plaintext("ABCDEFGHIJKLMNOPQRSTUVWXYZ"),
            scope: TokenScope::Authentication,
            created_at: now,
            expiry: now,
        };

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["token"], "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        assert!(json.get("expiry").is_some());
        assert!(json.get("hash").is_none());
        assert!(json.get("user_id").is_none());
    }
}
