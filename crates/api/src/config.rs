//! Application configuration

use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String, // front-end base that signed links point at

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub db_timeout: Duration,

    // Sessions
    pub redis_url: Option<String>,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,

    // Authentication
    pub signing_secret: String,
    pub encryption_key: String, // 32-byte hex key for identities embedded in reset links
    pub token_ttl_hours: i64,
    pub reset_link_ttl_minutes: i64,

    // Notifications
    pub ws_allowed_origins: Vec<String>,

    // Email
    pub resend_api_key: String,
    pub email_from: String,
    pub email_api_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:4001".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:4000".to_string())
                .trim_end_matches('/')
                .to_string(),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            db_timeout: {
                let secs: u64 = env::var("DB_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .map_err(|_| ConfigError::Invalid("DB_TIMEOUT_SECS must be a whole number of seconds"))?;
                if secs == 0 {
                    return Err(ConfigError::Invalid("DB_TIMEOUT_SECS must be greater than zero"));
                }
                Duration::from_secs(secs)
            },

            // Sessions
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            session_ttl_hours: parse_ttl(
                "SESSION_TTL_HOURS",
                24,
                MAX_TTL_HOURS,
                "SESSION_TTL_HOURS must be between 1 and 8760",
            )?,
            cookie_secure: env::var("COOKIE_SECURE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            // Authentication
            signing_secret: {
                let secret = env::var("SIGNING_SECRET")
                    .map_err(|_| ConfigError::Missing("SIGNING_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SIGNING_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            // Generate with: openssl rand -hex 32
            encryption_key: {
                let key = env::var("ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::Missing("ENCRYPTION_KEY"))?;

                if key.len() != 64 {
                    return Err(ConfigError::InvalidEncryptionKey(
                        "ENCRYPTION_KEY must be exactly 64 hex characters (32 bytes)",
                    ));
                }

                const INSECURE_KEYS: &[&str] = &[
                    "0000000000000000000000000000000000000000000000000000000000000000",
                    "1111111111111111111111111111111111111111111111111111111111111111",
                    "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
                ];

                if INSECURE_KEYS.contains(&key.to_lowercase().as_str()) {
                    return Err(ConfigError::InsecureEncryptionKey(
                        "ENCRYPTION_KEY is using a known insecure default value",
                    ));
                }

                if !key.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ConfigError::InvalidEncryptionKey(
                        "ENCRYPTION_KEY must contain only hexadecimal characters (0-9, a-f, A-F)",
                    ));
                }

                key
            },
            token_ttl_hours: parse_ttl(
                "TOKEN_TTL_HOURS",
                24,
                MAX_TTL_HOURS,
                "TOKEN_TTL_HOURS must be between 1 and 8760",
            )?,
            reset_link_ttl_minutes: parse_ttl(
                "RESET_LINK_TTL_MINUTES",
                60,
                MAX_RESET_LINK_MINUTES,
                "RESET_LINK_TTL_MINUTES must be between 1 and 10080",
            )?,

            // Notifications
            ws_allowed_origins: env::var("WS_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),

            // Email
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Widgets <info@widgets.com>".to_string()),
            email_api_url: env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
        })
    }

    pub fn token_lifetime(&self) -> time::Duration {
        time::Duration::hours(self.token_ttl_hours)
    }

    pub fn reset_link_validity(&self) -> time::Duration {
        time::Duration::minutes(self.reset_link_ttl_minutes)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.unsigned_abs() * 3600)
    }
}

/// One year
const MAX_TTL_HOURS: i64 = 24 * 365;
/// One week
const MAX_RESET_LINK_MINUTES: i64 = 60 * 24 * 7;

/// Read a lifetime setting that must lie in `1..=max`
fn parse_ttl(var: &str, default: i64, max: i64, message: &'static str) -> Result<i64, ConfigError> {
    let value = match env::var(var) {
        Ok(raw) => raw.trim().parse::<i64>().map_err(|_| ConfigError::Invalid(message))?,
        Err(_) => default,
    };
    if !(1..=max).contains(&value) {
        return Err(ConfigError::Invalid(message));
    }
    Ok(value)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid encryption key: {0}")]
    InvalidEncryptionKey(&'static str),
    #[error("Insecure encryption key: {0}")]
    InsecureEncryptionKey(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
