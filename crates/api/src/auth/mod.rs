//! Authentication and link integrity for the storefront

pub mod encryption;
pub mod login;
pub mod middleware;
pub mod password;
pub mod sessions;
pub mod signed_link;
pub mod tokens;

pub use encryption::{CodecError, Encryptor};
pub use login::{login, logout, verify_credentials, LoginError};
pub use middleware::{require_bearer, require_session, session_layer, AuthUser, LOGIN_PATH};
pub use password::{hash_password, validate_password, verify_password};
pub use sessions::{
    MemorySessionBackend, RedisSessionBackend, Session, SessionBackend, SessionError, SessionKey,
    SessionManager, SessionValue,
};
pub use signed_link::{LinkError, LinkSigner};
pub use tokens::{AuthError, TokenAuthenticator, TOKEN_LENGTH};
