//! Shared application state

use std::sync::Arc;
use storefront_shared::{TokenStore, UserStore};

use crate::{
    auth::{CodecError, Encryptor, LinkSigner, SessionBackend, SessionManager, TokenAuthenticator},
    config::Config,
    email::{EmailConfig, Mailer},
    websocket::NotificationHub,
};

/// Everything handlers need, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenAuthenticator,
    pub sessions: SessionManager,
    pub signer: LinkSigner,
    pub encryptor: Encryptor,
    pub hub: NotificationHub,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(
        config: Config,
        token_store: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        session_backend: Arc<dyn SessionBackend>,
        hub: NotificationHub,
    ) -> Result<Self, CodecError> {
        let encryptor = Encryptor::from_hex(&config.encryption_key)?;
        let signer = LinkSigner::new(&config.signing_secret, config.reset_link_validity());
        let tokens = TokenAuthenticator::new(token_store, config.db_timeout);
        let sessions = SessionManager::new(
            session_backend,
            config.session_ttl(),
            config.db_timeout,
            config.cookie_secure,
        );
        let mailer = Mailer::new(EmailConfig::from_config(&config));

        Ok(Self {
            config: Arc::new(config),
            users,
            tokens,
            sessions,
            signer,
            encryptor,
            hub,
            mailer,
        })
    }
}
