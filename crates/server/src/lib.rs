//! JSON authentication API.
//!
//! Login, logout and refresh exchange credentials with an OAuth2
//! authorization server on behalf of a first-party client and hand the
//! issued tokens back inside a uniform `{error, message, data}` envelope.
//! Registration, password reset, email verification and an email
//! availability check complete the account surface.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::config::AppConfig;
use crate::mail::Mailer;
use crate::oauth2::{AuthorizationServer, DbAuthorizationServer, TokenSigner};
use crate::security::UrlSigner;
use crate::throttle::LoginThrottle;
use crate::tokens::TokenStore;

pub mod api;
pub mod config;
pub mod cors;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod lang;
pub mod mail;
pub mod oauth2;
pub mod security;
pub mod throttle;
pub mod tokens;
pub mod validation;

#[derive(Debug, Error)]
pub enum ResourcesError {
    #[error("token secret cannot key the url signer: {0}")]
    Secret(#[from] hmac::digest::InvalidLength),
}

/// Everything a handler needs, shared through an `Extension` layer.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub auth_server: Arc<dyn AuthorizationServer>,
    pub tokens: TokenStore,
    pub throttle: LoginThrottle,
    pub signer: TokenSigner,
    pub url_signer: UrlSigner,
}

impl AppResources {
    /// Wire the database-backed authorization server and the default token hooks.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ResourcesError> {
        let secret = config.token_secret.as_bytes();
        let signer = TokenSigner::new(secret);
        let url_signer = UrlSigner::new(secret)?;
        let tokens = TokenStore::with_default_hooks(db.clone());
        let auth_server = Arc::new(DbAuthorizationServer::new(
            db.clone(),
            tokens.clone(),
            signer.clone(),
            config.tokens.clone(),
        ));

        Ok(Self {
            throttle: LoginThrottle::new(&config.throttle),
            db,
            config,
            mailer,
            auth_server,
            tokens,
            signer,
            url_signer,
        })
    }

    /// Swap the authorization server, e.g. for a remote one.
    pub fn with_auth_server(mut self, auth_server: Arc<dyn AuthorizationServer>) -> Self {
        self.auth_server = auth_server;
        self
    }
}
