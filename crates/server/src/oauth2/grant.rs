//! Token requests built on behalf of first-party callers.

use crate::config::PasswordClientConfig;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Form of an OAuth2 token endpoint request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl TokenRequest {
    /// Password grant for the configured first-party client. Values are
    /// passed through untouched.
    pub fn password(
        client: &PasswordClientConfig,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: GRANT_PASSWORD.to_string(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            username: Some(username.into()),
            password: Some(password.into()),
            refresh_token: None,
            scope: String::new(),
        }
    }

    /// Refresh grant for the configured first-party client.
    pub fn refresh(client: &PasswordClientConfig, refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: GRANT_REFRESH_TOKEN.to_string(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            username: None,
            password: None,
            refresh_token: Some(refresh_token.into()),
            scope: String::new(),
        }
    }
}

/// Successful token endpoint payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub access_token: String,
    pub refresh_token: String,
}
