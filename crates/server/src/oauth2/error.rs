use axum::http::StatusCode;
use thiserror::Error;

/// Failure reported by the authorization server for a token request.
///
/// Each variant maps onto an RFC 6749 error code and a fixed HTTP status;
/// `message_key` addresses the human readable text in the message catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OAuthError {
    #[error("client authentication failed")]
    InvalidClient,
    #[error("missing or malformed parameter `{0}`")]
    InvalidRequest(&'static str),
    #[error("the user credentials were incorrect")]
    InvalidCredentials,
    #[error("the refresh token is invalid: {0}")]
    InvalidRefreshToken(&'static str),
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("authorization server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// RFC 6749 `error` value.
    pub fn error_type(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidCredentials | OAuthError::InvalidRefreshToken(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message_key(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient => "oauth.invalid_client",
            OAuthError::InvalidRequest(_) => "oauth.invalid_request",
            OAuthError::InvalidCredentials => "oauth.invalid_credentials",
            OAuthError::InvalidRefreshToken(_) => "oauth.invalid_refresh_token",
            OAuthError::UnsupportedGrantType => "oauth.unsupported_grant_type",
            OAuthError::ServerError(_) => "oauth.server_error",
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            OAuthError::InvalidRequest(param) => Some(format!("Check the `{param}` parameter")),
            OAuthError::InvalidRefreshToken(hint) => Some((*hint).to_string()),
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for OAuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        OAuthError::ServerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        assert_eq!(OAuthError::InvalidClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuthError::InvalidCredentials.error_type(), "invalid_grant");
        assert_eq!(
            OAuthError::InvalidRefreshToken("Token has been revoked").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::InvalidRequest("username").hint().as_deref(),
            Some("Check the `username` parameter")
        );
        assert!(OAuthError::UnsupportedGrantType.hint().is_none());
    }
}
