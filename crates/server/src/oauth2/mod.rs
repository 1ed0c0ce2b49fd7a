//! Password and refresh token grants.
//!
//! ## Supported Flows
//!
//! - Resource Owner Password Credentials, for the configured first-party client
//! - Refresh Token

pub mod error;
pub mod grant;
pub mod jwt;
pub mod password;
pub mod server;

pub use error::OAuthError;
pub use grant::{TokenRequest, TokenResponse};
pub use jwt::{AccessClaims, TokenSigner};
pub use password::{generate_token, hash_password, hash_token, token_matches, verify_password};
pub use server::{AuthorizationServer, DbAuthorizationServer};
