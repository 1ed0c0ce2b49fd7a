//! SeaORM entities.

pub mod oauth_access_token;
pub mod oauth_client;
pub mod oauth_refresh_token;
pub mod password_reset;
pub mod session;
pub mod user;
