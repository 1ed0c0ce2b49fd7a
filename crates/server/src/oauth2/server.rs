//! The authorization server behind the login and refresh endpoints.
//!
//! Only the `password` and `refresh_token` grants are answered. Access
//! tokens are signed JWTs whose `jti` is the `oauth_access_tokens` row id;
//! refresh tokens are opaque and bound to the access token they came with.

use super::error::OAuthError;
use super::grant::{GRANT_PASSWORD, GRANT_REFRESH_TOKEN, TokenRequest, TokenResponse};
use super::jwt::{AccessClaims, TokenSigner};
use super::password::{generate_token, verify_password};
use crate::config::TokenConfig;
use crate::entity::{oauth_access_token, oauth_client, oauth_refresh_token, user};
use crate::tokens::{RequestContext, TokenStore};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    async fn respond_to_access_token_request(
        &self,
        request: TokenRequest,
        ctx: &RequestContext,
    ) -> Result<TokenResponse, OAuthError>;
}

pub struct DbAuthorizationServer {
    db: Arc<DatabaseConnection>,
    tokens: TokenStore,
    signer: TokenSigner,
    lifetimes: TokenConfig,
}

impl DbAuthorizationServer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        tokens: TokenStore,
        signer: TokenSigner,
        lifetimes: TokenConfig,
    ) -> Self {
        Self {
            db,
            tokens,
            signer,
            lifetimes,
        }
    }

    async fn authenticate_client(
        &self,
        request: &TokenRequest,
    ) -> Result<oauth_client::Model, OAuthError> {
        let client = oauth_client::Entity::find_by_id(request.client_id.clone())
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if client.revoked
            || !client.password_client
            || !client.secret_matches(Some(request.client_secret.as_str()))
        {
            return Err(OAuthError::InvalidClient);
        }
        Ok(client)
    }

    async fn password_grant(
        &self,
        client: oauth_client::Model,
        request: TokenRequest,
        ctx: &RequestContext,
    ) -> Result<TokenResponse, OAuthError> {
        let username = request
            .username
            .filter(|u| !u.is_empty())
            .ok_or(OAuthError::InvalidRequest("username"))?;
        let password = request
            .password
            .filter(|p| !p.is_empty())
            .ok_or(OAuthError::InvalidRequest("password"))?;

        let user = user::Entity::find()
            .filter(user::Column::Email.eq(username.trim().to_lowercase()))
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidCredentials)?;

        if !verify_password(&password, &user.password_hash) {
            return Err(OAuthError::InvalidCredentials);
        }

        self.issue(&client, &user.id, request.scope, ctx).await
    }

    async fn refresh_grant(
        &self,
        client: oauth_client::Model,
        request: TokenRequest,
        ctx: &RequestContext,
    ) -> Result<TokenResponse, OAuthError> {
        let value = request
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(OAuthError::InvalidRequest("refresh_token"))?;

        let refresh = oauth_refresh_token::Entity::find_by_id(value)
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidRefreshToken("Cannot decrypt the refresh token"))?;

        if refresh.revoked {
            return Err(OAuthError::InvalidRefreshToken("Token has been revoked"));
        }
        if refresh.is_expired() {
            return Err(OAuthError::InvalidRefreshToken("Token has expired"));
        }

        let access = self
            .tokens
            .find(&refresh.access_token_id)
            .await?
            .ok_or(OAuthError::InvalidRefreshToken("Token is not linked to an access token"))?;
        if access.client_id != client.id {
            return Err(OAuthError::InvalidRefreshToken(
                "Token is not linked to client",
            ));
        }
        let user_id = access
            .user_id
            .clone()
            .ok_or(OAuthError::InvalidRefreshToken("Token has no owner"))?;

        // Revoke the old pair before the new one exists.
        let scopes = access.scopes.clone();
        self.tokens.revoke(access).await?;
        let mut old_refresh = refresh.into_active_model();
        old_refresh.revoked = Set(true);
        old_refresh.update(self.db.as_ref()).await?;

        let scope = if request.scope.is_empty() {
            scopes
        } else {
            request.scope
        };
        self.issue(&client, &user_id, scope, ctx).await
    }

    async fn issue(
        &self,
        client: &oauth_client::Model,
        user_id: &str,
        scope: String,
        ctx: &RequestContext,
    ) -> Result<TokenResponse, OAuthError> {
        let now = OffsetDateTime::now_utc();
        let access_expires = now + Duration::seconds(self.lifetimes.access_token_lifetime);
        let refresh_expires = now + Duration::seconds(self.lifetimes.refresh_token_lifetime);
        let jti = uuid::Uuid::new_v4().simple().to_string();

        let token = self
            .tokens
            .create(
                oauth_access_token::ActiveModel {
                    id: Set(jti.clone()),
                    user_id: Set(Some(user_id.to_string())),
                    client_id: Set(client.id.clone()),
                    scopes: Set(scope),
                    revoked: Set(false),
                    client_details: NotSet,
                    created_at: Set(now),
                    updated_at: Set(now),
                    expires_at: Set(access_expires),
                },
                ctx,
            )
            .await?;

        let refresh_value =
            generate_token().map_err(|e| OAuthError::ServerError(e.to_string()))?;
        oauth_refresh_token::ActiveModel {
            id: Set(refresh_value.clone()),
            access_token_id: Set(token.id.clone()),
            user_id: Set(Some(user_id.to_string())),
            revoked: Set(false),
            expires_at: Set(refresh_expires),
        }
        .insert(self.db.as_ref())
        .await?;

        let access_token = self
            .signer
            .sign(&AccessClaims {
                jti: token.id.clone(),
                sub: user_id.to_string(),
                aud: client.id.clone(),
                iat: now.unix_timestamp(),
                exp: access_expires.unix_timestamp(),
                scopes: token.scopes_list(),
            })
            .map_err(|e| OAuthError::ServerError(e.to_string()))?;

        tracing::info!(client_id = %client.id, user_id, token_id = %token.id, "access token issued");

        Ok(TokenResponse {
            token_type: "Bearer".to_string(),
            expires_in: self.lifetimes.access_token_lifetime,
            access_token,
            refresh_token: refresh_value,
        })
    }
}

#[async_trait]
impl AuthorizationServer for DbAuthorizationServer {
    #[tracing::instrument(skip_all, fields(grant_type = %request.grant_type, client_id = %request.client_id))]
    async fn respond_to_access_token_request(
        &self,
        request: TokenRequest,
        ctx: &RequestContext,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(&request).await?;
        match request.grant_type.as_str() {
            GRANT_PASSWORD => self.password_grant(client, request, ctx).await,
            GRANT_REFRESH_TOKEN => self.refresh_grant(client, request, ctx).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PasswordClientConfig;
    use crate::oauth2::password::hash_password;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn client_config() -> PasswordClientConfig {
        PasswordClientConfig {
            client_id: "first-party".into(),
            client_secret: "client-secret".into(),
        }
    }

    async fn setup() -> (Arc<DatabaseConnection>, DbAuthorizationServer) {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        Migrator::up(db.as_ref(), None).await.unwrap();
        let now = OffsetDateTime::now_utc();

        oauth_client::ActiveModel {
            id: Set("first-party".into()),
            secret: Set(Some("client-secret".into())),
            name: Set("First party".into()),
            password_client: Set(true),
            revoked: Set(false),
            created_at: Set(now),
        }
        .insert(db.as_ref())
        .await
        .unwrap();

        user::ActiveModel {
            id: Set("user-1".into()),
            name: Set("Jane".into()),
            email: Set("jane@example.com".into()),
            password_hash: Set(hash_password("password123").unwrap()),
            email_verified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db.as_ref())
        .await
        .unwrap();

        let server = DbAuthorizationServer::new(
            db.clone(),
            TokenStore::with_default_hooks(db.clone()),
            TokenSigner::new(SECRET),
            TokenConfig::default(),
        );
        (db, server)
    }

    #[tokio::test]
    async fn password_grant_issues_pair() {
        let (_db, server) = setup().await;
        let request = TokenRequest::password(&client_config(), "jane@example.com", "password123");
        let response = server
            .respond_to_access_token_request(request, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        let claims = TokenSigner::new(SECRET).verify(&response.access_token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.aud, "first-party");
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_grant() {
        let (_db, server) = setup().await;
        let request = TokenRequest::password(&client_config(), "jane@example.com", "nope");
        let err = server
            .respond_to_access_token_request(request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn bad_client_secret_is_invalid_client() {
        let (_db, server) = setup().await;
        let mut config = client_config();
        config.client_secret = "wrong".into();
        let request = TokenRequest::password(&config, "jane@example.com", "password123");
        let err = server
            .respond_to_access_token_request(request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::InvalidClient);
    }

    #[tokio::test]
    async fn refresh_rotates_and_revokes() {
        let (db, server) = setup().await;
        let first = server
            .respond_to_access_token_request(
                TokenRequest::password(&client_config(), "jane@example.com", "password123"),
                &RequestContext::default(),
            )
            .await
            .unwrap();

        let second = server
            .respond_to_access_token_request(
                TokenRequest::refresh(&client_config(), first.refresh_token.clone()),
                &RequestContext::default(),
            )
            .await
            .unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let old = oauth_refresh_token::Entity::find_by_id(first.refresh_token.clone())
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);

        let reused = server
            .respond_to_access_token_request(
                TokenRequest::refresh(&client_config(), first.refresh_token),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(reused, OAuthError::InvalidRefreshToken("Token has been revoked"));
    }

    #[tokio::test]
    async fn empty_refresh_token_is_invalid_request() {
        let (_db, server) = setup().await;
        let err = server
            .respond_to_access_token_request(
                TokenRequest::refresh(&client_config(), ""),
                &RequestContext::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::InvalidRequest("refresh_token"));
    }

    #[tokio::test]
    async fn unknown_grant_is_unsupported() {
        let (_db, server) = setup().await;
        let mut request = TokenRequest::refresh(&client_config(), "x");
        request.grant_type = "client_credentials".into();
        let err = server
            .respond_to_access_token_request(request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, OAuthError::UnsupportedGrantType);
    }
}
