//! Login, logout and token refresh.
//!
//! JSON callers get bearer tokens from the authorization server, wrapped in
//! the response envelope. Everybody else gets a cookie session and a
//! redirect.

use crate::AppResources;
use crate::api::auth::{CurrentUser, Credential, Payload, start_session};
use crate::entity::{session, user};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::guard::{AuthStrategy, ResponseMode, clear_session_cookie, set_cookie};
use crate::oauth2::{OAuthError, TokenRequest, TokenResponse, verify_password};
use crate::throttle::LoginThrottle;
use crate::tokens::RequestContext;
use crate::validation::{Message, ValidationErrors, Validator};
use axum::{
    Extension,
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Deserialize;
use utoipa::ToSchema;

pub const AUTH_TAG: &str = "Authentication";

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LogoutRequest {
    /// Id of the access token to revoke, the `jti` claim.
    pub jti: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Run a token request against the authorization server and wrap the
/// issued tokens in an envelope.
pub async fn issue_token(
    resources: &AppResources,
    request: TokenRequest,
    ctx: &RequestContext,
) -> Result<Envelope<TokenResponse>, OAuthError> {
    let token = resources
        .auth_server
        .respond_to_access_token_request(request, ctx)
        .await?;
    Ok(Envelope::data(token))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Exchange email and password for tokens",
    description = "JSON callers receive an access and refresh token pair. Other callers get a session cookie and are redirected.\n\n\
                   Repeated failures from the same email and address are locked out for a while.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = Envelope<TokenResponse>),
        (status = 303, description = "Session started, redirect to the home path"),
        (status = 400, description = "Credentials rejected by the authorization server", body = Envelope),
        (status = 422, description = "Validation failed", body = Envelope),
        (status = 429, description = "Too many attempts", body = Envelope)
    )
)]
#[tracing::instrument(skip_all, fields(strategy = ?mode.0))]
pub async fn login(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    ctx: RequestContext,
    Payload(input): Payload<LoginRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    v.field("email", input.email.as_deref()).required().email();
    v.field("password", input.password.as_deref()).required();
    v.finish()?;

    let email = input.email.unwrap_or_default().trim().to_lowercase();
    let password = input.password.unwrap_or_default();

    let key = LoginThrottle::key(&email, ctx.ip);
    if let Some(retry_after) = resources.throttle.lockout_remaining(&key) {
        tracing::warn!(email = %email, ip = ?ctx.ip, retry_after, "login locked out");
        return Err(ApiError::RateLimited { retry_after });
    }

    match mode.0 {
        AuthStrategy::Token => {
            let request = TokenRequest::password(&resources.config.password_client, email, password);
            match issue_token(&resources, request, &ctx).await {
                Ok(envelope) => {
                    resources.throttle.clear(&key);
                    Ok(envelope.into_response())
                }
                Err(OAuthError::InvalidCredentials) => {
                    let attempts = resources.throttle.hit(&key);
                    tracing::debug!(attempts, "login failed");
                    Err(OAuthError::InvalidCredentials.into())
                }
                Err(e) => Err(e.into()),
            }
        }
        AuthStrategy::Session => {
            let found = user::Entity::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .one(resources.db.as_ref())
                .await?
                .filter(|u| verify_password(&password, &u.password_hash));

            let Some(user) = found else {
                let attempts = resources.throttle.hit(&key);
                tracing::debug!(attempts, "login failed");
                return Err(ValidationErrors::field("email", Message::new("auth.failed")).into());
            };

            resources.throttle.clear(&key);
            start_session(&resources, &user.id, &resources.config.home_path).await
        }
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    summary = "Revoke an access token or end the session",
    description = "JSON callers name the token to revoke by its `jti`. Unknown ids are ignored and still answer `Ok`.",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Token revoked", body = Envelope),
        (status = 303, description = "Session ended, redirect to /"),
        (status = 401, description = "Not authenticated", body = Envelope)
    ),
    security(("Authorization" = []))
)]
#[tracing::instrument(skip_all, fields(strategy = ?mode.0))]
pub async fn logout(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    ctx: RequestContext,
    current: Option<CurrentUser>,
    Payload(input): Payload<LogoutRequest>,
) -> Result<Response, ApiError> {
    match mode.0 {
        AuthStrategy::Token => {
            let current = current.ok_or(ApiError::Unauthenticated)?;
            revoke_token(&resources, &current.user.id, input.jti.as_deref(), ctx).await?;
            Ok(Envelope::<()>::ok("Ok").into_response())
        }
        AuthStrategy::Session => {
            if let Some(CurrentUser {
                credential: Credential::Session(session),
                ..
            }) = current
            {
                session::Entity::delete_by_id(session.id)
                    .exec(resources.db.as_ref())
                    .await?;
                tracing::info!(user_id = %session.user_id, "session ended");
            }
            let mut response = Redirect::to("/").into_response();
            set_cookie(
                response.headers_mut(),
                &clear_session_cookie(resources.config.environment.is_production()),
            );
            Ok(response)
        }
    }
}

/// Revoke then delete the caller's token `jti`. Missing or foreign ids are a no-op.
async fn revoke_token(
    resources: &AppResources,
    user_id: &str,
    jti: Option<&str>,
    ctx: RequestContext,
) -> Result<(), ApiError> {
    let Some(jti) = jti.map(str::trim).filter(|j| !j.is_empty()) else {
        return Ok(());
    };
    let Some(token) = resources.tokens.find_for_user(jti, user_id).await? else {
        tracing::debug!(jti, "logout for unknown token");
        return Ok(());
    };

    let token = resources.tokens.revoke(token).await?;
    resources.tokens.delete(token, &ctx.with_user(user_id)).await?;
    tracing::info!(user_id, token_id = jti, "access token revoked");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh",
    summary = "Trade a refresh token for a new token pair",
    description = "The presented refresh token and the access token it belongs to are revoked.",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens issued", body = Envelope<TokenResponse>),
        (status = 400, description = "Refresh token rejected", body = Envelope),
        (status = 401, description = "Client authentication failed", body = Envelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(
    Extension(resources): Extension<AppResources>,
    ctx: RequestContext,
    Payload(input): Payload<RefreshRequest>,
) -> Result<Envelope<TokenResponse>, ApiError> {
    let request = TokenRequest::refresh(
        &resources.config.password_client,
        input.refresh_token.unwrap_or_default(),
    );
    Ok(issue_token(&resources, request, &ctx).await?)
}
