//! Password reset by mailed token, and password change for signed-in users.

use crate::AppResources;
use crate::api::auth::{CurrentUser, Payload, start_session};
use crate::api::register::ACCOUNT_TAG;
use crate::entity::{password_reset, user};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::guard::ResponseMode;
use crate::lang::Locale;
use crate::mail::OutgoingMail;
use crate::oauth2::{generate_token, hash_password, hash_token, token_matches, verify_password};
use crate::validation::{Message, ValidationErrors, Validator};
use axum::{
    Extension,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use url::form_urlencoded;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

async fn find_user(resources: &AppResources, email: &str) -> Result<Option<user::Model>, ApiError> {
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(resources.db.as_ref())
        .await?)
}

fn message(mode: ResponseMode, text: String) -> Response {
    if mode.is_json() {
        Envelope::<()>::ok(text).into_response()
    } else {
        ([(CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/password/email",
    tag = ACCOUNT_TAG,
    operation_id = "Send Reset Link",
    summary = "Mail a password reset link",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Link sent", body = Envelope),
        (status = 422, description = "Invalid or unknown email", body = Envelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn send_reset_link(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    locale: Locale,
    Payload(input): Payload<ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    v.field("email", input.email.as_deref()).required().email();
    v.finish()?;

    let Some(user) = find_user(&resources, input.email.as_deref().unwrap_or_default()).await?
    else {
        return Err(ValidationErrors::field("email", Message::new("passwords.user")).into());
    };

    let token = generate_token()?;
    password_reset::Entity::delete_by_id(user.email.clone())
        .exec(resources.db.as_ref())
        .await?;
    password_reset::ActiveModel {
        email: Set(user.email.clone()),
        token_hash: Set(hash_token(&token)),
        created_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(resources.db.as_ref())
    .await?;

    let email: String = form_urlencoded::byte_serialize(user.email.as_bytes()).collect();
    let url = format!(
        "{}/password/reset/{token}?email={email}",
        resources.config.app_url.trim_end_matches('/')
    );
    resources
        .mailer
        .send(OutgoingMail::reset_password(&locale, &user.email, &url))
        .await?;
    tracing::info!(user_id = %user.id, "password reset link sent");

    Ok(message(mode, locale.trans("passwords.sent")))
}

#[utoipa::path(
    post,
    path = "/password/reset",
    tag = ACCOUNT_TAG,
    operation_id = "Reset Password",
    summary = "Set a new password with a mailed reset token",
    description = "Reset tokens expire after 60 minutes and work once. Callers that do not ask for JSON are logged in and redirected.",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = Envelope),
        (status = 303, description = "Session started, redirect to the home path"),
        (status = 422, description = "Validation failed, unknown user or invalid token", body = Envelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    locale: Locale,
    Payload(input): Payload<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    v.field("token", input.token.as_deref()).required();
    v.field("email", input.email.as_deref()).required().email();
    v.field("password", input.password.as_deref())
        .required()
        .confirmed(input.password_confirmation.as_deref())
        .min(8);
    v.finish()?;

    let Some(user) = find_user(&resources, input.email.as_deref().unwrap_or_default()).await?
    else {
        return Err(ValidationErrors::field("email", Message::new("passwords.user"))
            .with_message("passwords.user")
            .into());
    };

    let token = input.token.unwrap_or_default();
    let pending = password_reset::Entity::find_by_id(user.email.clone())
        .one(resources.db.as_ref())
        .await?
        .filter(|r| !r.is_expired() && token_matches(token.trim(), &r.token_hash));
    if pending.is_none() {
        return Err(ValidationErrors::new()
            .with_message("passwords.token")
            .with_data(json!("invalid_token"))
            .into());
    }

    let user_id = user.id.clone();
    let email = user.email.clone();
    let now = OffsetDateTime::now_utc();
    let mut active = user.into_active_model();
    active.password_hash = Set(hash_password(&input.password.unwrap_or_default())?);
    active.updated_at = Set(now);
    active.update(resources.db.as_ref()).await?;

    password_reset::Entity::delete_by_id(email)
        .exec(resources.db.as_ref())
        .await?;
    tracing::info!(user_id, "password reset");

    if mode.is_json() {
        Ok(message(mode, locale.trans("passwords.reset")))
    } else {
        start_session(&resources, &user_id, &resources.config.home_path).await
    }
}

#[utoipa::path(
    post,
    path = "/password/change",
    tag = ACCOUNT_TAG,
    operation_id = "Change Password",
    summary = "Change the password of the signed-in user",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = Envelope),
        (status = 401, description = "Not authenticated", body = Envelope),
        (status = 422, description = "Validation failed or wrong current password", body = Envelope)
    ),
    security(("Authorization" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    locale: Locale,
    current: CurrentUser,
    Payload(input): Payload<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    v.field("current_password", input.current_password.as_deref())
        .required()
        .min(6)
        .max(255);
    v.field("password", input.password.as_deref())
        .required()
        .confirmed(input.password_confirmation.as_deref())
        .min(6)
        .max(255);
    v.field("password_confirmation", input.password_confirmation.as_deref())
        .required()
        .min(6)
        .max(255);
    v.finish()?;

    let current_password = input.current_password.unwrap_or_default();
    if !verify_password(&current_password, &current.user.password_hash) {
        return Err(ValidationErrors::field(
            "current_password",
            Message::new("passwords.current_wrong"),
        )
        .into());
    }

    let user_id = current.user.id.clone();
    let mut active = current.user.into_active_model();
    active.password_hash = Set(hash_password(&input.password.unwrap_or_default())?);
    active.updated_at = Set(OffsetDateTime::now_utc());
    active.update(resources.db.as_ref()).await?;
    tracing::info!(user_id, "password changed");

    Ok(message(mode, locale.trans("passwords.changed")))
}
