//! Account registration.

use crate::AppResources;
use crate::api::auth::{Payload, start_session};
use crate::api::verification::send_verification_link;
use crate::entity::user;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::guard::ResponseMode;
use crate::lang::Locale;
use crate::oauth2::hash_password;
use crate::validation::{Message, Validator};
use axum::{
    Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use utoipa::ToSchema;

pub const ACCOUNT_TAG: &str = "Account";

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

/// Whether an account already uses `email` (compared lowercased).
pub async fn email_taken(resources: &AppResources, email: &str) -> Result<bool, ApiError> {
    let count = user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .count(resources.db.as_ref())
        .await?;
    Ok(count > 0)
}

#[utoipa::path(
    post,
    path = "/register",
    tag = ACCOUNT_TAG,
    operation_id = "Register",
    summary = "Create an account",
    description = "Creates the account and mails a verification link. Callers that do not ask for JSON are logged in and redirected.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = Envelope, example = json!({"error": false, "data": {"created": true}})),
        (status = 303, description = "Session started, redirect to the home path"),
        (status = 422, description = "Validation failed", body = Envelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    Extension(resources): Extension<AppResources>,
    mode: ResponseMode,
    locale: Locale,
    Payload(input): Payload<RegisterRequest>,
) -> Result<Response, ApiError> {
    let mut v = Validator::new();
    v.field("name", input.name.as_deref()).required().max(255);
    v.field("email", input.email.as_deref())
        .required()
        .email()
        .max(255);
    if v.passes("email")
        && let Some(email) = input.email.as_deref()
        && email_taken(&resources, email).await?
    {
        v.fail("email", Message::new("validation.unique"));
    }
    v.field("password", input.password.as_deref())
        .required()
        .min(8)
        .confirmed(input.password_confirmation.as_deref());
    v.finish()?;

    let now = OffsetDateTime::now_utc();
    let user = user::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        name: Set(input.name.unwrap_or_default().trim().to_string()),
        email: Set(input.email.unwrap_or_default().trim().to_lowercase()),
        password_hash: Set(hash_password(&input.password.unwrap_or_default())?),
        email_verified_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await?;

    tracing::info!(user_id = %user.id, "user registered");

    if let Err(e) = send_verification_link(&resources, &locale, &user).await {
        tracing::error!(user_id = %user.id, error = %e, "could not send verification link");
    }

    if mode.is_json() {
        Ok(Envelope::data(json!({ "created": true }))
            .with_status(StatusCode::CREATED)
            .into_response())
    } else {
        start_session(&resources, &user.id, &resources.config.home_path).await
    }
}
