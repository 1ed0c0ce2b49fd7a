//! Email verification through signed links.

use crate::AppResources;
use crate::api::auth::CurrentUser;
use crate::api::register::ACCOUNT_TAG;
use crate::entity::user;
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::guard::ResponseMode;
use crate::lang::Locale;
use crate::mail::OutgoingMail;
use axum::{
    Extension,
    extract::Path,
    http::Uri,
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, IntoActiveModel};
use time::{Duration, OffsetDateTime};

/// Verification links stay valid this long.
pub const VERIFICATION_LINK_TTL: Duration = Duration::minutes(60);

/// Mail `user` a signed link to `/email/verify/{id}`.
pub async fn send_verification_link(
    resources: &AppResources,
    locale: &Locale,
    user: &user::Model,
) -> Result<(), ApiError> {
    let path = format!("/email/verify/{}", user.id);
    let signed = resources
        .url_signer
        .sign(&path, OffsetDateTime::now_utc() + VERIFICATION_LINK_TTL);
    let url = format!("{}{signed}", resources.config.app_url.trim_end_matches('/'));

    resources
        .mailer
        .send(OutgoingMail::verify_email(locale, &user.email, &url))
        .await?;
    tracing::info!(user_id = %user.id, "verification link sent");
    Ok(())
}

#[utoipa::path(
    method(get, post),
    path = "/email/verify/{id}",
    tag = ACCOUNT_TAG,
    operation_id = "Verify Email",
    summary = "Mark the caller's email address as verified",
    description = "Opened from the signed link mailed at registration. The link must carry a valid `expires` and `signature` and belong to the authenticated user.",
    params(
        ("id" = String, Path, description = "User id the link was issued for"),
        ("expires" = i64, Query, description = "Unix timestamp the link stops working at"),
        ("signature" = String, Query, description = "HMAC-SHA256 of the path and query")
    ),
    responses(
        (status = 200, description = "Email verified", body = Envelope),
        (status = 401, description = "Not authenticated", body = Envelope),
        (status = 403, description = "Bad signature or another user's link", body = Envelope)
    ),
    security(("Authorization" = []))
)]
#[tracing::instrument(skip_all, fields(id = %id))]
pub async fn verify(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<String>,
    uri: Uri,
    mode: ResponseMode,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    if let Err(e) = resources.url_signer.verify(&uri) {
        tracing::debug!(error = %e, "verification link rejected");
        return Err(ApiError::InvalidSignature);
    }
    if id != current.user.id {
        return Err(ApiError::Forbidden);
    }

    if !current.user.has_verified_email() {
        let user_id = current.user.id.clone();
        let now = OffsetDateTime::now_utc();
        let mut active = current.user.into_active_model();
        active.email_verified_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(resources.db.as_ref()).await?;
        tracing::info!(user_id, "email verified");
    }

    if mode.is_json() {
        Ok(Envelope::<()>::ok("Ok").into_response())
    } else {
        Ok(Redirect::to(&resources.config.home_path).into_response())
    }
}

#[utoipa::path(
    post,
    path = "/email/resend",
    tag = ACCOUNT_TAG,
    operation_id = "Resend Verification",
    summary = "Mail a fresh verification link",
    responses(
        (status = 200, description = "Link sent, or `error: true` when the address is already verified", body = Envelope),
        (status = 401, description = "Not authenticated", body = Envelope)
    ),
    security(("Authorization" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn resend(
    Extension(resources): Extension<AppResources>,
    locale: Locale,
    mode: ResponseMode,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    if current.user.has_verified_email() {
        return Ok(Envelope::<()>::fail(locale.trans("auth.email.verified")).into_response());
    }

    send_verification_link(&resources, &locale, &current.user).await?;

    if mode.is_json() {
        Ok(Envelope::<()>::ok("Ok").into_response())
    } else {
        Ok(Redirect::to(&resources.config.home_path).into_response())
    }
}
