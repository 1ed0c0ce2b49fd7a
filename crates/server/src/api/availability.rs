//! Asynchronous form validation: is an email address still free?

use crate::AppResources;
use crate::api::auth::Payload;
use crate::api::register::{ACCOUNT_TAG, email_taken};
use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::validation::Validator;
use axum::Extension;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(default)]
pub struct AvailabilityQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Availability {
    pub available: bool,
}

#[utoipa::path(
    method(get, post),
    path = "/check-email-availability",
    tag = ACCOUNT_TAG,
    operation_id = "Check Email Availability",
    summary = "Check whether an email address can still be registered",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Availability of the address", body = Envelope<Availability>),
        (status = 422, description = "Missing or malformed email", body = Envelope)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn check_email_availability(
    Extension(resources): Extension<AppResources>,
    Payload(input): Payload<AvailabilityQuery>,
) -> Result<Envelope<Availability>, ApiError> {
    let mut v = Validator::new();
    v.field("email", input.email.as_deref()).required().email();
    v.finish().map_err(|errors| errors.headline_only())?;

    let taken = email_taken(&resources, input.email.as_deref().unwrap_or_default()).await?;
    Ok(Envelope::data(Availability { available: !taken }))
}
