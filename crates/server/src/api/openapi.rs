//! OpenAPI document served by Redoc at `/api-docs`.

use crate::api::{health::MISC_TAG, login::AUTH_TAG, register::ACCOUNT_TAG};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Name of the bearer scheme referenced by `security(...)` on handlers.
pub const BEARER_SCHEME: &str = "Authorization";

/// Registers the bearer access token scheme.
pub struct BearerTokenAddon;

impl Modify for BearerTokenAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "The `access_token` from `/login` or `/refresh`. Browser clients may use the session cookie instead.",
            ))
            .build();
        components.add_security_scheme(BEARER_SCHEME, SecurityScheme::Http(bearer));
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerTokenAddon),
    info(
        title = "Auth API",
        version = "1.0.0",
        description = "Every JSON answer is an envelope `{error, message?, data?}`. Messages follow `Accept-Language`."
    ),
    tags(
        (name = AUTH_TAG, description = "Login, logout and token refresh"),
        (name = ACCOUNT_TAG, description = "Registration, passwords, email verification and availability"),
        (name = MISC_TAG, description = "Operational endpoints")
    )
)]
pub struct ApiDoc;
