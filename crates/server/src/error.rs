//! Request-boundary error taxonomy and its rendering.
//!
//! Handlers return `Result<_, ApiError>`. Turning an `ApiError` into a
//! response only records the error on the response; [`render_errors`] then
//! writes the final body once the request locale and the configured
//! environment are known.

use crate::config::Environment;
use crate::envelope::Envelope;
use crate::guard::wants_json;
use crate::lang::{Locale, trans};
use crate::oauth2::OAuthError;
use crate::validation::ValidationErrors;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("oauth server error: {0}")]
    OAuthServer(#[from] OAuthError),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("route not found")]
    RouteNotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("resource not found")]
    NotFound,
    #[error("the given data was invalid")]
    Validation(ValidationErrors),
    #[error("too many attempts, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Internal(InternalError),
}

/// Unexpected failure with the place it was raised.
#[derive(Debug)]
pub struct InternalError {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
    pub backtrace: Backtrace,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InternalError {}

impl ApiError {
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        let location = Location::caller();
        ApiError::Internal(InternalError {
            message: message.into(),
            file: location.file(),
            line: location.line(),
            backtrace: Backtrace::capture(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::OAuthServer(err) => err.status(),
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidSignature | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RouteNotFound | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the envelope for this error. The first matching arm wins.
    pub fn to_envelope(&self, locale: &Locale, environment: Environment) -> Envelope {
        match self {
            ApiError::OAuthServer(err) => {
                let mut data = json!({ "error": err.error_type() });
                if let Some(hint) = err.hint() {
                    data["hint"] = Value::String(hint);
                }
                Envelope::fail(locale.trans(err.message_key())).with_data(data)
            }
            ApiError::Unauthenticated => Envelope::fail(locale.trans("auth.unauthenticated")),
            ApiError::InvalidSignature => Envelope::fail(locale.trans("errors.invalid_signature")),
            ApiError::RouteNotFound => Envelope::fail(locale.trans("errors.invalid_endpoint")),
            ApiError::MethodNotAllowed => {
                Envelope::fail(locale.trans("errors.method_not_allowed"))
            }
            ApiError::NotFound => Envelope::fail(locale.trans("errors.not_found")),
            ApiError::Validation(errors) if errors.is_headline_only() => {
                Envelope::fail(errors.headline(locale))
            }
            ApiError::Validation(errors) => {
                Envelope::fail(errors.headline(locale)).with_data(errors.render_data(locale))
            }
            ApiError::RateLimited { retry_after } => Envelope::fail(trans(
                locale,
                "auth.throttle",
                &[("seconds", &retry_after.to_string())],
            ))
            .with_data(json!({ "retry_after": retry_after })),
            ApiError::Forbidden => Envelope::fail(locale.trans("errors.forbidden")),
            ApiError::Internal(err) => {
                if environment.is_production() {
                    Envelope::fail(locale.trans("errors.generic_error_message"))
                } else {
                    let stacktrace: Vec<String> =
                        err.backtrace.to_string().lines().map(str::to_string).collect();
                    Envelope::fail(err.message.clone()).with_data(json!({
                        "file": err.file,
                        "line": err.line,
                        "stacktrace": stacktrace,
                    }))
                }
            }
        }
    }

    fn report(&self) {
        match self {
            ApiError::OAuthServer(err) => {
                tracing::warn!(error = %err, code = err.error_type(), "token request rejected");
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err.message, file = err.file, line = err.line, "internal error");
            }
            _ => tracing::debug!(error = %self, "request failed"),
        }
    }
}

/// Response extension carrying the error until [`render_errors`] picks it up.
#[derive(Clone)]
struct PendingError(Arc<ApiError>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(PendingError(Arc::new(self)));
        response
    }
}

/// Render any [`ApiError`] produced further down the stack.
///
/// JSON callers receive the envelope; everybody else gets the translated
/// message as plain text with the same status.
pub async fn render_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let locale = request
        .extensions()
        .get::<Locale>()
        .cloned()
        .unwrap_or_default();
    let json = wants_json(request.headers());

    let mut response = next.run(request).await;
    let Some(PendingError(err)) = response.extensions_mut().remove::<PendingError>() else {
        return response;
    };

    err.report();
    render(&err, &locale, environment, json)
}

pub fn render(err: &ApiError, locale: &Locale, environment: Environment, json: bool) -> Response {
    let envelope = err.to_envelope(locale, environment);
    let status = err.status();

    let mut response = if json {
        (status, Json(envelope)).into_response()
    } else {
        let message = envelope.message.unwrap_or_default();
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    };

    if let ApiError::RateLimited { retry_after } = err
        && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
    {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

macro_rules! internal_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ApiError {
                #[track_caller]
                fn from(err: $ty) -> Self {
                    ApiError::internal(err.to_string())
                }
            }
        )+
    };
}

internal_from!(
    sea_orm::DbErr,
    argon2::password_hash::Error,
    jsonwebtoken::errors::Error,
    serde_json::Error,
    getrandom::Error,
    crate::mail::MailError,
    crate::tokens::HookError,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Message;

    fn en() -> Locale {
        Locale("en".into())
    }

    #[test]
    fn production_hides_internal_details() {
        let err = ApiError::internal("database exploded");
        let env = err.to_envelope(&en(), Environment::Production);
        assert!(env.error);
        assert_eq!(env.message.as_deref(), Some("Whoops, something went wrong."));
        assert!(env.data.is_none());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn debug_exposes_location() {
        let err = ApiError::internal("database exploded");
        let env = err.to_envelope(&en(), Environment::Local);
        assert_eq!(env.message.as_deref(), Some("database exploded"));
        let data = env.data.unwrap();
        assert!(data["file"].as_str().unwrap().ends_with("error.rs"));
        assert!(data["line"].as_u64().unwrap() > 0);
        assert!(data["stacktrace"].is_array());
    }

    #[test]
    fn oauth_errors_keep_status_and_code() {
        let err = ApiError::from(OAuthError::InvalidClient);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let env = err.to_envelope(&en(), Environment::Production);
        assert_eq!(env.message.as_deref(), Some("Client authentication failed"));
        assert_eq!(env.data.unwrap(), json!({"error": "invalid_client"}));

        let env = ApiError::from(OAuthError::InvalidRequest("password"))
            .to_envelope(&en(), Environment::Production);
        assert_eq!(env.data.unwrap()["hint"], "Check the `password` parameter");
    }

    #[test]
    fn validation_is_422_with_prompt() {
        let err = ApiError::from(ValidationErrors::field(
            "email",
            Message::new("validation.required"),
        ));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let env = err.to_envelope(&en(), Environment::Production);
        assert_eq!(env.message.as_deref(), Some("Please, check the input data."));
        assert_eq!(
            env.data.unwrap(),
            json!([{"field": "email", "message": "The email field is required."}])
        );
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let err = ApiError::RateLimited { retry_after: 42 };
        let response = render(&err, &en(), Environment::Production, true);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn plain_text_for_non_json_callers() {
        let response = render(&ApiError::NotFound, &en(), Environment::Production, false);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }
}
