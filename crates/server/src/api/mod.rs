//! HTTP surface of the auth API.
//!
//! - `login` - login, logout and token refresh
//! - `register` - account creation
//! - `password` - reset links, resets and password changes
//! - `verification` - signed email verification links
//! - `availability` - email availability check
//! - `health` - liveness check (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod auth;
pub mod availability;
pub mod health;
pub mod login;
pub mod openapi;
pub mod password;
pub mod register;
pub mod verification;

pub use health::MISC_TAG;
pub use login::AUTH_TAG;
pub use register::ACCOUNT_TAG;

use crate::AppResources;
use crate::cors::{CorsPolicy, cors_guard};
use crate::error::{ApiError, render_errors};
use crate::lang::detect_language;
use axum::{
    Extension, Router, middleware,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Turn a handler panic into an internal error for [`render_errors`].
fn panic_to_error(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::internal(format!("handler panicked: {message}")).into_response()
}

/// Build the application router with every route and middleware attached.
///
/// Requests pass, outermost first: tracing, the CORS allow-list guard,
/// tower-http's `CorsLayer`, locale detection, error rendering and panic
/// recovery.
pub fn router(resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .routes(routes!(login::login))
        .routes(routes!(login::logout))
        .routes(routes!(login::refresh))
        .routes(routes!(register::register))
        .routes(routes!(password::send_reset_link))
        .routes(routes!(password::reset))
        .routes(routes!(password::change))
        .routes(routes!(verification::verify))
        .routes(routes!(verification::resend))
        .routes(routes!(availability::check_email_availability))
        .routes(routes!(health::health))
        .split_for_parts();

    let config = resources.config.clone();
    let policy = Arc::new(CorsPolicy::from_config(&config.cors));
    let locales = Arc::new(config.locales.clone());

    router
        .merge(Redoc::with_url("/api-docs", api))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(Extension(resources))
        .layer(CatchPanicLayer::custom(panic_to_error))
        .layer(middleware::from_fn_with_state(config.environment, render_errors))
        .layer(middleware::from_fn_with_state(locales, detect_language))
        .layer(policy.layer(&config.cors))
        .layer(middleware::from_fn_with_state(policy, cors_guard))
        .layer(TraceLayer::new_for_http())
}

/// Starts the web server on the configured listen address.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let app = router(resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
