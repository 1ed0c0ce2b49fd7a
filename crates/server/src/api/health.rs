//! Liveness check.

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

/// Plain `ok` while the process is serving; never touches the database.
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "liveness",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Process is serving requests", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
