//! The uniform JSON body every JSON-mode endpoint answers with.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// `{error, message?, data?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope<T = Value> {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Successful response carrying a payload.
    pub fn data(data: T) -> Self {
        Self {
            error: false,
            message: None,
            data: Some(data),
        }
    }

    /// Successful response carrying only a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Failed response carrying only a message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }

    /// Pair the envelope with an explicit status code.
    pub fn with_status(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
