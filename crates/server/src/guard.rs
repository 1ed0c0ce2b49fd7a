//! Content negotiation and the session guard.
//!
//! JSON callers authenticate with bearer tokens issued by the
//! authorization server; everybody else gets a server-side session tied to
//! the `session` cookie.

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{ACCEPT, COOKIE, SET_COOKIE},
        request::Parts,
    },
};
use std::convert::Infallible;

pub const SESSION_COOKIE_NAME: &str = "session";

/// Sessions last two hours.
pub const SESSION_LIFETIME_SECONDS: i64 = 7200;

/// Whether the caller asked for a JSON answer.
pub fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("/json") || v.contains("+json"));
    let ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    accepts_json || ajax
}

/// How a handler authenticates and answers the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Bearer tokens and JSON envelopes.
    Token,
    /// Cookie sessions and redirects.
    Session,
}

/// Extractor yielding the [`AuthStrategy`] for the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseMode(pub AuthStrategy);

impl ResponseMode {
    pub fn is_json(&self) -> bool {
        self.0 == AuthStrategy::Token
    }
}

impl<S> FromRequestParts<S> for ResponseMode
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let strategy = if wants_json(&parts.headers) {
            AuthStrategy::Token
        } else {
            AuthStrategy::Session
        };
        Ok(ResponseMode(strategy))
    }
}

#[must_use]
pub fn session_cookie(session_id: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE_NAME}={session_id}; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age={SESSION_LIFETIME_SECONDS}"
    )
}

#[must_use]
pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE_NAME}=; HttpOnly{secure_flag}; SameSite=Lax; Path=/; Max-Age=0")
}

pub fn set_cookie(headers: &mut HeaderMap, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        headers.append(SET_COOKIE, value);
    }
}

/// Session id from the request cookies.
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| {
            part.trim()
                .strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        assert!(!wants_json(&headers));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain"));
        assert!(wants_json(&headers));

        let mut ajax = HeaderMap::new();
        ajax.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(wants_json(&ajax));
    }

    #[test]
    fn session_cookie_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc123; other=1"));
        assert_eq!(extract_session_id(&headers).as_deref(), Some("abc123"));

        headers.insert(COOKIE, HeaderValue::from_static("sessionish=zzz"));
        assert!(extract_session_id(&headers).is_none());
    }

    #[test]
    fn cookie_flags() {
        let cookie = session_cookie("abc", true);
        assert!(cookie.starts_with("session=abc; HttpOnly; Secure"));
        assert!(clear_session_cookie(false).contains("Max-Age=0"));
    }
}
