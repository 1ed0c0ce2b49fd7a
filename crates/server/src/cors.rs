//! CORS allow-list enforcement.
//!
//! [`cors_guard`] rejects cross-origin requests the configured allow-lists
//! do not cover, answering in the caller's format. Requests that pass are
//! handed to tower-http's `CorsLayer`, which writes the CORS headers and
//! answers allowed preflights.

use crate::config::CorsConfig;
use crate::envelope::Envelope;
use crate::guard::wants_json;
use axum::{
    Json,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
        header::{ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE, ORIGIN},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};

#[derive(Debug)]
enum OriginPattern {
    Any,
    Exact(String),
    Wildcard(Regex),
}

impl OriginPattern {
    fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            return OriginPattern::Any;
        }
        if pattern.contains('*') {
            let source = format!("(?i)^{}$", regex::escape(pattern).replace(r"\*", ".*"));
            if let Ok(re) = Regex::new(&source) {
                return OriginPattern::Wildcard(re);
            }
        }
        OriginPattern::Exact(pattern.to_ascii_lowercase())
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Any => true,
            OriginPattern::Exact(allowed) => allowed.eq_ignore_ascii_case(origin),
            OriginPattern::Wildcard(re) => re.is_match(origin),
        }
    }
}

/// Why a cross-origin request was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorsRejection {
    Origin,
    Method,
    Header,
}

impl CorsRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            CorsRejection::Method => StatusCode::METHOD_NOT_ALLOWED,
            CorsRejection::Origin | CorsRejection::Header => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CorsRejection::Origin => "Origin not allowed",
            CorsRejection::Method => "Method not allowed",
            CorsRejection::Header => "Header not allowed",
        }
    }
}

#[derive(Debug)]
pub struct CorsPolicy {
    origins: Vec<OriginPattern>,
    /// `None` allows every method.
    methods: Option<Vec<String>>,
    /// Lowercased; `None` allows every header.
    headers: Option<Vec<String>>,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let methods = (!config.allowed_methods.iter().any(|m| m == "*")).then(|| {
            config
                .allowed_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect()
        });
        let headers = (!config.allowed_headers.iter().any(|h| h == "*")).then(|| {
            config
                .allowed_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect()
        });
        Self {
            origins: config.allowed_origins.iter().map(|o| OriginPattern::parse(o)).collect(),
            methods,
            headers,
        }
    }

    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|pattern| pattern.matches(origin))
    }

    pub fn method_allowed(&self, method: &str) -> bool {
        match &self.methods {
            None => true,
            Some(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(method.trim())),
        }
    }

    /// `requested` is a comma separated `Access-Control-Request-Headers` value.
    pub fn headers_allowed(&self, requested: &str) -> bool {
        let Some(allowed) = &self.headers else {
            return true;
        };
        requested
            .split(',')
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .all(|h| allowed.contains(&h))
    }

    /// Check a request against the allow-lists. Same-origin requests (no
    /// `Origin` header) always pass.
    pub fn check(&self, method: &Method, headers: &HeaderMap) -> Result<(), CorsRejection> {
        let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
            return Ok(());
        };
        if !self.origin_allowed(origin) {
            return Err(CorsRejection::Origin);
        }

        let requested_method = headers
            .get(ACCESS_CONTROL_REQUEST_METHOD)
            .and_then(|v| v.to_str().ok());
        let is_preflight = *method == Method::OPTIONS && requested_method.is_some();
        if !is_preflight {
            return Ok(());
        }

        if let Some(requested) = requested_method
            && !self.method_allowed(requested)
        {
            return Err(CorsRejection::Method);
        }
        if let Some(requested) = headers
            .get(ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|v| v.to_str().ok())
            && !self.headers_allowed(requested)
        {
            return Err(CorsRejection::Header);
        }
        Ok(())
    }

    /// The tower-http layer writing CORS headers for requests that passed.
    pub fn layer(self: &Arc<Self>, config: &CorsConfig) -> CorsLayer {
        let policy = Arc::clone(self);
        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|o| policy.origin_allowed(o))
                .unwrap_or(false)
        });

        let allow_methods = match &self.methods {
            None => AllowMethods::mirror_request(),
            Some(methods) => AllowMethods::list(
                methods
                    .iter()
                    .filter_map(|m| Method::from_bytes(m.as_bytes()).ok()),
            ),
        };
        let allow_headers = match &self.headers {
            None => AllowHeaders::mirror_request(),
            Some(headers) => AllowHeaders::list(
                headers
                    .iter()
                    .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok()),
            ),
        };
        let expose_headers = if config.exposed_headers.iter().any(|h| h == "*")
            && !config.supports_credentials
        {
            ExposeHeaders::any()
        } else {
            ExposeHeaders::list(
                config
                    .exposed_headers
                    .iter()
                    .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok()),
            )
        };

        let mut layer = CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(allow_methods)
            .allow_headers(allow_headers)
            .expose_headers(expose_headers)
            .allow_credentials(config.supports_credentials);
        if config.max_age > 0 {
            layer = layer.max_age(Duration::from_secs(config.max_age));
        }
        layer
    }
}

/// Turn away cross-origin requests outside the allow-lists.
pub async fn cors_guard(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let Err(rejection) = policy.check(request.method(), request.headers()) else {
        return next.run(request).await;
    };

    tracing::debug!(
        method = %request.method(),
        path = %request.uri().path(),
        reason = rejection.message(),
        "cross-origin request rejected"
    );

    if wants_json(request.headers()) {
        (
            rejection.status(),
            Json(Envelope::<()>::fail(rejection.message())),
        )
            .into_response()
    } else {
        (
            rejection.status(),
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            rejection.message(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec!["localhost".into(), "*.laravel.com".into()],
            allowed_headers: vec!["X-Custom-1".into(), "X-Custom-2".into()],
            allowed_methods: vec!["GET".into(), "POST".into()],
            exposed_headers: vec![],
            supports_credentials: false,
            max_age: 0,
        }
    }

    fn preflight(origin: &str, method: &str, headers: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(ORIGIN, HeaderValue::from_str(origin).unwrap());
        map.insert(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_str(method).unwrap());
        if let Some(h) = headers {
            map.insert(ACCESS_CONTROL_REQUEST_HEADERS, HeaderValue::from_str(h).unwrap());
        }
        map
    }

    #[test]
    fn origins_support_wildcards() {
        let policy = CorsPolicy::from_config(&config());
        assert!(policy.origin_allowed("localhost"));
        assert!(policy.origin_allowed("blog.laravel.com"));
        assert!(policy.origin_allowed("https://blog.laravel.com"));
        assert!(!policy.origin_allowed("laravel.com.evil.org"));
        assert!(!policy.origin_allowed("otherhost"));
    }

    #[test]
    fn preflight_rejections() {
        let policy = CorsPolicy::from_config(&config());
        assert_eq!(
            policy.check(&Method::OPTIONS, &preflight("otherhost", "POST", None)),
            Err(CorsRejection::Origin)
        );
        assert_eq!(
            policy.check(&Method::OPTIONS, &preflight("localhost", "PUT", None)),
            Err(CorsRejection::Method)
        );
        assert_eq!(
            policy.check(&Method::OPTIONS, &preflight("localhost", "POST", Some("x-custom-3"))),
            Err(CorsRejection::Header)
        );
        assert_eq!(
            policy.check(
                &Method::OPTIONS,
                &preflight("localhost", "POST", Some("x-custom-1, X-Custom-2"))
            ),
            Ok(())
        );
    }

    #[test]
    fn actual_requests_only_check_origin() {
        let policy = CorsPolicy::from_config(&config());
        assert_eq!(
            policy.check(&Method::POST, &preflight("localhost", "PUT", Some("x-custom-3"))),
            Ok(())
        );
        assert_eq!(
            policy.check(&Method::POST, &preflight("otherhost", "POST", None)),
            Err(CorsRejection::Origin)
        );
        assert_eq!(policy.check(&Method::POST, &HeaderMap::new()), Ok(()));
    }

    #[test]
    fn star_allows_everything() {
        let policy = CorsPolicy::from_config(&CorsConfig::default());
        assert_eq!(
            policy.check(&Method::OPTIONS, &preflight("anything", "DELETE", Some("x-whatever"))),
            Ok(())
        );
    }
}
