//! Request extractors shared by the auth endpoints.
//!
//! [`CurrentUser`] accepts either a bearer access token or the `session`
//! cookie, [`Payload`] reads JSON, form or query input into the same struct.

use crate::AppResources;
use crate::entity::{oauth_access_token, session, user};
use crate::error::ApiError;
use crate::guard::{
    SESSION_LIFETIME_SECONDS, extract_session_id, session_cookie, set_cookie,
};
use crate::oauth2::generate_token;
use crate::tokens::RequestContext;
use crate::validation::{Message, ValidationErrors};
use axum::{
    Form,
    body::Bytes,
    extract::{ConnectInfo, FromRequest, FromRequestParts, OptionalFromRequestParts, Query, Request},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
        request::Parts,
    },
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use time::{Duration, OffsetDateTime};

/// How the caller proved who they are.
#[derive(Clone, Debug)]
pub enum Credential {
    Token(oauth_access_token::Model),
    Session(session::Model),
}

/// The authenticated user of the request.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: user::Model,
    pub credential: Credential,
}

pub(crate) fn resources(parts: &Parts) -> Result<AppResources, ApiError> {
    parts
        .extensions
        .get::<AppResources>()
        .cloned()
        .ok_or_else(|| ApiError::internal("AppResources extension missing"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty())
        .then(|| token.trim().to_string())
}

async fn authenticate_token(
    resources: &AppResources,
    bearer: &str,
) -> Result<CurrentUser, ApiError> {
    let claims = resources.signer.verify(bearer).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        ApiError::Unauthenticated
    })?;

    let token = resources
        .tokens
        .find(&claims.jti)
        .await?
        .filter(|t| t.is_valid() && t.user_id.as_deref() == Some(claims.sub.as_str()))
        .ok_or(ApiError::Unauthenticated)?;

    let user = user::Entity::find_by_id(claims.sub)
        .one(resources.db.as_ref())
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(CurrentUser {
        user,
        credential: Credential::Token(token),
    })
}

async fn authenticate_session(
    resources: &AppResources,
    session_id: &str,
) -> Result<CurrentUser, ApiError> {
    let session = session::Entity::find_by_id(session_id.to_string())
        .one(resources.db.as_ref())
        .await?
        .filter(|s| !s.is_expired())
        .ok_or(ApiError::Unauthenticated)?;

    let user = user::Entity::find_by_id(session.user_id.clone())
        .one(resources.db.as_ref())
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(CurrentUser {
        user,
        credential: Credential::Session(session),
    })
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;

        if let Some(bearer) = bearer_token(&parts.headers) {
            return authenticate_token(&resources, &bearer).await;
        }
        if let Some(session_id) = extract_session_id(&parts.headers) {
            return authenticate_session(&resources, &session_id).await;
        }
        Err(ApiError::Unauthenticated)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <CurrentUser as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(Some(user)),
            Err(ApiError::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// The client address. `X-Forwarded-For` is only believed when the socket
/// peer is one of the trusted proxies; the left-most entry is the client.
fn client_ip(parts: &Parts, trusted_proxies: &[IpAddr]) -> Option<IpAddr> {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let behind_proxy = peer.is_some_and(|ip| trusted_proxies.contains(&ip));
    if !behind_proxy {
        return peer;
    }

    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or(peer)
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trusted_proxies = parts
            .extensions
            .get::<AppResources>()
            .map(|r| r.config.trusted_proxies.clone())
            .unwrap_or_default();
        Ok(RequestContext {
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ip: client_ip(parts, &trusted_proxies),
            user_id: None,
        })
    }
}

/// Request input read from a JSON body, a form body or the query string.
///
/// An empty JSON body reads as `{}`, so handlers validate missing fields
/// instead of failing on the body.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

fn invalid_body(detail: &str) -> ApiError {
    tracing::debug!(detail, "unreadable request body");
    ValidationErrors::field("body", Message::new("validation.invalid_body")).into()
}

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        match content_type.as_deref() {
            Some(ct) if ct.starts_with("application/json") || ct.contains("+json") => {
                let bytes = Bytes::from_request(req, state)
                    .await
                    .map_err(|e| invalid_body(&e.body_text()))?;
                let source: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
                    b"{}"
                } else {
                    &bytes[..]
                };
                serde_json::from_slice(source)
                    .map(Payload)
                    .map_err(|e| invalid_body(&e.to_string()))
            }
            Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
                let Form(value) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| invalid_body(&e.body_text()))?;
                Ok(Payload(value))
            }
            _ => {
                let Query(value) =
                    Query::<T>::try_from_uri(req.uri()).map_err(|e| invalid_body(&e.body_text()))?;
                Ok(Payload(value))
            }
        }
    }
}

/// Open a browser session for `user_id` and redirect to `to`.
pub(crate) async fn start_session(
    resources: &AppResources,
    user_id: &str,
    to: &str,
) -> Result<Response, ApiError> {
    let now = OffsetDateTime::now_utc();
    let session = session::ActiveModel {
        id: Set(generate_token()?),
        user_id: Set(user_id.to_string()),
        created_at: Set(now),
        expires_at: Set(now + Duration::seconds(SESSION_LIFETIME_SECONDS)),
    }
    .insert(resources.db.as_ref())
    .await?;

    tracing::info!(user_id, "session started");

    let mut response = Redirect::to(to).into_response();
    set_cookie(
        response.headers_mut(),
        &session_cookie(&session.id, resources.config.environment.is_production()),
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(bearer_token(&headers).is_none());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }

    fn parts_from(peer: [u8; 4], forwarded: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder();
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from((peer, 9000))));
        parts
    }

    #[test]
    fn forwarded_for_is_ignored_from_untrusted_peers() {
        let parts = parts_from([198, 51, 100, 4], Some("203.0.113.7"));
        assert_eq!(client_ip(&parts, &[]), Some("198.51.100.4".parse().unwrap()));

        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            client_ip(&parts, &[proxy]),
            Some("198.51.100.4".parse().unwrap())
        );
    }

    #[test]
    fn trusted_proxy_forwards_the_client_address() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let parts = parts_from([10, 0, 0, 1], Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&parts, &[proxy]), Some("203.0.113.7".parse().unwrap()));

        let parts = parts_from([10, 0, 0, 1], None);
        assert_eq!(client_ip(&parts, &[proxy]), Some(proxy));
    }
}
