//! Login, logout and refresh over HTTP.

mod common;

use auth_api::config::ThrottleConfig;
use auth_api::entity::{oauth_access_token, oauth_refresh_token, session};
use auth_api::oauth2::TokenSigner;
use common::{EMAIL, PASSWORD, spawn, spawn_with};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{Value, json};

#[tokio::test]
async fn json_login_returns_token_envelope() {
    let app = spawn().await;
    let user = app.create_user(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/login")
        .add_header("accept", "application/json")
        .add_header("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .json(&json!({ "email": "Jane@Example.com", "password": PASSWORD }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["error"], false);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 3600);
    assert!(body["data"]["refresh_token"].as_str().is_some());

    let claims = TokenSigner::new(app.resources.config.token_secret.as_bytes())
        .verify(body["data"]["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.sub, user.id);

    let token = oauth_access_token::Entity::find_by_id(claims.jti)
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let details: Value = serde_json::from_str(token.client_details.as_deref().unwrap()).unwrap();
    assert_eq!(details["client"]["name"], "Chrome");
}

#[tokio::test]
async fn login_validation_lists_fields_in_order() {
    let app = spawn().await;

    let response = app
        .server
        .post("/login")
        .add_header("accept", "application/json")
        .json(&json!({ "email": "not-an-email" }))
        .await;

    response.assert_status_unprocessable_entity();
    let body: Value = response.json();
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Please, check the input data.");
    assert_eq!(
        body["data"],
        json!([
            {"field": "email", "message": "The email must be a valid email address."},
            {"field": "password", "message": "The password field is required."}
        ])
    );
}

#[tokio::test]
async fn wrong_password_is_an_oauth_error() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/login")
        .add_header("accept", "application/json")
        .json(&json!({ "email": EMAIL, "password": "wrong-password" }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "The user credentials were incorrect.");
    assert_eq!(body["data"]["error"], "invalid_grant");
}

#[tokio::test]
async fn messages_follow_accept_language() {
    let app = spawn().await;

    let response = app
        .server
        .post("/login")
        .add_header("accept", "application/json")
        .add_header("accept-language", "pt-BR,pt;q=0.9,en;q=0.8")
        .json(&json!({ "email": EMAIL }))
        .await;

    response.assert_status_unprocessable_entity();
    let body: Value = response.json();
    assert_eq!(body["message"], "Por favor, verifique os dados informados.");
    assert_eq!(body["data"][0]["message"], "O campo password é obrigatório.");
}

#[tokio::test]
async fn repeated_failures_are_throttled() {
    let mut config = common::config();
    config.throttle = ThrottleConfig {
        max_attempts: 2,
        decay_seconds: 60,
    };
    let app = spawn_with(config).await;
    app.create_user(EMAIL, PASSWORD).await;

    for _ in 0..2 {
        app.server
            .post("/login")
            .add_header("accept", "application/json")
            .json(&json!({ "email": EMAIL, "password": "wrong-password" }))
            .await
            .assert_status_bad_request();
    }

    // even the right password is refused while locked out
    let response = app
        .server
        .post("/login")
        .add_header("accept", "application/json")
        .json(&json!({ "email": EMAIL, "password": PASSWORD }))
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
    let body: Value = response.json();
    assert_eq!(body["error"], true);
    assert!(body["data"]["retry_after"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn forwarded_for_from_untrusted_peer_does_not_reset_throttle() {
    let mut config = common::config();
    config.throttle = ThrottleConfig {
        max_attempts: 2,
        decay_seconds: 60,
    };
    let app = spawn_with(config).await;
    app.create_user(EMAIL, PASSWORD).await;

    let mut statuses = Vec::new();
    for i in 0..4 {
        let response = app
            .server
            .post("/login")
            .add_header("accept", "application/json")
            .add_header("x-forwarded-for", format!("10.0.0.{i}"))
            .json(&json!({ "email": EMAIL, "password": "wrong-password" }))
            .await;
        statuses.push(response.status_code().as_u16());
    }

    assert_eq!(statuses, vec![400, 400, 429, 429]);
}

#[tokio::test]
async fn logout_revokes_and_deletes_token() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;
    let tokens = app.login(EMAIL, PASSWORD).await;
    let access_token = tokens["access_token"].as_str().unwrap();
    let claims = TokenSigner::new(app.resources.config.token_secret.as_bytes())
        .verify(access_token)
        .unwrap();

    let response = app
        .server
        .post("/logout")
        .add_header("accept", "application/json")
        .authorization_bearer(access_token)
        .json(&json!({ "jti": claims.jti }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({"error": false, "message": "Ok"}));

    let remaining = oauth_access_token::Entity::find_by_id(claims.jti.clone())
        .one(app.db.as_ref())
        .await
        .unwrap();
    assert!(remaining.is_none());
    let refresh_rows = oauth_refresh_token::Entity::find()
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(refresh_rows, 0);

    // the revoked token no longer authenticates
    app.server
        .post("/logout")
        .add_header("accept", "application/json")
        .authorization_bearer(access_token)
        .json(&json!({ "jti": claims.jti }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn logout_with_unknown_jti_is_a_noop() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;
    let tokens = app.login(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/logout")
        .add_header("accept", "application/json")
        .authorization_bearer(tokens["access_token"].as_str().unwrap())
        .json(&json!({ "jti": "does-not-exist" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Ok");
    let tokens = oauth_access_token::Entity::find()
        .count(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(tokens, 1);
}

#[tokio::test]
async fn logout_requires_authentication() {
    let app = spawn().await;

    let response = app
        .server
        .post("/logout")
        .add_header("accept", "application/json")
        .json(&json!({ "jti": "anything" }))
        .await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body, json!({"error": true, "message": "Unauthenticated."}));
}

#[tokio::test]
async fn refresh_issues_new_pair() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;
    let tokens = app.login(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/refresh")
        .add_header("accept", "application/json")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["error"], false);
    assert_ne!(body["data"]["refresh_token"], tokens["refresh_token"]);

    let reused = app
        .server
        .post("/refresh")
        .add_header("accept", "application/json")
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .await;
    reused.assert_status_bad_request();
    let body: Value = reused.json();
    assert_eq!(body["message"], "The refresh token is invalid.");
    assert_eq!(body["data"]["hint"], "Token has been revoked");
}

#[tokio::test]
async fn refresh_without_token_is_invalid_request() {
    let app = spawn().await;

    let response = app
        .server
        .post("/refresh")
        .add_header("accept", "application/json")
        .json(&json!({}))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["data"]["error"], "invalid_request");
    assert_eq!(body["data"]["hint"], "Check the `refresh_token` parameter");
}

#[tokio::test]
async fn session_login_sets_cookie_and_redirects() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/login")
        .form(&[("email", EMAIL), ("password", PASSWORD)])
        .await;

    response.assert_status_see_other();
    assert_eq!(response.headers()["location"], "/home");
    let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));
    assert_eq!(
        session::Entity::find().count(app.db.as_ref()).await.unwrap(),
        1
    );

    let session_cookie = cookie.split(';').next().unwrap().to_string();
    let response = app
        .server
        .post("/logout")
        .add_header("cookie", session_cookie.as_str())
        .await;
    response.assert_status_see_other();
    assert_eq!(response.headers()["location"], "/");
    assert!(
        response.headers()["set-cookie"]
            .to_str()
            .unwrap()
            .contains("Max-Age=0")
    );
    assert_eq!(
        session::Entity::find().count(app.db.as_ref()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn session_login_failure_is_a_field_error() {
    let app = spawn().await;
    app.create_user(EMAIL, PASSWORD).await;

    let response = app
        .server
        .post("/login")
        .form(&[("email", EMAIL), ("password", "wrong-password")])
        .await;

    response.assert_status_unprocessable_entity();
    assert_eq!(response.text(), "Please, check the input data.");
}
