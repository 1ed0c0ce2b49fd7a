//! Shared fixtures: an in-memory database, a mailer that records instead of
//! sending, and a test server wired like production.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_api::{
    AppResources,
    api::router,
    config::{
        AppConfig, CorsConfig, Environment, PasswordClientConfig, SmtpConfig, ThrottleConfig,
        TokenConfig,
    },
    entity::{oauth_client, user},
    mail::{MailError, Mailer, OutgoingMail},
    oauth2::{AuthorizationServer, hash_password},
};
use axum_test::TestServer;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

pub const CLIENT_ID: &str = "first-party";
pub const CLIENT_SECRET: &str = "client-secret";
pub const EMAIL: &str = "jane@example.com";
pub const PASSWORD: &str = "password123";

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<OutgoingMail> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub fn config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        environment: Environment::Production,
        app_url: "http://localhost".into(),
        home_path: "/home".into(),
        token_secret: "0123456789abcdef0123456789abcdef".into(),
        password_client: PasswordClientConfig {
            client_id: CLIENT_ID.into(),
            client_secret: CLIENT_SECRET.into(),
        },
        tokens: TokenConfig::default(),
        locales: vec!["en".into(), "pt".into()],
        cors: CorsConfig::default(),
        throttle: ThrottleConfig::default(),
        trusted_proxies: vec![],
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 25,
            username: "user".into(),
            password: "pass".into(),
            from: "noreply@example.com".into(),
        },
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<RecordingMailer>,
    pub resources: AppResources,
}

pub async fn spawn() -> TestApp {
    spawn_with(config()).await
}

pub async fn spawn_with(config: AppConfig) -> TestApp {
    spawn_configured(config, None).await
}

/// Like [`spawn`], but token requests go to `auth_server`.
pub async fn spawn_with_auth_server(auth_server: Arc<dyn AuthorizationServer>) -> TestApp {
    spawn_configured(config(), Some(auth_server)).await
}

async fn spawn_configured(
    config: AppConfig,
    auth_server: Option<Arc<dyn AuthorizationServer>>,
) -> TestApp {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    let db = Arc::new(db);

    let now = OffsetDateTime::now_utc();
    oauth_client::ActiveModel {
        id: Set(CLIENT_ID.into()),
        secret: Set(Some(CLIENT_SECRET.into())),
        name: Set("First party".into()),
        password_client: Set(true),
        revoked: Set(false),
        created_at: Set(now),
    }
    .insert(db.as_ref())
    .await
    .expect("insert client");

    let mailer = Arc::new(RecordingMailer::default());
    let mut resources = AppResources::new(db.clone(), Arc::new(config), mailer.clone())
        .expect("resources");
    if let Some(auth_server) = auth_server {
        resources = resources.with_auth_server(auth_server);
    }
    let server = TestServer::new(router(resources.clone())).expect("create test server");

    TestApp {
        server,
        db,
        mailer,
        resources,
    }
}

impl TestApp {
    pub async fn create_user(&self, email: &str, password: &str) -> user::Model {
        let now = OffsetDateTime::now_utc();
        user::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set("Jane".into()),
            email: Set(email.into()),
            password_hash: Set(hash_password(password).expect("hash")),
            email_verified_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert user")
    }

    /// Log in as JSON and return the `data` payload with the token pair.
    pub async fn login(&self, email: &str, password: &str) -> Value {
        let response = self
            .server
            .post("/login")
            .add_header("accept", "application/json")
            .json(&json!({ "email": email, "password": password }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["data"].clone()
    }
}
