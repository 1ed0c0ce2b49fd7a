use auth_api::AppResources;
use auth_api::api::start_webserver;
use auth_api::config::load_config_or_panic;
use auth_api::mail::SmtpMailer;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "auth_api=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    initialize_tracing();

    let config = Arc::new(load_config_or_panic());
    tracing::info!(
        environment = ?config.environment,
        locales = ?config.locales,
        max_attempts = config.throttle.max_attempts,
        trusted_proxies = ?config.trusted_proxies,
        "configuration loaded"
    );

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);

    let resources = AppResources::new(db, config, mailer)?;
    start_webserver(resources).await
}
