use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

/// Resolve the database the same way the server does: `config.yaml` with
/// environment overrides on top.
fn database_url() -> Result<String, config::ConfigError> {
    Config::builder()
        .add_source(config::File::with_name("config.yaml").required(false))
        .add_source(config::Environment::default().separator("__"))
        .build()?
        .get_string("database_url")
}

#[tokio::main]
async fn main() {
    if env::var("DATABASE_URL").is_err() {
        match database_url() {
            Ok(url) => env::set_var("DATABASE_URL", url),
            Err(e) => eprintln!("no database_url configured, pass --database-url: {e}"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
