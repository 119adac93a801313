use crate::config::AppConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::info;

/// Shared connection handle used by all services.
pub type DbPool = DatabaseConnection;

/// Establishes the database connection with pool settings tuned for a small
/// storefront workload.
pub async fn connect(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!(url = %redact(&config.database_url), "database connected");
    Ok(db)
}

/// Strips credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match url.split_once('@') {
        Some((scheme_and_creds, rest)) => match scheme_and_creds.split_once("://") {
            Some((scheme, _)) => format!("{}://***@{}", scheme, rest),
            None => format!("***@{}", rest),
        },
        None => url.to_string(),
    }
}
