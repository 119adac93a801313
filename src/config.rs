use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Application configuration, loaded from `config/*.toml` files with
/// `APP_`-prefixed environment overrides and validated at startup.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (persisted notification feed)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// JWT secret key used to validate bearer tokens
    #[validate(length(min = 32, message = "jwt_secret must be at least 32 characters"))]
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds (dev token mint)
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: i64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Payment gateway key id (public, handed to the storefront)
    #[serde(default = "default_gateway_key_id")]
    pub razorpay_key_id: String,

    /// Payment gateway integration secret (signature verification, refunds)
    #[serde(default = "default_gateway_key_secret")]
    pub razorpay_key_secret: String,

    /// FCM server key; push notifications are skipped when absent
    #[serde(default)]
    pub fcm_server_key: Option<String>,

    /// Address that receives order/cancellation mails
    #[serde(default = "default_admin_email")]
    pub admin_email: String,

    /// Days after delivery during which a return/replacement may be requested
    #[serde(default = "default_return_window_days")]
    pub return_window_days: i64,

    /// Whether approving a replacement restores the returned items' stock.
    /// Default mirrors the historical behavior: an assumed swap, no net change.
    #[serde(default)]
    pub replacement_restocks_stock: bool,

    /// Outbox worker poll interval (milliseconds)
    #[serde(default = "default_outbox_poll_ms")]
    pub outbox_poll_interval_ms: u64,

    /// Outbox worker claim batch size
    #[serde(default = "default_outbox_batch")]
    pub outbox_batch_size: u64,

    /// Outbox delivery attempts before an event is marked failed
    #[serde(default = "default_outbox_max_attempts")]
    pub outbox_max_attempts: i32,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_jwt_secret() -> String {
    DEV_DEFAULT_JWT_SECRET.to_string()
}

fn default_jwt_expiration() -> i64 {
    60 * 60
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_gateway_key_id() -> String {
    "rzp_test_key".to_string()
}

fn default_gateway_key_secret() -> String {
    "rzp_test_secret".to_string()
}

fn default_admin_email() -> String {
    "orders@vastra.example".to_string()
}

fn default_return_window_days() -> i64 {
    7
}

fn default_outbox_poll_ms() -> u64 {
    500
}

fn default_outbox_batch() -> u64 {
    50
}

fn default_outbox_max_attempts() -> i32 {
    8
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads configuration from layered sources: `config/default.toml`, then
/// `config/{environment}.toml`, then `APP_*` environment variables.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let settings = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment.clone())?
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;

    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    if config.is_production() && config.jwt_secret == DEV_DEFAULT_JWT_SECRET {
        return Err(ConfigError::Message(
            "refusing to start in production with the development jwt_secret".into(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            redis_url: default_redis_url(),
            jwt_secret: default_jwt_secret(),
            jwt_expiration: default_jwt_expiration(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            razorpay_key_id: default_gateway_key_id(),
            razorpay_key_secret: default_gateway_key_secret(),
            fcm_server_key: None,
            admin_email: default_admin_email(),
            return_window_days: default_return_window_days(),
            replacement_restocks_stock: false,
            outbox_poll_interval_ms: default_outbox_poll_ms(),
            outbox_batch_size: default_outbox_batch(),
            outbox_max_attempts: default_outbox_max_attempts(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = minimal();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn server_addr_formats_host_and_port() {
        let mut cfg = minimal();
        cfg.host = "127.0.0.1".into();
        cfg.port = 3001;
        assert_eq!(cfg.server_addr(), "127.0.0.1:3001");
    }
}
