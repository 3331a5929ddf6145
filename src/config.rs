use std::{env, net::SocketAddr, str::FromStr};

use log::LevelFilter;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Environment variable {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogRotation {
    Never,
    Daily,
}

/// Process configuration, read once at startup and handed to the components that need it.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_address: SocketAddr,
    pub pool_min_idle: u32,
    pub pool_max_size: u32,
    pub smtp: SmtpConfig,
    pub admin_api_key: Option<String>,
    pub revoke_previous_on_issue: bool,
    pub max_upload_bytes: u64,
    pub log_level: LevelFilter,
    pub log_file: String,
    pub log_rotation: LogRotation,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let smtp_username = required("SMTP_USERNAME")?;
        let smtp = SmtpConfig {
            host: var("SMTP_HOST").unwrap_or_else(|| String::from("smtp.gmail.com")),
            port: parse_or(&var, "SMTP_PORT", 587)?,
            password: required("SMTP_PASSWORD")?,
            from: var("MAIL_FROM").unwrap_or_else(|| smtp_username.clone()),
            username: smtp_username,
        };

        let log_rotation = match var("LOG_ROTATION").as_deref() {
            None | Some("never") => LogRotation::Never,
            Some("daily") => LogRotation::Daily,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_ROTATION",
                    value: other.to_owned(),
                })
            }
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_address: parse_or(&var, "BIND_ADDRESS", SocketAddr::from(([127, 0, 0, 1], 8000)))?,
            pool_min_idle: parse_or(&var, "DB_POOL_MIN_IDLE", 10)?,
            pool_max_size: parse_or(&var, "DB_POOL_MAX_SIZE", 50)?,
            smtp,
            admin_api_key: var("ADMIN_API_KEY"),
            revoke_previous_on_issue: parse_or(&var, "REVOKE_PREVIOUS_ON_ISSUE", false)?,
            max_upload_bytes: parse_or(&var, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            log_level: parse_or(&var, "LOG_LEVEL", LevelFilter::Info)?,
            log_file: var("LOG_FILE").unwrap_or_else(|| String::from("debug.log")),
            log_rotation,
        })
    }
}

fn parse_or<T, V>(var: &V, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    V: Fn(&'static str) -> Option<String>,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
