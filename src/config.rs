// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All settings come from environment variables, read once at startup by
//! [`AppConfig::from_env`]. Invalid values abort startup with a
//! [`ConfigError`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `points.redb` | `./data` |
//! | `APP_ENV` | `development` enables dev mode | `production` |
//! | `JWT_SECRET` | HS256 secret for bearer tokens | Required outside dev mode |
//! | `DEFAULT_POINTS` | Cost of unpriced resources | `0` |
//! | `TX_TIMEOUT_MS` | Deadline of one engine transaction | `5000` |
//! | `NEGATIVE_GRANT_POLICY` | `reject` or `clamp` | `reject` |
//! | `LEDGER_MAX_LIMIT` | Largest ledger page | `500` |
//! | `OPERATOR_API_KEY` | Key for site management (`X-API-Key`) | Unset: endpoints disabled |
//! | `DOWNLOAD_BASE_URL` | Storage backend link prefix | `http://127.0.0.1:5244/d/` |
//! | `DOWNLOAD_SIGNING_KEY` | HMAC key for download links | Unset: unsigned links |
//! | `DOWNLOAD_URL_TTL_SECS` | Download link lifetime | `300` |
//! | `LOG_FORMAT` | `json`, `pretty` or `compact` | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{EngineSettings, NegativeGrantPolicy};
use crate::logging::LogFormat;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Directory of the embedded database. Created on startup if missing.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const APP_ENV_ENV: &str = "APP_ENV";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const DEFAULT_POINTS_ENV: &str = "DEFAULT_POINTS";
pub const TX_TIMEOUT_MS_ENV: &str = "TX_TIMEOUT_MS";
pub const NEGATIVE_GRANT_POLICY_ENV: &str = "NEGATIVE_GRANT_POLICY";
pub const LEDGER_MAX_LIMIT_ENV: &str = "LEDGER_MAX_LIMIT";
pub const OPERATOR_API_KEY_ENV: &str = "OPERATOR_API_KEY";
pub const DOWNLOAD_BASE_URL_ENV: &str = "DOWNLOAD_BASE_URL";
pub const DOWNLOAD_SIGNING_KEY_ENV: &str = "DOWNLOAD_SIGNING_KEY";
pub const DOWNLOAD_URL_TTL_SECS_ENV: &str = "DOWNLOAD_URL_TTL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "http://127.0.0.1:5244/d/";
/// File name of the database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "points.redb";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set outside development mode")]
    Missing(&'static str),
}

/// Deployment mode selected by `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Production,
    Development,
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(AppEnv::Production),
            "development" | "dev" => Ok(AppEnv::Development),
            other => Err(format!("expected production or development, got {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub app_env: AppEnv,
    pub jwt_secret: Option<String>,
    pub operator_api_key: Option<String>,
    pub engine: EngineSettings,
    pub download_base_url: String,
    pub download_signing_key: Option<String>,
    pub download_url_ttl: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let app_env: AppEnv = parse_or(&get, APP_ENV_ENV, AppEnv::Production)?;
        let jwt_secret = get(JWT_SECRET_ENV);
        if jwt_secret.is_none() && app_env == AppEnv::Production {
            return Err(ConfigError::Missing(JWT_SECRET_ENV));
        }

        let default_cost: i64 = parse_or(&get, DEFAULT_POINTS_ENV, 0)?;
        if default_cost < 0 {
            return Err(invalid(DEFAULT_POINTS_ENV, default_cost, "must not be negative"));
        }
        let timeout_ms: u64 = parse_or(&get, TX_TIMEOUT_MS_ENV, 5000)?;
        if timeout_ms == 0 {
            return Err(invalid(TX_TIMEOUT_MS_ENV, timeout_ms, "must be positive"));
        }
        let max_ledger_limit: usize = parse_or(&get, LEDGER_MAX_LIMIT_ENV, 500)?;
        if max_ledger_limit == 0 {
            return Err(invalid(LEDGER_MAX_LIMIT_ENV, max_ledger_limit, "must be positive"));
        }

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, PORT_ENV, 8080)?,
            data_dir: get(DATA_DIR_ENV).map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            app_env,
            jwt_secret,
            operator_api_key: get(OPERATOR_API_KEY_ENV),
            engine: EngineSettings {
                default_cost,
                transaction_timeout: Duration::from_millis(timeout_ms),
                negative_grant: parse_or(&get, NEGATIVE_GRANT_POLICY_ENV, NegativeGrantPolicy::Reject)?,
                max_ledger_limit,
            },
            download_base_url: get(DOWNLOAD_BASE_URL_ENV)
                .unwrap_or_else(|| DEFAULT_DOWNLOAD_BASE_URL.to_string()),
            download_signing_key: get(DOWNLOAD_SIGNING_KEY_ENV),
            download_url_ttl: Duration::from_secs(parse_or(&get, DOWNLOAD_URL_TTL_SECS_ENV, 300)?),
            log_format: parse_or(&get, LOG_FORMAT_ENV, LogFormat::Pretty)?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == AppEnv::Development
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn invalid(var: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
