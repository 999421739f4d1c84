// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded once from the environment at startup and is
//! immutable afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_AZURE_TENANT_ID` | Azure AD tenant id | Required |
//! | `AUTH_AZURE_CLIENT_ID` | Application (client) id | Required |
//! | `AUTH_ALGORITHM` | Accepted JWS algorithm (`RS256`, `RS384`, `RS512`) | `RS256` |
//! | `AUTH_CLOCK_SKEW_SECONDS` | Clock skew tolerance, at most 600 | `60` |
//! | `AUTH_AUTHORITY_URL` | Base URL of the key discovery endpoint | `https://login.microsoftonline.com` |
//! | `AUTH_ISSUER_BASE_URL` | Base of the expected `iss` claim | `https://sts.windows.net` |
//! | `JWKS_CACHE_TTL_SECONDS` | Key set freshness | `600` |
//! | `JWKS_STALE_GRACE_SECONDS` | How long past the TTL stale keys may be served | `3600` |
//! | `JWKS_FETCH_TIMEOUT_SECONDS` | Per-fetch timeout | `5` |
//! | `JWKS_RETRY_BACKOFF_SECONDS` | After a failed fetch, serve stale keys without refetching for this long | `30` |
//! | `JWKS_REFRESH_INTERVAL_SECONDS` | Background refresh period, `0` disables | `300` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8000` |
//! | `OPENAI_API_KEY` | Enables the vision extraction pipeline | Optional |
//! | `OPENAI_API_URL` | Chat-completions endpoint | `https://api.openai.com/v1/chat/completions` |
//! | `OPENAI_MODEL` | Vision model name | `gpt-4o` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::auth::jwks::CachePolicy;
use crate::auth::validator::{SigningAlgorithm, ValidationSettings};
use crate::auth::TenantId;

pub const TENANT_ID_ENV: &str = "AUTH_AZURE_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "AUTH_AZURE_CLIENT_ID";

pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_ISSUER_BASE_URL: &str = "https://sts.windows.net";
pub const DEFAULT_CLOCK_SKEW_SECONDS: u64 = 60;
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 600;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;
pub const DEFAULT_STALE_GRACE_SECONDS: u64 = 3600;
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_RETRY_BACKOFF_SECONDS: u64 = 30;
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 300;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Vision pipeline settings, present only when an API key is configured.
#[derive(Clone)]
pub struct VisionSettings {
    pub api_key: String,
    pub api_url: Url,
    pub model: String,
}

impl fmt::Debug for VisionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionSettings")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url.as_str())
            .field("model", &self.model)
            .finish()
    }
}

/// Service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tenant_id: TenantId,
    pub client_id: String,
    pub algorithm: SigningAlgorithm,
    pub clock_skew: Duration,
    pub authority_url: Url,
    pub issuer_base_url: String,
    pub cache_policy: CachePolicy,
    /// `None` when background refresh is disabled.
    pub refresh_interval: Option<Duration>,
    pub host: String,
    pub port: u16,
    /// `None` when no API key is configured.
    pub vision: Option<VisionSettings>,
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load settings from a map of variables (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let tenant_id = TenantId::new(required(vars, TENANT_ID_ENV)?);
        let client_id = required(vars, CLIENT_ID_ENV)?;

        let algorithm = match optional(vars, "AUTH_ALGORITHM") {
            Some(value) => value
                .parse::<SigningAlgorithm>()
                .map_err(|reason| ConfigError::invalid("AUTH_ALGORITHM", reason))?,
            None => SigningAlgorithm::RS256,
        };

        let clock_skew_seconds =
            seconds(vars, "AUTH_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW_SECONDS)?;
        if clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(ConfigError::invalid(
                "AUTH_CLOCK_SKEW_SECONDS",
                format!("must not exceed {MAX_CLOCK_SKEW_SECONDS} seconds, got {clock_skew_seconds}"),
            ));
        }

        let authority_url = url(
            vars,
            "AUTH_AUTHORITY_URL",
            DEFAULT_AUTHORITY_URL,
        )?;

        let issuer_base_url = optional(vars, "AUTH_ISSUER_BASE_URL")
            .unwrap_or(DEFAULT_ISSUER_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let ttl = seconds(vars, "JWKS_CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS)?;
        if ttl == 0 {
            return Err(ConfigError::invalid(
                "JWKS_CACHE_TTL_SECONDS",
                "must be greater than 0",
            ));
        }
        let stale_grace = seconds(vars, "JWKS_STALE_GRACE_SECONDS", DEFAULT_STALE_GRACE_SECONDS)?;
        let fetch_timeout = seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
        )?;
        if fetch_timeout == 0 {
            return Err(ConfigError::invalid(
                "JWKS_FETCH_TIMEOUT_SECONDS",
                "must be greater than 0",
            ));
        }

        let retry_backoff = seconds(
            vars,
            "JWKS_RETRY_BACKOFF_SECONDS",
            DEFAULT_RETRY_BACKOFF_SECONDS,
        )?;

        let refresh_seconds = seconds(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_REFRESH_INTERVAL_SECONDS,
        )?;
        let refresh_interval = (refresh_seconds > 0).then(|| Duration::from_secs(refresh_seconds));

        let host = optional(vars, "HOST").unwrap_or(DEFAULT_HOST).to_string();
        let port = match optional(vars, "PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| {
                ConfigError::invalid("PORT", format!("must be a valid port, got '{value}': {e}"))
            })?,
            None => DEFAULT_PORT,
        };

        let vision = match optional(vars, "OPENAI_API_KEY") {
            Some(api_key) => Some(VisionSettings {
                api_key: api_key.to_string(),
                api_url: url(vars, "OPENAI_API_URL", DEFAULT_OPENAI_API_URL)?,
                model: optional(vars, "OPENAI_MODEL")
                    .unwrap_or(DEFAULT_OPENAI_MODEL)
                    .to_string(),
            }),
            None => None,
        };

        let log_format = match optional(vars, "LOG_FORMAT") {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "LOG_FORMAT",
                    format!("expected 'json' or 'pretty', got '{other}'"),
                ))
            }
        };

        Ok(Settings {
            tenant_id,
            client_id,
            algorithm,
            clock_skew: Duration::from_secs(clock_skew_seconds),
            authority_url,
            issuer_base_url,
            cache_policy: CachePolicy {
                ttl: Duration::from_secs(ttl),
                stale_grace: Duration::from_secs(stale_grace),
                fetch_timeout: Duration::from_secs(fetch_timeout),
                retry_backoff: Duration::from_secs(retry_backoff),
            },
            refresh_interval,
            host,
            port,
            vision,
            log_format,
        })
    }

    /// Expected `iss` claim: `{issuer_base}/{tenant}/`.
    pub fn issuer(&self) -> String {
        format!("{}/{}/", self.issuer_base_url, self.tenant_id)
    }

    /// Expected `aud` claim: `api://{client_id}`.
    pub fn audience(&self) -> String {
        format!("api://{}", self.client_id)
    }

    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            tenant: self.tenant_id.clone(),
            algorithm: self.algorithm,
            issuer: self.issuer(),
            audience: self.audience(),
            clock_skew: self.clock_skew,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A variable that is set and non-blank.
fn optional<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn seconds(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match optional(vars, name) {
        Some(value) => value.parse::<u64>().map_err(|e| {
            ConfigError::invalid(
                name,
                format!("must be a non-negative integer, got '{value}': {e}"),
            )
        }),
        None => Ok(default),
    }
}

fn url(vars: &HashMap<String, String>, name: &str, default: &str) -> Result<Url, ConfigError> {
    let value = optional(vars, name).unwrap_or(default);
    Url::parse(value)
        .map_err(|e| ConfigError::invalid(name, format!("not a valid URL '{value}': {e}")))
}
