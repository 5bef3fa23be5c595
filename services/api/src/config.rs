//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use visnovel_core::pagination::{PaginationSettings, PastEndPolicy, DEFAULT_WORDS_PER_PAGE};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for Cloudflare Workers AI image generation.
#[derive(Clone, Debug)]
pub struct CloudflareCredentials {
    pub account_id: String,
    pub api_token: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Root directory for uploaded novels and generated images.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub pagination: PaginationSettings,
    pub index_cache_capacity: usize,
    pub summary_cache_capacity: usize,
    pub openai_api_key: Option<String>,
    pub summary_model: String,
    pub cloudflare: Option<CloudflareCredentials>,
    /// Base URL used when building share links.
    pub frontend_url: String,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        // --- Server and Database Settings ---
        let bind_address: SocketAddr =
            parse_or(&var, "BIND_ADDRESS", "0.0.0.0:5000".parse().ok())?;

        let database_url =
            var("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let upload_dir = var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));
        let max_upload_bytes = parse_or(&var, "MAX_UPLOAD_BYTES", Some(50 * 1024 * 1024))?;

        // --- Pagination ---
        let words_per_page: usize = parse_or(&var, "WORDS_PER_PAGE", Some(DEFAULT_WORDS_PER_PAGE))?;
        if words_per_page == 0 {
            return Err(ConfigError::InvalidValue(
                "WORDS_PER_PAGE".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let past_end = match var("PAST_END_POLICY") {
            Some(value) => PastEndPolicy::parse(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PAST_END_POLICY".to_string(),
                    format!("'{}' is not one of empty, reject", value),
                )
            })?,
            None => PastEndPolicy::default(),
        };
        let parse_timeout_secs: u64 = parse_or(&var, "EPUB_PARSE_TIMEOUT_SECS", Some(30))?;
        let pagination = PaginationSettings {
            words_per_page,
            past_end,
            parse_timeout: Duration::from_secs(parse_timeout_secs),
        };

        let index_cache_capacity = parse_or(&var, "INDEX_CACHE_CAPACITY", Some(64))?;
        let summary_cache_capacity = parse_or(&var, "SUMMARY_CACHE_CAPACITY", Some(1000))?;

        // --- AI Providers (optional) ---
        let openai_api_key = var("OPENAI_API_KEY");
        let summary_model = var("SUMMARY_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let cloudflare = match (var("CLOUDFLARE_ACCOUNT_ID"), var("CLOUDFLARE_API_TOKEN")) {
            (Some(account_id), Some(api_token)) => Some(CloudflareCredentials {
                account_id,
                api_token,
            }),
            _ => None,
        };

        // --- Client-facing URLs ---
        let frontend_url = var("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let cors_origin = var("CORS_ORIGIN").unwrap_or_else(|| frontend_url.clone());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            upload_dir,
            max_upload_bytes,
            pagination,
            index_cache_capacity,
            summary_cache_capacity,
            openai_api_key,
            summary_model,
            cloudflare,
            frontend_url,
            cors_origin,
        })
    }

    pub fn novels_dir(&self) -> PathBuf {
        self.upload_dir.join("novels")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.upload_dir.join("images")
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/novels")]).unwrap();
        assert_eq!(config.bind_address.port(), 5000);
        assert_eq!(config.pagination.words_per_page, 600);
        assert_eq!(config.pagination.past_end, PastEndPolicy::Empty);
        assert_eq!(config.pagination.parse_timeout, Duration::from_secs(30));
        assert_eq!(config.index_cache_capacity, 64);
        assert_eq!(config.summary_cache_capacity, 1000);
        assert_eq!(config.upload_dir, PathBuf::from("./uploads"));
        assert!(config.cloudflare.is_none());
        assert_eq!(config.cors_origin, "http://localhost:3000");
    }

    #[test]
    fn database_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(key) if key == "DATABASE_URL"));
    }

    #[test]
    fn pagination_settings_are_read() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("WORDS_PER_PAGE", "250"),
            ("PAST_END_POLICY", "reject"),
            ("EPUB_PARSE_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.pagination.words_per_page, 250);
        assert_eq!(config.pagination.past_end, PastEndPolicy::Reject);
        assert_eq!(config.pagination.parse_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_values_are_reported_by_key() {
        let err = load(&[("DATABASE_URL", "postgres://db"), ("WORDS_PER_PAGE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "WORDS_PER_PAGE"));

        let err = load(&[("DATABASE_URL", "postgres://db"), ("PAST_END_POLICY", "wrap")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "PAST_END_POLICY"));

        let err = load(&[("DATABASE_URL", "postgres://db"), ("RUST_LOG", "chatty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "RUST_LOG"));
    }

    #[test]
    fn cloudflare_needs_both_credentials() {
        let half = load(&[("DATABASE_URL", "postgres://db"), ("CLOUDFLARE_ACCOUNT_ID", "acc")]).unwrap();
        assert!(half.cloudflare.is_none());

        let full = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_API_TOKEN", "tok"),
            ("FRONTEND_URL", "https://reader.example/"),
        ])
        .unwrap();
        assert_eq!(full.cloudflare.unwrap().account_id, "acc");
        assert_eq!(full.frontend_url, "https://reader.example");
    }
}
