use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "MedReview";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const ENV_PREFIX: &str = "MEDREVIEW_";

/// Get the application data directory
/// ~/MedReview/ on all platforms, or ./MedReview when no home is known
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the draft and template database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("medreview.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,medreview_lib=debug,lopdf=warn"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Runtime settings for the review service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub autosave_interval: Duration,
    pub render_timeout: Duration,
    pub extraction_timeout: Duration,
    pub max_upload_bytes: u64,
    /// How long an ended job's outcome stays readable.
    pub job_retention: Duration,
    /// Clean sessions untouched this long are dropped from memory.
    pub session_idle_timeout: Duration,
    /// Pharmacist of the signed-in profile.
    pub profile_pharmacist: Option<String>,
    /// Last-resort preparer name for generated documents.
    pub default_pharmacist: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8740)),
            database_path: database_path(),
            autosave_interval: Duration::from_secs(30),
            render_timeout: Duration::from_secs(120),
            extraction_timeout: Duration::from_secs(300),
            max_upload_bytes: 20 * 1024 * 1024,
            job_retention: Duration::from_secs(15 * 60),
            session_idle_timeout: Duration::from_secs(30 * 60),
            profile_pharmacist: None,
            default_pharmacist: None,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `MEDREVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = var("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &v)?;
        }
        if let Some(v) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("AUTOSAVE_SECS") {
            config.autosave_interval = Duration::from_secs(positive("AUTOSAVE_SECS", &v)?);
        }
        if let Some(v) = var("RENDER_TIMEOUT_SECS") {
            config.render_timeout = Duration::from_secs(positive("RENDER_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("EXTRACTION_TIMEOUT_SECS") {
            config.extraction_timeout =
                Duration::from_secs(positive("EXTRACTION_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = positive("MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = var("JOB_RETENTION_SECS") {
            config.job_retention = Duration::from_secs(positive("JOB_RETENTION_SECS", &v)?);
        }
        if let Some(v) = var("SESSION_IDLE_SECS") {
            config.session_idle_timeout =
                Duration::from_secs(positive("SESSION_IDLE_SECS", &v)?);
        }
        config.profile_pharmacist = var("PHARMACIST");
        config.default_pharmacist = var("DEFAULT_PHARMACIST");

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(name: &str, value: &str) -> Result<u64, ConfigError> {
    match parse::<u64>(name, value)? {
        0 => Err(ConfigError::Invalid {
            key: format!("{ENV_PREFIX}{name}"),
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        }),
        n => Ok(n),
    }
}
