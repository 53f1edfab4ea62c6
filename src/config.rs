use std::{path::PathBuf, time::Duration};

use config::{Config, Environment, File};
use jiff::{SignedDuration, tz::TimeZone};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("No endpoint configured. Pass --endpoint, set MSMART_ENDPOINT or add 'endpoint' to {0}")]
    MissingEndpoint(String),

    #[error("Unknown time zone '{name}': {source}")]
    UnknownTimeZone { name: String, source: jiff::Error },
}

/// Account created in the sheet the first time someone logs in with it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub role: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// http(s) URL of the web app, or `file:<path>` for a local sheet
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Session, busy lock and confirmations
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// IANA name of the zone the sheet stores deadlines in, e.g. Asia/Bangkok
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_confirm_window")]
    pub confirm_window_secs: u64,
    #[serde(default = "default_school_name")]
    pub school_name: String,
    #[serde(default = "default_system_title")]
    pub system_title: String,
    #[serde(default)]
    pub seed_accounts: Vec<SeedAccount>,
}

/// Values passed on the command line; they win over file and environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub data_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("msmart")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_confirm_window() -> u64 {
    10
}

fn default_school_name() -> String {
    "School".to_string()
}

fn default_system_title() -> String {
    "M - SMART".to_string()
}

pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("msmart")
        .join("config.toml")
}

impl Settings {
    /// Config file, then `MSMART_*` variables, then `overrides`.
    pub fn load(overrides: Overrides) -> Result<Self, SettingsError> {
        Self::load_from(File::from(config_file_path()).required(false), overrides)
    }

    fn load_from(
        file: impl config::Source + Send + Sync + 'static,
        overrides: Overrides,
    ) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("MSMART")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("endpoint", overrides.endpoint)?
            .set_override_option(
                "data_dir",
                overrides
                    .data_dir
                    .map(|dir| dir.to_string_lossy().into_owned()),
            )?
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn endpoint(&self) -> Result<&str, SettingsError> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| SettingsError::MissingEndpoint(config_file_path().display().to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn confirm_window(&self) -> SignedDuration {
        SignedDuration::from_secs(self.confirm_window_secs as i64)
    }

    /// The configured sheet zone, or `None` to use the system zone.
    pub fn time_zone(&self) -> Result<Option<TimeZone>, SettingsError> {
        match self.time_zone.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => TimeZone::get(name)
                .map(Some)
                .map_err(|source| SettingsError::UnknownTimeZone {
                    name: name.to_string(),
                    source,
                }),
        }
    }
}
