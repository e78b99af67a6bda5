//! Configuration management for Gridscan

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::capture::PlaybackPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub ocr: OcrConfig,
    pub grid: GridConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Parse Server base URL, e.g. `https://parse.example.com/parse`
    pub server_url: String,
    pub app_id: String,
    pub rest_api_key: Option<String>,
    /// Only needed to delete stored files
    pub master_key: Option<String>,
    pub session_token: Option<String>,
    /// Object id of the session user; looked up from the session token when unset
    pub user_id: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub base_url: String,
    pub lang: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    pub additional_rows: u32,
    /// How long a cell shows `Complete` before returning to `Idle`
    pub complete_linger_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub play_attempts: u32,
    pub play_retry_delay_ms: u64,
    pub readiness_checks_ms: Vec<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig {
                server_url: "http://localhost:1337/parse".to_string(),
                app_id: "jitsi".to_string(),
                rest_api_key: None,
                master_key: None,
                session_token: None,
                user_id: None,
                timeout_secs: 30,
            },
            ocr: OcrConfig {
                base_url: "http://image.tenty.co/ocr".to_string(),
                lang: String::new(),
                timeout_secs: 60,
            },
            grid: GridConfig {
                additional_rows: 0,
                complete_linger_ms: 1000,
            },
            capture: CaptureConfig {
                play_attempts: 5,
                play_retry_delay_ms: 500,
                readiness_checks_ms: vec![300, 800, 1500, 3000],
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            store: StoreConfig {
                server_url: env::var("PARSE_SERVER_URL")
                    .map_err(|_| ConfigError::Missing("PARSE_SERVER_URL"))?,
                app_id: env::var("PARSE_APP_ID").unwrap_or(defaults.store.app_id),
                rest_api_key: env::var("PARSE_REST_API_KEY")
                    .or_else(|_| env::var("PARSE_JAVASCRIPT_KEY"))
                    .ok(),
                master_key: env::var("PARSE_MASTER_KEY").ok(),
                session_token: env::var("PARSE_SESSION_TOKEN").ok(),
                user_id: env::var("PARSE_USER_ID").ok(),
                timeout_secs: parse_var("STORE_TIMEOUT_SECS", defaults.store.timeout_secs)?,
            },
            ocr: OcrConfig {
                base_url: env::var("OCR_BASE_URL").unwrap_or(defaults.ocr.base_url),
                lang: env::var("OCR_LANG").unwrap_or(defaults.ocr.lang),
                timeout_secs: parse_var("OCR_TIMEOUT_SECS", defaults.ocr.timeout_secs)?,
            },
            grid: GridConfig {
                additional_rows: parse_var("GRID_ADDITIONAL_ROWS", defaults.grid.additional_rows)?,
                complete_linger_ms: parse_var(
                    "GRID_COMPLETE_LINGER_MS",
                    defaults.grid.complete_linger_ms,
                )?,
            },
            capture: defaults.capture,
        })
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GridConfig {
    pub fn complete_linger(&self) -> Duration {
        Duration::from_millis(self.complete_linger_ms)
    }
}

impl CaptureConfig {
    pub fn playback_policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            max_attempts: self.play_attempts.max(1),
            retry_delay: Duration::from_millis(self.play_retry_delay_ms),
            readiness_checks: self
                .readiness_checks_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}

/// Read an optional variable, falling back to `default` when unset
pub fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
