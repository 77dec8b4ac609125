//! Layered configuration.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. `car-doc.toml` in the working directory
//! 3. Environment variables prefixed `CARDOC_`, `__` separating sections
//!    (`CARDOC_GEMINI__API_KEY` -> `gemini.api_key`)

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;

pub const CONFIG_FILE: &str = "car-doc.toml";
pub const ENV_PREFIX: &str = "CARDOC_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("public/data/car_faults_db.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_secs: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: LLMConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gemini: LLMConfig::default(),
            catalog: CatalogConfig::default(),
            telemetry: TelemetryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load from defaults, the config file and the environment, then validate.
    pub fn load() -> Result<Self> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`AppConfig::load`] after reading a `.env` file if one exists.
    pub fn load_with_dotenv() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// A missing API key is not checked here; the remote call reports it.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.gemini.base_url).map_err(|e| {
            AppError::ConfigError(format!(
                "gemini.base_url '{}' is not a valid URL: {}",
                self.gemini.base_url, e
            ))
        })?;

        if self.gemini.model.trim().is_empty() {
            return Err(AppError::ConfigError("gemini.model is empty".to_string()));
        }

        if self.telemetry.interval_secs == 0 {
            return Err(AppError::ConfigError(
                "telemetry.interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
