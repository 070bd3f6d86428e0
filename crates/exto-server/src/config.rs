//! Server configuration assembled from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use exto_db::DbConfig;
use exto_extract::ExtractionConfig;
use exto_scan::{PaymentConfig, ScanConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Raises the default log level to `debug`.
    pub debug: bool,
    pub db: DbConfig,
    pub extraction: ExtractionConfig,
    pub scan: ScanConfig,
    pub payment: PaymentConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            debug: false,
            db: DbConfig::default(),
            extraction: ExtractionConfig::default(),
            scan: ScanConfig::default(),
            payment: PaymentConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, keeping defaults for unset
    /// or empty variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = env_u64(&get, "APP_PORT")? {
            config.port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
                key: "APP_PORT",
                value: port.to_string(),
            })?;
        }
        config.debug = env_bool(&get, "DEBUG_MODE")?.unwrap_or(false);

        let db = &mut config.db;
        set(&mut db.url, get("DATABASE_URL"));
        set(&mut db.namespace, get("DATABASE_NAMESPACE"));
        set(&mut db.database, get("DATABASE_NAME"));
        set(&mut db.username, get("DATABASE_USER"));
        set(&mut db.password, get("DATABASE_PASSWORD"));
        if let Some(ms) = env_u64(&get, "DATABASE_TIMEOUT_MS")? {
            db.query_timeout = Duration::from_millis(ms);
        }

        let extraction = &mut config.extraction;
        set(&mut extraction.api_key, get("OPENAI_API_KEY"));
        set(&mut extraction.base_url, get("OPENAI_BASE_URL"));
        set(&mut extraction.model, get("OPENAI_MODEL"));

        if let Some(dir) = get("UPLOAD_DIR") {
            config.scan.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("EXPORT_DIR") {
            config.scan.export_dir = PathBuf::from(dir);
        }

        set(&mut config.payment.api_key, get("STRIPE_API_KEY"));
        set(&mut config.payment.price_id, get("STRIPE_PRICE_ID"));

        Ok(config)
    }
}

fn set(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn env_u64(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

fn env_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    get(key)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        })
        .transpose()
}
