//! Environment-backed configuration for the scraper daemon and feature jobs.

use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings for the ingestion daemon (`tickflow run` / `tickflow stop`).
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub db_path: String,
    pub ws_url: String,
    pub products: Vec<String>,
    pub buffer_size: usize,
    pub run_dir: PathBuf,
    pub store_retries: u32,
    pub stop_grace_secs: u64,
}

impl ScraperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = env::var("TICKFLOW_DB_PATH").unwrap_or_else(|_| "tickflow.db".to_string());

        let ws_url = env::var("TICKFLOW_WS_URL")
            .unwrap_or_else(|_| "wss://ws-feed.exchange.coinbase.com".to_string());
        if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "TICKFLOW_WS_URL must start with ws:// or wss://".to_string(),
            ));
        }

        let products =
            split_products(&env::var("TICKFLOW_PRODUCTS").unwrap_or_else(|_| "BTC-USD".to_string()))?;

        let buffer_size = env::var("TICKFLOW_BUFFER_SIZE")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<usize>()
            .unwrap_or(1000);

        let run_dir = PathBuf::from(
            env::var("TICKFLOW_RUN_DIR").unwrap_or_else(|_| ".tickflow".to_string()),
        );

        let store_retries = env::var("TICKFLOW_STORE_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .unwrap_or(3);

        let stop_grace_secs = env::var("TICKFLOW_STOP_GRACE_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .unwrap_or(10);

        let config = Self {
            db_path,
            ws_url,
            products,
            buffer_size,
            run_dir,
            store_retries,
            stop_grace_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Command-line `-b` takes precedence over the environment.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Result<Self, ConfigError> {
        self.buffer_size = buffer_size;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "buffer size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for batch feature extraction (`tickflow features`).
#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub db_path: String,
    pub products: Vec<String>,
    pub workers: usize,
    pub chunk_size: usize,
}

impl FeaturesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = env::var("TICKFLOW_DB_PATH").unwrap_or_else(|_| "tickflow.db".to_string());

        // No default list here: extraction writes one file per configured
        // product, quiet or not
        let products = split_products(&env::var("TICKFLOW_PRODUCTS").map_err(|_| {
            ConfigError::MissingVariable("TICKFLOW_PRODUCTS".to_string())
        })?)?;

        let workers = env::var("TICKFLOW_WORKERS")
            .unwrap_or_else(|_| "4".to_string())
            .parse::<usize>()
            .unwrap_or(4);
        if workers == 0 {
            return Err(ConfigError::InvalidValue(
                "TICKFLOW_WORKERS must be at least 1".to_string(),
            ));
        }

        let chunk_size = env::var("TICKFLOW_CHUNK_SIZE")
            .unwrap_or_else(|_| "8".to_string())
            .parse::<usize>()
            .unwrap_or(8);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "TICKFLOW_CHUNK_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            db_path,
            products,
            workers,
            chunk_size,
        })
    }
}

fn split_products(raw: &str) -> Result<Vec<String>, ConfigError> {
    let products: Vec<String> = raw
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if products.is_empty() {
        return Err(ConfigError::InvalidValue(
            "TICKFLOW_PRODUCTS must name at least one product".to_string(),
        ));
    }
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_zero_rejected() {
        let config = ScraperConfig {
            db_path: "test.db".to_string(),
            ws_url: "wss://example.com".to_string(),
            products: vec!["BTC-USD".to_string()],
            buffer_size: 1000,
            run_dir: PathBuf::from(".tickflow"),
            store_retries: 3,
            stop_grace_secs: 10,
        };

        assert!(config.clone().with_buffer_size(0).is_err());
        assert_eq!(config.with_buffer_size(500).unwrap().buffer_size, 500);
    }

    #[test]
    fn test_features_config_requires_products() {
        env::remove_var("TICKFLOW_PRODUCTS");
        assert!(matches!(
            FeaturesConfig::from_env(),
            Err(ConfigError::MissingVariable(_))
        ));

        env::set_var("TICKFLOW_PRODUCTS", "BTC-USD, ETH-USD");
        let config = FeaturesConfig::from_env().unwrap();
        assert_eq!(config.products, vec!["BTC-USD", "ETH-USD"]);

        env::set_var("TICKFLOW_PRODUCTS", " , ");
        assert!(matches!(
            FeaturesConfig::from_env(),
            Err(ConfigError::InvalidValue(_))
        ));

        env::remove_var("TICKFLOW_PRODUCTS");
    }
}
