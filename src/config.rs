//! Configuration for the fairgrid service.
//!
//! TOML file plus environment variable overrides, validated before use.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::errors::{EngineError, EngineResult};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FairgridConfig {
    pub api: ApiConfig,
    pub game: GameConfig,
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// Multiplier scaling constant; 0.99 means a 1% house edge.
    pub house_edge_factor: Decimal,
    /// Some variants allow cashing out with zero reveals at 1.0x.
    pub allow_zero_reveal_cashout: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_bet: Decimal::new(10, 2),        // 0.10
            max_bet: Decimal::new(1_000_000, 2), // 10000.00
            house_edge_factor: Decimal::new(99, 2),
            allow_zero_reveal_cashout: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub lock_timeout_ms: u64,
    pub history_retry_attempts: u32,
    pub history_retry_backoff_ms: u64,
    pub event_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
            history_retry_attempts: 5,
            history_retry_backoff_ms: 100,
            event_buffer_size: 1024,
        }
    }
}

/// Loads configuration from an optional TOML file, then applies environment
/// overrides, then validates.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> EngineResult<FairgridConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            FairgridConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> EngineResult<FairgridConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Validation(format!("failed to read config {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Validation(format!("failed to parse config TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut FairgridConfig) -> EngineResult<()> {
        if let Ok(addr) = env::var("FAIRGRID_API_ADDRESS") {
            config.api.listen_address = addr;
        }
        if let Ok(port) = env::var("FAIRGRID_API_PORT") {
            config.api.port = port.parse().map_err(|_| {
                EngineError::Validation(format!("invalid FAIRGRID_API_PORT: {}", port))
            })?;
        }
        if let Ok(timeout) = env::var("FAIRGRID_LOCK_TIMEOUT_MS") {
            config.engine.lock_timeout_ms = timeout.parse().map_err(|_| {
                EngineError::Validation(format!("invalid FAIRGRID_LOCK_TIMEOUT_MS: {}", timeout))
            })?;
        }
        if let Ok(edge) = env::var("FAIRGRID_HOUSE_EDGE_FACTOR") {
            config.game.house_edge_factor = edge.parse().map_err(|_| {
                EngineError::Validation(format!("invalid FAIRGRID_HOUSE_EDGE_FACTOR: {}", edge))
            })?;
        }
        Ok(())
    }

    fn validate(&self, config: &FairgridConfig) -> EngineResult<()> {
        if config.api.port == 0 {
            return Err(EngineError::Validation(
                "api.port cannot be zero".to_string(),
            ));
        }
        if config.game.min_bet <= Decimal::ZERO || config.game.min_bet >= config.game.max_bet {
            return Err(EngineError::Validation(format!(
                "bet bounds invalid: min {} max {}",
                config.game.min_bet, config.game.max_bet
            )));
        }
        if config.game.house_edge_factor <= Decimal::ZERO
            || config.game.house_edge_factor > Decimal::ONE
        {
            return Err(EngineError::Validation(format!(
                "house_edge_factor {} must be in (0, 1]",
                config.game.house_edge_factor
            )));
        }
        if config.engine.lock_timeout_ms < 10 {
            return Err(EngineError::Validation(
                "engine.lock_timeout_ms must be at least 10".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, config: &FairgridConfig, path: &str) -> EngineResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| EngineError::Validation(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string).map_err(|e| {
            EngineError::Persistence(format!("failed to write config {}: {}", path, e))
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        let config = FairgridConfig::default();
        assert!(ConfigLoader::new().validate(&config).is_ok());
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.game.house_edge_factor, Decimal::new(99, 2));
        assert!(!config.game.allow_zero_reveal_cashout);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let loader = ConfigLoader::new();

        let mut config = FairgridConfig::default();
        config.api.port = 0;
        assert!(loader.validate(&config).is_err());

        let mut config = FairgridConfig::default();
        config.game.house_edge_factor = Decimal::new(105, 2); // 1.05
        assert!(loader.validate(&config).is_err());

        let mut config = FairgridConfig::default();
        config.game.min_bet = config.game.max_bet;
        assert!(loader.validate(&config).is_err());

        let mut config = FairgridConfig::default();
        config.engine.lock_timeout_ms = 1;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn save_and_load_round_trip() -> EngineResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = FairgridConfig::default();
        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.api.port, original.api.port);
        assert_eq!(loaded.game.min_bet, original.game.min_bet);
        assert_eq!(loaded.game.house_edge_factor, original.game.house_edge_factor);
        Ok(())
    }
}
