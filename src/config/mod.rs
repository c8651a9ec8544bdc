use crate::utils::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub pool: PoolSchemeConfig,
}

/// Process-wide maintenance settings (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSchemeConfig {
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    #[serde(default = "default_log_stats")]
    pub log_stats: bool,
    #[serde(default = "default_is_shared")]
    pub is_shared: bool,
    #[serde(default)]
    pub routes: Vec<RouteSchemeConfig>,
}

/// Per-route settings seeded at startup; route creation/resolution proper is
/// out of scope, but the maintenance engine needs somewhere to read
/// `pool_ttl`/`is_obsolete` from for routes that already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSchemeConfig {
    pub database: String,
    pub user: String,
    #[serde(default = "default_pool_ttl")]
    pub pool_ttl: u32,
    #[serde(default)]
    pub is_obsolete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String, // "json" or "pretty"
}

fn default_stats_interval() -> u64 {
    30
}

fn default_log_stats() -> bool {
    true
}

fn default_is_shared() -> bool {
    false
}

fn default_pool_ttl() -> u32 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for PoolSchemeConfig {
    fn default() -> Self {
        Self {
            stats_interval: default_stats_interval(),
            log_stats: default_log_stats(),
            is_shared: default_is_shared(),
            routes: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            pool: PoolSchemeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PoolError::Config(format!("failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| PoolError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.pool.stats_interval == 0 {
            return Err(PoolError::Config(
                "stats_interval must be a positive number of ticks".to_string(),
            ));
        }

        for route in &self.pool.routes {
            if route.database.trim().is_empty() || route.user.trim().is_empty() {
                return Err(PoolError::Config(
                    "route entries require non-empty database and user".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let example = r#"[logging]
level = "info"  # Options: "trace", "debug", "info", "warn", "error"
format = "pretty"  # Options: "pretty", "json"

[pool]
stats_interval = 30
log_stats = true
is_shared = false

[[pool.routes]]
database = "app"
user = "app"
pool_ttl = 3600
is_obsolete = false
"#;

        std::fs::write(path.as_ref(), example)
            .map_err(|e| PoolError::Config(format!("failed to write example config: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.pool.stats_interval, 30);
        assert!(config.pool.log_stats);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_stats_interval_is_rejected() {
        let mut config = Config::default();
        config.pool.stats_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn route_entries_require_database_and_user() {
        let mut config = Config::default();
        config.pool.routes.push(RouteSchemeConfig {
            database: String::new(),
            user: "app".to_string(),
            pool_ttl: 30,
            is_obsolete: false,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_from_toml() {
        let toml_str = r#"
            [logging]
            level = "debug"

            [pool]
            stats_interval = 5
            log_stats = false

            [[pool.routes]]
            database = "app"
            user = "app"
            pool_ttl = 60
        "#;
        let config: Config = toml::from_str(toml_str).expect("valid toml");
        assert_eq!(config.pool.stats_interval, 5);
        assert!(!config.pool.log_stats);
        assert_eq!(config.pool.routes.len(), 1);
        assert_eq!(config.pool.routes[0].pool_ttl, 60);
    }
}
