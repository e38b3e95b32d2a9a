use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Maximum length for an order key before the maintainer rebalances the container
pub const MAX_KEY_LENGTH: usize = 32;

/// How `insert_between` / `move_between` treat neighbours given out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborPolicy {
    /// Log a warning and place the item after the left neighbour.
    #[default]
    Lenient,
    /// Reject the call with `KeyError::InvalidNeighborOrder`.
    Strict,
}

/// Configuration for the order maintainer and its SQLite store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub max_key_length: usize,
    /// Rebalance a container when an anchored move would exceed `max_key_length`.
    pub auto_rebalance: bool,
    pub neighbor_policy: NeighborPolicy,
    pub database: DatabaseConfig,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            max_key_length: MAX_KEY_LENGTH,
            auto_rebalance: true,
            neighbor_policy: NeighborPolicy::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:playlists.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:playlist-order.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl OrderConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config YAML {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: OrderConfig = serde_yaml::from_str(content)?;
        anyhow::ensure!(
            config.max_key_length > 0,
            "max_key_length must be greater than zero"
        );
        anyhow::ensure!(
            config.database.max_connections > 0,
            "database.max_connections must be greater than zero"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrderConfig::default();
        assert_eq!(config.max_key_length, MAX_KEY_LENGTH);
        assert!(config.auto_rebalance);
        assert_eq!(config.neighbor_policy, NeighborPolicy::Lenient);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = OrderConfig::from_yaml_str(
            "neighbor_policy: strict\ndatabase:\n  url: \"sqlite::memory:\"\n",
        )
        .unwrap();

        assert_eq!(config.neighbor_policy, NeighborPolicy::Strict);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.max_key_length, MAX_KEY_LENGTH);
    }

    #[test]
    fn test_rejects_zero_key_length() {
        assert!(OrderConfig::from_yaml_str("max_key_length: 0").is_err());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(OrderConfig::from_yaml_str("neighbor_policy: sloppy").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_key_length: 8\nauto_rebalance: false").unwrap();

        let config = OrderConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.max_key_length, 8);
        assert!(!config.auto_rebalance);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = OrderConfig::load_from_file(Path::new("/nonexistent/order.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/order.yaml"));
    }
}
