//! Configuration module
//!
//! Handles loading and saving tagrpc configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network;
use crate::protocol::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT};
use crate::service::{RecipeError, RecipeTable};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not load recipes: {0}")]
    Recipes(#[from] RecipeError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Recipe table settings
    #[serde(default)]
    pub recipes: RecipesConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log filter directive, used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on, and the port clients use when none is given
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest message accepted or sent, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Connection timeout in ms
    #[serde(default = "default_timeout")]
    pub connect_timeout_ms: u64,
    /// Time allowed to receive a message, in ms
    #[serde(default = "default_timeout")]
    pub read_timeout_ms: u64,
    /// Time allowed to send a message, in ms
    #[serde(default = "default_timeout")]
    pub write_timeout_ms: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_timeout() -> u64 {
    5000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            connect_timeout_ms: default_timeout(),
            read_timeout_ms: default_timeout(),
            write_timeout_ms: default_timeout(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server to contact, as `host` or `host:port`
    #[serde(default = "default_server")]
    pub server: String,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
        }
    }
}

/// Recipe table configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipesConfig {
    /// TOML file of recipes (built-in table if not set)
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.network_config().validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tagrpc/config.toml")),
            Some(PathBuf::from("./tagrpc.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Settings for the network layer
    pub fn network_config(&self) -> network::NetworkConfig {
        let net = &self.network;
        network::NetworkConfig {
            bind_address: net.bind_address.clone(),
            port: net.port,
            max_message_size: net.max_message_size,
            connect_timeout_ms: net.connect_timeout_ms,
            read_timeout_ms: net.read_timeout_ms,
            write_timeout_ms: net.write_timeout_ms,
        }
    }

    /// The configured recipe table, or the built-in one
    pub fn recipe_table(&self) -> ConfigResult<RecipeTable> {
        match &self.recipes.path {
            Some(path) => Ok(RecipeTable::load(path)?),
            None => Ok(RecipeTable::builtin()),
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            verbose: false,
            log_filter: Some("tagrpc=info".to_string()),
        },
        client: ClientConfig {
            server: format!("127.0.0.1:{}", DEFAULT_PORT),
        },
        recipes: RecipesConfig {
            path: Some(PathBuf::from("recipes.toml")),
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, DEFAULT_PORT);
        assert_eq!(config.network.max_message_size, 2000);
        assert_eq!(config.client.server, "127.0.0.1");
        assert!(config.recipes.path.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.network.port = 9000;
        config.general.verbose = true;
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.network.port, 9000);
        assert!(loaded.general.verbose);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nport = 7000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.read_timeout_ms, 5000);
        assert_eq!(config.network_config().bind_addr(), "0.0.0.0:7000");
    }

    #[test]
    fn test_too_small_size_cap_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nmax_message_size = 100").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_recipe_table_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[recipe]]\nmaterial1 = \"flint\"\nmaterial2 = \"steel\"\nresult = \"spark\""
        )
        .unwrap();

        let mut config = Config::default();
        assert_eq!(config.recipe_table().unwrap(), RecipeTable::builtin());

        config.recipes.path = Some(file.path().to_path_buf());
        let table = config.recipe_table().unwrap();
        assert_eq!(table.lookup("flint", "steel").unwrap(), "spark");
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.client.server, "127.0.0.1:8081");
        assert_eq!(parsed.recipes.path, Some(PathBuf::from("recipes.toml")));
    }
}
