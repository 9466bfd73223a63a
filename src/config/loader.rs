//! Configuration loading functionality
//!
//! Sources, lowest priority first: built-in defaults, the JSON file,
//! `DUAL_MODE_PROXY_*` environment variables. Command-line flags are applied
//! on top by the binary.

use std::fs;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use log::{debug, info};

use crate::common::{ProxyError, Result};
use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::config::ProxyConfig;

impl ProxyConfig {
    /// Load configuration from a single JSON file
    ///
    /// Keys missing from the file keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse JSON config file {}: {}", path.display(), e)))
    }

    /// Load configuration from the file (if any) and the environment
    ///
    /// When `path` is `None`, `config.json` in the working directory is used
    /// if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                builder = builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Json));
            }
            None => debug!("No configuration file, using defaults"),
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<ProxyConfig>())
            .map_err(|e| ProxyError::Config(format!("Failed to load configuration: {}", e)))
    }
}
