use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::BastionConfig;

/// Loads the Bastion configuration and applies environment overrides.
pub struct ConfigLoader {
    config: Arc<RwLock<BastionConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > BASTION_CONFIG env > ~/.bastion/bastion.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("BASTION_CONFIG") {
            return PathBuf::from(p);
        }
        crate::schema::default_data_dir().join("bastion.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> bastion_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::parse_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            BastionConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(bastion_core::BastionError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    fn parse_file(path: &Path) -> bastion_core::Result<BastionConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<BastionConfig>(&raw).map_err(|e| {
            bastion_core::BastionError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> BastionConfig {
        self.config.read().clone()
    }

    pub fn shared(&self) -> Arc<RwLock<BastionConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (BASTION_LOG_LEVEL, BASTION_MARKETPLACE_URL, ...).
    fn apply_env_overrides(mut config: BastionConfig) -> BastionConfig {
        if let Ok(v) = std::env::var("BASTION_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("BASTION_MARKETPLACE_URL") {
            config.marketplace.url = v;
        }
        if let Ok(v) = std::env::var("BASTION_HOST_VERSION") {
            config.extensions.host_version = v;
        }
        if let Ok(v) = std::env::var("BASTION_EXTENSIONS_DIR") {
            config.extensions.dir = PathBuf::from(v);
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> bastion_core::Result<()> {
        if !self.config_path.exists() {
            return Err(bastion_core::BastionError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::parse_file(&self.config_path)?);
        new_config
            .validate()
            .map_err(bastion_core::BastionError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}
