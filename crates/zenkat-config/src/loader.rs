//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.zenkat/config.toml`
//! 2. Local config: `.zenkat/config.toml` (relative to a base directory)
//!    or an explicit file passed with `--config`
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, ZenkatConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name (both global and local).
const CONFIG_DIR: &str = ".zenkat";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.zenkat`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<ZenkatConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.zenkat`).
    pub fn new() -> Self {
        Self {
            global_config_dir: dirs::home_dir().map(|h| h.join(CONFIG_DIR)),
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path under a base directory.
    pub fn local_config_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration with optional explicit file and CLI overrides.
    ///
    /// Merges config in order: global → (explicit file or local) → overrides,
    /// then validates the result.
    pub fn load(
        &mut self,
        base_dir: &Path,
        explicit: Option<&Path>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<ZenkatConfig, ConfigError> {
        let mut config = ZenkatConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        let second = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingExplicit {
                        path: path.to_path_buf(),
                    });
                }
                debug!("Loading config from {:?}", path);
                Some(load_config_file(path)?)
            }
            None => self.load_local(base_dir)?,
        };
        if let Some(second) = second {
            config = merge_configs(config, second);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<ZenkatConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration under a base directory.
    pub fn load_local(&self, base_dir: &Path) -> Result<Option<ZenkatConfig>, ConfigError> {
        let local_path = self.local_config_path(base_dir);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Write `config` as the local configuration unless one exists.
    ///
    /// Returns the file's path and whether it was written.
    pub fn init_local(
        &self,
        base_dir: &Path,
        config: &ZenkatConfig,
    ) -> Result<(PathBuf, bool), ConfigError> {
        let config_path = self.local_config_path(base_dir);
        if config_path.exists() {
            return Ok((config_path, false));
        }
        save_config_file(&config_path, config)?;
        Ok((config_path, true))
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<ZenkatConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &ZenkatConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::write(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Scalars from `overlay` win when they differ from the default; trees are
/// merged by name.
fn merge_configs(base: ZenkatConfig, overlay: ZenkatConfig) -> ZenkatConfig {
    ZenkatConfig {
        trees: merge_trees(base.trees, overlay.trees),
        crawl: merge_crawl(base.crawl, overlay.crawl),
        hydration: merge_hydration(base.hydration, overlay.hydration),
        query: merge_query(base.query, overlay.query),
        server: merge_server(base.server, overlay.server),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Merge tree lists; an overlay tree replaces a base tree with the same name.
fn merge_trees(
    base: Vec<crate::TreeRootConfig>,
    overlay: Vec<crate::TreeRootConfig>,
) -> Vec<crate::TreeRootConfig> {
    let mut trees = base;
    for tree in overlay {
        match trees.iter_mut().find(|t| t.name == tree.name) {
            Some(existing) => *existing = tree,
            None => trees.push(tree),
        }
    }
    trees
}

fn merge_crawl(base: crate::CrawlConfig, overlay: crate::CrawlConfig) -> crate::CrawlConfig {
    let defaults = crate::CrawlConfig::default();
    crate::CrawlConfig {
        follow_symlinks: overlay.follow_symlinks,
        extensions: if overlay.extensions != defaults.extensions {
            overlay.extensions
        } else {
            base.extensions
        },
        // Overlay patterns extend base patterns
        exclude_patterns: {
            let mut patterns = base.exclude_patterns;
            for pattern in overlay.exclude_patterns {
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
            patterns
        },
        include_hidden: overlay.include_hidden || base.include_hidden,
        respect_ignore_files: if overlay.respect_ignore_files != defaults.respect_ignore_files {
            overlay.respect_ignore_files
        } else {
            base.respect_ignore_files
        },
        timeout_secs: if overlay.timeout_secs != defaults.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
    }
}

fn merge_hydration(
    base: crate::HydrationConfig,
    overlay: crate::HydrationConfig,
) -> crate::HydrationConfig {
    let defaults = crate::HydrationConfig::default();
    crate::HydrationConfig {
        decoder: if overlay.decoder != defaults.decoder {
            overlay.decoder
        } else {
            base.decoder
        },
        memory_budget_mb: if overlay.memory_budget_mb != defaults.memory_budget_mb {
            overlay.memory_budget_mb
        } else {
            base.memory_budget_mb
        },
        timeout_secs: if overlay.timeout_secs != defaults.timeout_secs {
            overlay.timeout_secs
        } else {
            base.timeout_secs
        },
        max_file_size_kb: if overlay.max_file_size_kb != defaults.max_file_size_kb {
            overlay.max_file_size_kb
        } else {
            base.max_file_size_kb
        },
    }
}

fn merge_query(base: crate::QueryConfig, overlay: crate::QueryConfig) -> crate::QueryConfig {
    let defaults = crate::QueryConfig::default();
    crate::QueryConfig {
        default_eagerness: if overlay.default_eagerness != defaults.default_eagerness {
            overlay.default_eagerness
        } else {
            base.default_eagerness
        },
        wait_timeout_secs: if overlay.wait_timeout_secs != defaults.wait_timeout_secs {
            overlay.wait_timeout_secs
        } else {
            base.wait_timeout_secs
        },
    }
}

fn merge_server(base: crate::ServerConfig, overlay: crate::ServerConfig) -> crate::ServerConfig {
    let defaults = crate::ServerConfig::default();
    crate::ServerConfig {
        host: if overlay.host != defaults.host {
            overlay.host
        } else {
            base.host
        },
        port: if overlay.port != defaults.port {
            overlay.port
        } else {
            base.port
        },
    }
}

fn merge_logging(
    base: crate::LoggingConfig,
    overlay: crate::LoggingConfig,
) -> crate::LoggingConfig {
    crate::LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: if overlay.format != crate::LogFormat::Text {
            overlay.format
        } else {
            base.format
        },
    }
}
