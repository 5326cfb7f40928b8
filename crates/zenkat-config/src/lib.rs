//! Zenkat Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.zenkat/config.toml`
//! - Local config: `.zenkat/config.toml` (in the working directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Eagerness values accepted by `query.default_eagerness`.
pub const EAGERNESS_VALUES: &[&str] = &["none", "metadata", "full"];

/// Root configuration for Zenkat.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ZenkatConfig {
    /// Directories exposed as trees
    pub trees: Vec<TreeRootConfig>,

    /// Metadata crawl policy
    pub crawl: CrawlConfig,

    /// Content hydration settings
    pub hydration: HydrationConfig,

    /// Query defaults
    pub query: QueryConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// One configured root directory exposed as a named tree.
///
/// # Example TOML
///
/// ```toml
/// [[trees]]
/// name = "notes"
/// path = "/home/me/notes"
/// virtual_path = "/notes"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeRootConfig {
    /// Unique catalog key
    pub name: String,

    /// On-disk root directory
    pub path: PathBuf,

    /// Location exposed to clients (defaults to `/<name>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_path: Option<String>,
}

impl TreeRootConfig {
    /// Create a tree root with the default virtual path.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            virtual_path: None,
        }
    }

    /// Set an explicit virtual path.
    pub fn with_virtual_path(mut self, virtual_path: impl Into<String>) -> Self {
        self.virtual_path = Some(virtual_path.into());
        self
    }

    /// The virtual path clients see for this tree.
    pub fn effective_virtual_path(&self) -> String {
        match &self.virtual_path {
            Some(vp) if !vp.is_empty() => {
                if vp.starts_with('/') {
                    vp.clone()
                } else {
                    format!("/{}", vp)
                }
            }
            _ => format!("/{}", self.name),
        }
    }

    /// Validate a single tree root entry.
    ///
    /// Used both for file-based configuration and for trees registered at
    /// runtime through the HTTP surface.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::invalid_tree(&self.name, reason));
        if self.name.trim().is_empty() {
            return invalid("name must not be empty".to_string());
        }
        if self.name.contains('/') || self.name.contains('\\') {
            return invalid("name must not contain path separators".to_string());
        }
        if self.path.as_os_str().is_empty() {
            return invalid("path is empty".to_string());
        }
        if let Some(vp) = &self.virtual_path {
            if vp.split('/').any(|segment| segment == "..") {
                return invalid(format!("virtual_path '{}' must not contain '..'", vp));
            }
        }
        Ok(())
    }
}

/// Metadata crawl policy applied to every filesystem-backed tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Follow symbolic links while crawling
    pub follow_symlinks: bool,

    /// File extensions to keep (empty = every file)
    pub extensions: Vec<String>,

    /// Glob patterns to exclude
    pub exclude_patterns: Vec<String>,

    /// Include dot-files and dot-directories
    pub include_hidden: bool,

    /// Honor `.gitignore` and `.zenkatignore` files inside the tree
    pub respect_ignore_files: bool,

    /// Crawl wait deadline in seconds
    pub timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            extensions: vec!["md".to_string()],
            exclude_patterns: vec![
                "**/.git/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
            ],
            include_hidden: false,
            respect_ignore_files: true,
            timeout_secs: 30,
        }
    }
}

/// Content decoder selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// Block-level markdown decoder (default)
    #[default]
    Markdown,
    /// Store raw bytes only
    None,
}

impl std::fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for DecoderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "none" | "raw" => Ok(Self::None),
            _ => Err(ConfigError::invalid_value(
                "hydration.decoder",
                format!("unknown decoder '{}', expected markdown or none", s),
            )),
        }
    }
}

/// Hydration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Content decoder applied after a successful fetch
    pub decoder: DecoderKind,

    /// Resident content budget in MB before LRU eviction
    pub memory_budget_mb: u64,

    /// Hydration wait deadline in seconds
    pub timeout_secs: u64,

    /// Files above this size fail hydration (in KB)
    pub max_file_size_kb: u64,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderKind::default(),
            memory_budget_mb: 256,
            timeout_secs: 30,
            max_file_size_kb: 4096,
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Eagerness used when a request does not specify one
    pub default_eagerness: String,

    /// How long blocking queries wait on in-flight loads (seconds)
    pub wait_timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_eagerness: "metadata".to_string(),
            wait_timeout_secs: 30,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Additional trees (replace configured trees with the same name)
    pub trees: Vec<TreeRootConfig>,

    /// Override bind host
    pub host: Option<String>,

    /// Override bind port
    pub port: Option<u16>,

    /// Override decoder
    pub decoder: Option<DecoderKind>,

    /// Override default eagerness
    pub default_eagerness: Option<String>,

    /// Override log level
    pub log_level: Option<String>,
}

impl ZenkatConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        for tree in &overrides.trees {
            self.upsert_tree(tree.clone());
        }

        if let Some(ref host) = overrides.host {
            self.server.host = host.clone();
        }

        if let Some(port) = overrides.port {
            self.server.port = port;
        }

        if let Some(decoder) = overrides.decoder {
            self.hydration.decoder = decoder;
        }

        if let Some(ref eagerness) = overrides.default_eagerness {
            self.query.default_eagerness = eagerness.clone();
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Insert a tree, replacing any existing tree with the same name.
    ///
    /// Returns true if an existing entry was replaced.
    pub fn upsert_tree(&mut self, tree: TreeRootConfig) -> bool {
        match self.trees.iter_mut().find(|t| t.name == tree.name) {
            Some(existing) => {
                *existing = tree;
                true
            }
            None => {
                self.trees.push(tree);
                false
            }
        }
    }

    /// Look up a configured tree by name.
    pub fn tree(&self, name: &str) -> Result<&TreeRootConfig, ConfigError> {
        self.trees
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::unknown_tree(name))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for tree in &self.trees {
            tree.validate()?;
            if !seen.insert(tree.name.as_str()) {
                return Err(ConfigError::DuplicateTree {
                    name: tree.name.clone(),
                });
            }
        }

        for pattern in &self.crawl.exclude_patterns {
            Glob::new(pattern).map_err(|e| {
                ConfigError::invalid_value("crawl.exclude_patterns", format!("{}: {}", pattern, e))
            })?;
        }

        if !EAGERNESS_VALUES.contains(&self.query.default_eagerness.as_str()) {
            return Err(ConfigError::invalid_value(
                "query.default_eagerness",
                format!(
                    "'{}' is not one of {}",
                    self.query.default_eagerness,
                    EAGERNESS_VALUES.join(", ")
                ),
            ));
        }

        if self.hydration.memory_budget_mb == 0 {
            return Err(ConfigError::invalid_value(
                "hydration.memory_budget_mb",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Memory budget for hydrated content in bytes.
    pub fn memory_budget_bytes(&self) -> usize {
        (self.hydration.memory_budget_mb as usize).saturating_mul(1024 * 1024)
    }

    /// Maximum hydratable file size in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.hydration.max_file_size_kb.saturating_mul(1024)
    }

    /// Bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
