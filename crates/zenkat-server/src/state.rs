//! Shared application state: the engine plus the configuration it was
//! built from.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use zenkat_config::{ConfigError, DecoderKind, TreeRootConfig, ZenkatConfig};
use zenkat_core::{
    ContentDecoder, Eagerness, EngineOptions, FsSource, MarkdownDecoder, NullDecoder,
    QueryEngine, Registration, SourceFilter,
};

use crate::error::ServerError;

pub struct AppState {
    engine: QueryEngine,
    config: ZenkatConfig,
    filter: SourceFilter,
}

impl AppState {
    /// Build the engine and register every configured tree.
    ///
    /// Nothing is crawled here; trees load on first use.
    pub fn new(config: ZenkatConfig) -> Result<Self, ServerError> {
        let default_eagerness: Eagerness = config
            .query
            .default_eagerness
            .parse()
            .map_err(|message| ConfigError::invalid_value("query.default_eagerness", message))?;

        let decoder: Arc<dyn ContentDecoder> = match config.hydration.decoder {
            DecoderKind::Markdown => Arc::new(MarkdownDecoder::new()),
            DecoderKind::None => Arc::new(NullDecoder),
        };

        let options = EngineOptions {
            default_eagerness,
            wait_timeout: Duration::from_secs(config.query.wait_timeout_secs),
            crawl_timeout: Duration::from_secs(config.crawl.timeout_secs),
            hydration_timeout: Duration::from_secs(config.hydration.timeout_secs),
            memory_budget: config.memory_budget_bytes(),
            max_file_size: Some(config.max_file_size_bytes()),
        };

        let crawl = &config.crawl;
        let filter = SourceFilter::new(
            crawl.follow_symlinks,
            &crawl.extensions,
            &crawl.exclude_patterns,
            crawl.include_hidden,
        )
        .map_err(|e| ConfigError::invalid_value("crawl.exclude_patterns", e.to_string()))?
        .with_ignore_files(crawl.respect_ignore_files);

        let state = Self {
            engine: QueryEngine::new(options, decoder),
            filter,
            config,
        };
        for root in &state.config.trees {
            state.register_root(root)?;
        }
        info!(
            trees = state.config.trees.len(),
            decoder = %state.config.hydration.decoder,
            eagerness = %default_eagerness,
            "Engine ready"
        );
        Ok(state)
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn config(&self) -> &ZenkatConfig {
        &self.config
    }

    /// Register a directory-backed tree, replacing one with the same name.
    pub fn register_root(&self, root: &TreeRootConfig) -> Result<Registration, ServerError> {
        root.validate()?;
        if !root.path.is_dir() {
            return Err(ConfigError::invalid_tree(
                &root.name,
                format!("path '{}' is not a directory", root.path.display()),
            )
            .into());
        }

        let source = FsSource::new(&root.path, self.filter.clone());
        let registration =
            self.engine
                .register(&root.name, &root.effective_virtual_path(), Arc::new(source))?;
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zenkat_core::TreeState;

    #[test]
    fn test_registers_configured_trees_lazily() {
        let dir = TempDir::new().unwrap();
        let mut config = ZenkatConfig::default();
        config.trees.push(TreeRootConfig::new("notes", dir.path()));

        let state = AppState::new(config).unwrap();
        assert_eq!(state.engine().list_trees(), vec!["notes".to_string()]);
        let tree = state.engine().registry().lookup("notes").unwrap();
        assert_eq!(tree.state, TreeState::Unloaded);
        assert_eq!(tree.virtual_path, "/notes");
    }

    #[test]
    fn test_rejects_missing_directory() {
        let state = AppState::new(ZenkatConfig::default()).unwrap();
        let root = TreeRootConfig::new("gone", "/definitely/not/here");
        let err = state.register_root(&root).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_eagerness() {
        let mut config = ZenkatConfig::default();
        config.query.default_eagerness = "lazy".to_string();
        assert!(AppState::new(config).is_err());
    }
}
