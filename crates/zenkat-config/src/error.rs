//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded, validated or written.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file named with `--config` does not exist
    #[error("config file '{}' does not exist", path.display())]
    MissingExplicit { path: PathBuf },

    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the file or creating its directory failed
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// A `[[trees]]` entry or runtime registration is malformed
    #[error("invalid tree '{name}': {reason}")]
    InvalidTree { name: String, reason: String },

    #[error("tree '{name}' is configured more than once")]
    DuplicateTree { name: String },

    #[error("tree '{name}' is not configured")]
    UnknownTree { name: String },
}

impl ConfigError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn invalid_tree(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTree {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_tree(name: impl Into<String>) -> Self {
        Self::UnknownTree { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_errors_name_the_path() {
        let err = ConfigError::MissingExplicit {
            path: PathBuf::from("/etc/zenkat.toml"),
        };
        assert_eq!(err.to_string(), "config file '/etc/zenkat.toml' does not exist");

        let err = ConfigError::read(
            "/etc/zenkat.toml",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().starts_with("failed to read config file '/etc/zenkat.toml'"));
    }

    #[test]
    fn test_tree_errors_name_the_tree() {
        let err = ConfigError::invalid_tree("a/b", "name must not contain path separators");
        assert_eq!(
            err.to_string(),
            "invalid tree 'a/b': name must not contain path separators"
        );
        assert!(ConfigError::unknown_tree("notes").to_string().contains("'notes'"));
    }
}
