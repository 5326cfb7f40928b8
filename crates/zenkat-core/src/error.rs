//! Error taxonomy for tree loading, hydration and queries.
//!
//! Every error carries the key that identifies what failed (tree name, node
//! id, or offending path) so a client can decide to retry, wait, or surface
//! the failure. Errors are `Clone` because one outcome of a coalesced crawl
//! or hydration is handed to every waiter.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::id::NodeId;

/// Result type for zenkat operations.
pub type Result<T> = std::result::Result<T, ZenkatError>;

/// Classification of a source-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    NotFound,
    PermissionDenied,
    Unreachable,
    Other,
}

impl From<io::ErrorKind> for SourceErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut => Self::Unreachable,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::Unreachable => "unreachable",
            Self::Other => "i/o failure",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`TreeSource`](crate::source::TreeSource).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} at '{path}': {message}")]
pub struct SourceError {
    /// Virtual path the source was asked about
    pub path: String,
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(path: impl Into<String>, kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    /// Wrap an I/O error observed while touching `path`.
    pub fn io(path: impl Into<String>, err: &io::Error) -> Self {
        Self::new(path, err.kind().into(), err.to_string())
    }
}

/// A metadata crawl failed; the tree was reverted to `UNLOADED`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("crawl of tree '{tree}' failed at '{path}': {reason}")]
pub struct CrawlError {
    pub tree: String,
    /// Offending virtual path
    pub path: String,
    pub reason: String,
}

impl CrawlError {
    pub fn new(tree: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tree: tree.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_source(tree: &str, err: SourceError) -> Self {
        let path = format!("/{}", err.path.trim_start_matches('/'));
        Self::new(tree, path, format!("{}: {}", err.kind, err.message))
    }
}

/// Fetching a file's content failed; the node was reverted to `DEHYDRATED`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HydrationError {
    #[error("reading '{path}' (node {id}) in tree '{tree}' failed: {source}")]
    Read {
        tree: String,
        id: NodeId,
        path: String,
        #[source]
        source: SourceError,
    },

    #[error("'{path}' (node {id}) in tree '{tree}' is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        tree: String,
        id: NodeId,
        path: String,
        size: u64,
        limit: u64,
    },
}

impl HydrationError {
    /// Node whose hydration failed.
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Read { id, .. } | Self::TooLarge { id, .. } => id,
        }
    }

    /// Virtual path of the file whose hydration failed.
    pub fn path(&self) -> &str {
        match self {
            Self::Read { path, .. } | Self::TooLarge { path, .. } => path,
        }
    }
}

/// Stable classification of [`ZenkatError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TreeNotFound,
    NodeNotFound,
    NotMetadataLoaded,
    NotAFile,
    CrawlError,
    HydrationError,
    Timeout,
    Pending,
    InvalidQuery,
    InvalidTree,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TreeNotFound => "tree_not_found",
            Self::NodeNotFound => "node_not_found",
            Self::NotMetadataLoaded => "not_metadata_loaded",
            Self::NotAFile => "not_a_file",
            Self::CrawlError => "crawl_error",
            Self::HydrationError => "hydration_error",
            Self::Timeout => "timeout",
            Self::Pending => "pending",
            Self::InvalidQuery => "invalid_query",
            Self::InvalidTree => "invalid_tree",
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CrawlError | Self::HydrationError | Self::Timeout | Self::Pending
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which coalesced operation a `Timeout` or `Pending` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Crawl,
    Hydration,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crawl => f.write_str("crawl"),
            Self::Hydration => f.write_str("hydration"),
        }
    }
}

/// Errors surfaced by the store, crawler, hydration manager and query engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZenkatError {
    #[error("tree '{tree}' not found")]
    TreeNotFound { tree: String },

    #[error("node {id} not found in tree '{tree}'")]
    NodeNotFound { tree: String, id: String },

    #[error("tree '{tree}' has no metadata loaded; crawl it first")]
    NotMetadataLoaded { tree: String },

    #[error("node {id} in tree '{tree}' is a folder and has no content")]
    NotAFile { tree: String, id: NodeId },

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Hydration(#[from] HydrationError),

    /// The caller stopped waiting; the underlying operation keeps running.
    #[error("timed out waiting for {operation} of '{key}'")]
    Timeout { operation: Operation, key: String },

    /// A load this request needs is in flight; retry later.
    #[error("{operation} of '{key}' is in progress")]
    Pending { operation: Operation, key: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),
}

impl ZenkatError {
    pub fn tree_not_found(tree: impl Into<String>) -> Self {
        Self::TreeNotFound { tree: tree.into() }
    }

    pub fn node_not_found(tree: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NodeNotFound {
            tree: tree.into(),
            id: id.to_string(),
        }
    }

    pub fn not_metadata_loaded(tree: impl Into<String>) -> Self {
        Self::NotMetadataLoaded { tree: tree.into() }
    }

    pub fn not_a_file(tree: impl Into<String>, id: NodeId) -> Self {
        Self::NotAFile {
            tree: tree.into(),
            id,
        }
    }

    pub fn timeout(operation: Operation, key: impl Into<String>) -> Self {
        Self::Timeout {
            operation,
            key: key.into(),
        }
    }

    pub fn pending(operation: Operation, key: impl Into<String>) -> Self {
        Self::Pending {
            operation,
            key: key.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub fn invalid_tree(message: impl Into<String>) -> Self {
        Self::InvalidTree(message.into())
    }

    /// Stable taxonomy value for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TreeNotFound { .. } => ErrorKind::TreeNotFound,
            Self::NodeNotFound { .. } => ErrorKind::NodeNotFound,
            Self::NotMetadataLoaded { .. } => ErrorKind::NotMetadataLoaded,
            Self::NotAFile { .. } => ErrorKind::NotAFile,
            Self::Crawl(_) => ErrorKind::CrawlError,
            Self::Hydration(_) => ErrorKind::HydrationError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Pending { .. } => ErrorKind::Pending,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::InvalidTree(_) => ErrorKind::InvalidTree,
        }
    }

    /// Identifying key: tree name, node id, or offending path.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::TreeNotFound { tree } | Self::NotMetadataLoaded { tree } => Some(tree.clone()),
            Self::NodeNotFound { id, .. } => Some(id.clone()),
            Self::NotAFile { id, .. } => Some(id.to_string()),
            Self::Crawl(err) => Some(err.path.clone()),
            Self::Hydration(err) => Some(err.path().to_string()),
            Self::Timeout { key, .. } | Self::Pending { key, .. } => Some(key.clone()),
            Self::InvalidQuery(_) | Self::InvalidTree(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
