//! Zenkat Core - lazily loaded document trees
//!
//! This crate provides the engine behind Zenkat:
//! - A node store holding each tree's graph and hydrated content
//! - A tree registry binding names to sources
//! - A metadata crawler that installs a tree's graph in one step
//! - A hydration manager that fetches and decodes file content on demand
//! - A query engine whose eagerness policy decides what may be loaded
//!
//! Concurrent requests for the same crawl or hydration share one load.

pub mod budget;
pub mod crawler;
pub mod decoder;
pub mod error;
pub mod flight;
pub mod hydration;
pub mod id;
pub mod node;
pub mod query;
pub mod registry;
pub mod source;
pub mod store;
pub mod tree;

// Error re-exports
pub use error::{
    CrawlError, ErrorKind, HydrationError, Operation, Result, SourceError, SourceErrorKind,
    ZenkatError,
};

// Data model re-exports
pub use id::{NodeId, VirtualPath};
pub use node::{Content, HydrationState, Node, NodeDetail, NodeKind, NodeSummary};
pub use tree::{Tree, TreeState, TreeStats};

// Decoder re-exports
pub use decoder::{Block, BlockType, ContentDecoder, Document, MarkdownDecoder, NullDecoder};

// Source re-exports
pub use source::{EntryKind, FsSource, MemorySource, SourceEntry, SourceFilter, TreeSource};

// Engine re-exports
pub use budget::{CacheMetrics, ContentBudget};
pub use crawler::MetadataCrawler;
pub use flight::Wait;
pub use hydration::{HydrateAllReport, HydrationManager};
pub use query::{
    Answer, Eagerness, EngineOptions, Predicate, QueryEngine, QueryHit, QueryOptions,
};
pub use registry::{Registration, TreeRegistry};
pub use store::NodeStore;
