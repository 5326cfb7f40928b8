//! Common test utilities for integration tests.
//!
//! Fixtures build engines over on-disk and in-memory trees.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use zenkat_core::{
    Eagerness, EngineOptions, FsSource, MarkdownDecoder, MemorySource, NodeId, QueryEngine,
    QueryOptions, SourceFilter, VirtualPath, Wait,
};

pub const A_MD: &str = "# Intro\n\nHello world\n\n- one\n- two\n";
pub const B_MD: &str = "## Details\n\nMore text\n";

/// Write `files` (relative path, contents) under a fresh temp directory.
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for (path, contents) in files {
        write_file(dir.path(), path, contents);
    }
    dir
}

pub fn write_file(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(full, contents).expect("write file");
}

/// `docs/` with `a.md` and `sub/b.md`.
pub fn docs_dir() -> TempDir {
    write_tree(&[("a.md", A_MD), ("sub/b.md", B_MD)])
}

pub fn docs_memory() -> Arc<MemorySource> {
    Arc::new(
        MemorySource::new()
            .with_file("a.md", A_MD)
            .with_file("sub/b.md", B_MD),
    )
}

pub fn engine_with(options: EngineOptions) -> QueryEngine {
    QueryEngine::new(options, Arc::new(MarkdownDecoder::new()))
}

pub fn engine() -> QueryEngine {
    engine_with(EngineOptions::default())
}

/// Engine with `docs` registered over an on-disk directory.
pub fn fs_engine(dir: &TempDir) -> QueryEngine {
    let engine = engine();
    let source = FsSource::new(dir.path(), SourceFilter::default());
    engine
        .register("docs", "/docs", Arc::new(source))
        .expect("register docs");
    engine
}

/// Engine with `docs` registered over `source`.
pub fn memory_engine(source: Arc<MemorySource>) -> QueryEngine {
    let engine = engine();
    engine.register("docs", "/docs", source).expect("register docs");
    engine
}

pub fn opts(eagerness: Eagerness) -> QueryOptions {
    QueryOptions::new(eagerness, Wait::block(Duration::from_secs(5)))
}

pub fn id(tree: &str, path: &str) -> NodeId {
    NodeId::derive(tree, &VirtualPath::parse(path).expect("valid path"))
}
