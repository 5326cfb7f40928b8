//! In-memory source.
//!
//! Useful for embedding zenkat over generated content and for exercising
//! coalescing: it counts every call, can inject failures per path, add
//! latency, and hold reads until released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{SourceEntry, TreeSource};
use crate::error::{SourceError, SourceErrorKind};
use crate::id::VirtualPath;

#[derive(Default)]
struct Contents {
    /// Directory listings in insertion order
    dirs: HashMap<VirtualPath, Vec<SourceEntry>>,
    files: HashMap<VirtualPath, Vec<u8>>,
    failures: HashMap<VirtualPath, SourceErrorKind>,
    latency: Option<Duration>,
}

pub struct MemorySource {
    contents: Mutex<Contents>,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
    reads_open: watch::Sender<bool>,
}

impl Default for MemorySource {
    fn default() -> Self {
        let mut contents = Contents::default();
        contents.dirs.insert(VirtualPath::root(), Vec::new());
        Self {
            contents: Mutex::new(contents),
            list_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            reads_open: watch::Sender::new(true),
        }
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_file`](Self::add_file).
    pub fn with_file(self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, bytes);
        self
    }

    /// Add or replace a file, creating missing parent folders.
    ///
    /// # Panics
    ///
    /// If `path` is not a valid non-root virtual path.
    pub fn add_file(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        let path = Self::parse(path);
        let bytes = bytes.into();
        let mut contents = self.contents.lock();
        let entry = SourceEntry::file(path.file_name(), bytes.len() as u64);
        Self::link(&mut contents, &path, entry);
        contents.files.insert(path, bytes);
    }

    /// Add an empty folder, creating missing parents.
    pub fn add_dir(&self, path: &str) {
        let path = Self::parse(path);
        let mut contents = self.contents.lock();
        Self::ensure_dir(&mut contents, &path);
    }

    fn parse(path: &str) -> VirtualPath {
        match VirtualPath::parse(path) {
            Some(path) if !path.is_root() => path,
            _ => panic!("invalid memory source path {:?}", path),
        }
    }

    fn ensure_dir(contents: &mut Contents, path: &VirtualPath) {
        if contents.dirs.contains_key(path) {
            return;
        }
        contents.dirs.insert(path.clone(), Vec::new());
        Self::link(contents, path, SourceEntry::folder(path.file_name()));
    }

    fn link(contents: &mut Contents, path: &VirtualPath, entry: SourceEntry) {
        let Some(parent) = path.parent() else {
            return;
        };
        Self::ensure_dir(contents, &parent);
        if let Some(listing) = contents.dirs.get_mut(&parent) {
            match listing.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => listing.push(entry),
            }
        }
    }

    /// Make every call touching `path` fail with `kind`.
    pub fn fail_path(&self, path: &str, kind: SourceErrorKind) {
        let path = VirtualPath::parse(path).unwrap_or_default();
        self.contents.lock().failures.insert(path, kind);
    }

    pub fn clear_failures(&self) {
        self.contents.lock().failures.clear();
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.contents.lock().latency = Some(latency);
    }

    /// Block `read_file` calls until [`release_reads`](Self::release_reads).
    pub fn hold_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads_open.send_replace(true);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Failure and latency configured for `path`, read without holding the
    /// lock across an await.
    fn plan(&self, path: &VirtualPath) -> (Option<SourceErrorKind>, Option<Duration>) {
        let contents = self.contents.lock();
        (contents.failures.get(path).copied(), contents.latency)
    }

    async fn delay(latency: Option<Duration>) {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TreeSource for MemorySource {
    async fn list_dir(&self, path: &VirtualPath) -> Result<Vec<SourceEntry>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let (failure, latency) = self.plan(path);
        Self::delay(latency).await;
        if let Some(kind) = failure {
            return Err(SourceError::new(path.as_str(), kind, "injected failure"));
        }

        let contents = self.contents.lock();
        contents.dirs.get(path).cloned().ok_or_else(|| {
            SourceError::new(path.as_str(), SourceErrorKind::NotFound, "no such directory")
        })
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>, SourceError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let mut open = self.reads_open.subscribe();
        let _ = open.wait_for(|open| *open).await;

        let (failure, latency) = self.plan(path);
        Self::delay(latency).await;
        if let Some(kind) = failure {
            return Err(SourceError::new(path.as_str(), kind, "injected failure"));
        }

        let contents = self.contents.lock();
        contents.files.get(path).cloned().ok_or_else(|| {
            SourceError::new(path.as_str(), SourceErrorKind::NotFound, "no such file")
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
