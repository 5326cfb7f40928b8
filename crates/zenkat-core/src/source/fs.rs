//! Filesystem-backed source.
//!
//! Listings go through `ignore::WalkBuilder`, one directory per call, so
//! `.gitignore` and `.zenkatignore` files are honored the way `git` would.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, trace};

use super::{SourceEntry, TreeSource};
use crate::error::{SourceError, SourceErrorKind};
use crate::id::VirtualPath;

/// Per-directory ignore file read in addition to `.gitignore`.
pub const IGNORE_FILE: &str = ".zenkatignore";

/// Which directory entries a crawl admits.
#[derive(Debug, Clone)]
pub struct SourceFilter {
    follow_symlinks: bool,
    /// Lowercase extensions without the dot; empty admits every file
    extensions: Vec<String>,
    excludes: GlobSet,
    include_hidden: bool,
    ignore_files: bool,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            extensions: Vec::new(),
            excludes: GlobSet::empty(),
            include_hidden: true,
            ignore_files: false,
        }
    }
}

impl SourceFilter {
    /// Build a filter; fails on an invalid exclude glob.
    ///
    /// Ignore files are honored unless turned off with
    /// [`with_ignore_files`](Self::with_ignore_files).
    pub fn new(
        follow_symlinks: bool,
        extensions: &[String],
        exclude_patterns: &[String],
        include_hidden: bool,
    ) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            follow_symlinks,
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            excludes: builder.build()?,
            include_hidden,
            ignore_files: true,
        })
    }

    pub fn with_ignore_files(mut self, enabled: bool) -> Self {
        self.ignore_files = enabled;
        self
    }

    fn admits_file(&self, path: &VirtualPath) -> bool {
        if self.excludes.is_match(path.as_str()) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn admits_dir(&self, path: &VirtualPath) -> bool {
        // `**/target/**` must exclude the `target` directory itself
        let inside = format!("{}/_", path.as_str());
        !(self.excludes.is_match(path.as_str()) || self.excludes.is_match(inside))
    }

    /// A walker over the direct children of `dir`, sorted by name.
    fn walker(&self, dir: &Path) -> WalkBuilder {
        let mut builder = WalkBuilder::new(dir);
        builder
            .max_depth(Some(1))
            .follow_links(self.follow_symlinks)
            .hidden(!self.include_hidden)
            .ignore(self.ignore_files)
            .git_ignore(self.ignore_files)
            .git_global(self.ignore_files)
            .git_exclude(self.ignore_files)
            .parents(self.ignore_files)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if self.ignore_files {
            builder.add_custom_ignore_filename(IGNORE_FILE);
        }
        builder
    }
}

/// Serves a directory on disk. Listings are sorted by name.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
    filter: SourceFilter,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>, filter: SourceFilter) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &VirtualPath) -> PathBuf {
        if path.is_root() {
            self.root.clone()
        } else {
            self.root.join(path.as_str())
        }
    }

    /// The walker only sees one level, so a symlinked directory is checked
    /// against the listed directory's real ancestors here.
    fn is_cycle(dir: &Path, target: &Path) -> bool {
        match (std::fs::canonicalize(dir), std::fs::canonicalize(target)) {
            (Ok(dir), Ok(target)) => dir.starts_with(target),
            _ => true,
        }
    }

    fn list_blocking(&self, path: &VirtualPath) -> Result<Vec<SourceEntry>, SourceError> {
        let dir = self.resolve(path);
        // Surface a missing or unreadable directory before the walker swallows it
        std::fs::read_dir(&dir).map_err(|err| SourceError::io(path.as_str(), &err))?;

        let mut entries = Vec::new();
        for entry in self.filter.walker(&dir).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };

            let child = path.join(&name);
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if entry.path_is_symlink() && Self::is_cycle(&dir, entry.path()) {
                    debug!(path = %entry.path().display(), "Skipping symlink cycle");
                } else if self.filter.admits_dir(&child) {
                    entries.push(SourceEntry::folder(name));
                    continue;
                }
            } else if file_type.is_file() && self.filter.admits_file(&child) {
                match entry.metadata() {
                    Ok(metadata) => {
                        entries.push(SourceEntry::file(name, metadata.len()));
                        continue;
                    }
                    Err(err) => debug!(path = %child, error = %err, "Skipping file without metadata"),
                }
            }
            trace!(path = %child, "Filtered entry");
        }
        Ok(entries)
    }
}

#[async_trait]
impl TreeSource for FsSource {
    async fn list_dir(&self, path: &VirtualPath) -> Result<Vec<SourceEntry>, SourceError> {
        let source = self.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || source.list_blocking(&target))
            .await
            .map_err(|err| {
                SourceError::new(
                    path.as_str(),
                    SourceErrorKind::Other,
                    format!("listing task failed: {}", err),
                )
            })?
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>, SourceError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|err| SourceError::io(path.as_str(), &err))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EntryKind;
    use tempfile::TempDir;

    fn md_filter() -> SourceFilter {
        SourceFilter::new(
            true,
            &["md".to_string()],
            &["**/.git/**".to_string(), "**/target/**".to_string()],
            false,
        )
        .unwrap()
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        std::fs::write(dir.path().join(".hidden.md"), "skip").unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.MD"), "# C").unwrap();
        std::fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_dir_filters_and_sorts() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), md_filter());

        let entries = source.list_dir(&VirtualPath::root()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md", "sub"]);
        assert_eq!(entries[0].size, Some(3));
        assert_eq!(entries[2].kind, EntryKind::Folder);

        let sub = source.list_dir(&VirtualPath::parse("sub").unwrap()).await.unwrap();
        assert_eq!(sub, vec![SourceEntry::file("c.MD", 3)]);
    }

    #[tokio::test]
    async fn test_default_filter_admits_everything() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), SourceFilter::default());
        let entries = source.list_dir(&VirtualPath::root()).await.unwrap();
        assert_eq!(entries.len(), 6);
    }

    #[tokio::test]
    async fn test_read_file_and_missing_dir() {
        let dir = fixture();
        let source = FsSource::new(dir.path(), md_filter());

        let bytes = source.read_file(&VirtualPath::parse("a.md").unwrap()).await.unwrap();
        assert_eq!(bytes, b"# A");

        let err = source.list_dir(&VirtualPath::parse("nope").unwrap()).await.unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::NotFound);
        assert_eq!(err.path, "nope");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_is_skipped() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();
        let source = FsSource::new(dir.path(), md_filter());

        let sub = source.list_dir(&VirtualPath::parse("sub").unwrap()).await.unwrap();
        assert_eq!(sub.len(), 1);
    }

    #[tokio::test]
    async fn test_gitignore_is_honored() {
        let dir = fixture();
        std::fs::write(dir.path().join(".gitignore"), "drafts/\nscratch.md\n").unwrap();
        std::fs::write(dir.path().join("scratch.md"), "skip").unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/wip.md"), "# WIP").unwrap();

        let source = FsSource::new(dir.path(), md_filter());
        let names: Vec<_> = source
            .list_dir(&VirtualPath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "sub"]);

        let permissive = FsSource::new(dir.path(), md_filter().with_ignore_files(false));
        let names: Vec<_> = permissive
            .list_dir(&VirtualPath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "drafts", "scratch.md", "sub"]);
    }

    #[tokio::test]
    async fn test_zenkatignore_applies_to_subdirectories() {
        let dir = fixture();
        std::fs::write(dir.path().join(IGNORE_FILE), "c.MD\n").unwrap();
        let source = FsSource::new(dir.path(), md_filter());

        let sub = source.list_dir(&VirtualPath::parse("sub").unwrap()).await.unwrap();
        assert!(sub.is_empty());
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        assert!(SourceFilter::new(true, &[], &["a/{b".to_string()], false).is_err());
    }
}
