//! Virtual paths and node identifiers.
//!
//! A [`VirtualPath`] locates an entry relative to its tree root. A [`NodeId`]
//! is an opaque identifier derived from the tree name and virtual path, so a
//! repeated crawl of the same tree hands out the same identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hash bytes kept in a node identifier.
const NODE_ID_BYTES: usize = 16;

/// Normalized `/`-separated path relative to a tree root.
///
/// The root is the empty path and displays as `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The tree root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse and normalize a path.
    ///
    /// Leading, trailing and repeated separators and `.` segments are dropped.
    /// Returns `None` if the path contains a `..` segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s => segments.push(s),
            }
        }
        Some(Self(segments.join("/")))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a single entry name.
    pub fn join(&self, name: &str) -> Self {
        assert!(
            !name.is_empty() && !name.contains('/') && name != "." && name != "..",
            "invalid entry name {:?}",
            name
        );
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Last segment, empty for the root.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Whether `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &VirtualPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }

    /// Path without the leading slash (empty for the root).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// Opaque node identifier, unique within a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Derive the identifier for `path` in `tree`.
    ///
    /// Identifiers are the first 16 bytes of `sha256(tree ‖ 0x00 ‖ path)` in
    /// lowercase hex.
    pub fn derive(tree: &str, path: &VirtualPath) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tree.as_bytes());
        hasher.update([0u8]);
        hasher.update(path.as_str().as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(NODE_ID_BYTES * 2);
        for byte in &digest[..NODE_ID_BYTES] {
            hex.push_str(&format!("{:02x}", byte));
        }
        Self(hex)
    }

    /// Accept a client-supplied identifier if it is well formed.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == NODE_ID_BYTES * 2
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_path_normalization() {
        let path = VirtualPath::parse("/sub//./b.md/").unwrap();
        assert_eq!(path.as_str(), "sub/b.md");
        assert_eq!(path.to_string(), "/sub/b.md");
        assert_eq!(path.depth(), 2);
        assert_eq!(path.file_name(), "b.md");
        assert_eq!(path.extension(), Some("md"));
        assert_eq!(path.parent().unwrap().as_str(), "sub");
        assert!(VirtualPath::parse("a/../b").is_none());
    }

    #[test]
    fn test_virtual_path_root() {
        let root = VirtualPath::parse("/").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(root.depth(), 0);
        assert!(root.parent().is_none());
        assert_eq!(root.join("a.md").as_str(), "a.md");
    }

    #[test]
    fn test_virtual_path_starts_with() {
        let sub = VirtualPath::parse("sub").unwrap();
        assert!(VirtualPath::parse("sub/b.md").unwrap().starts_with(&sub));
        assert!(sub.starts_with(&sub));
        assert!(!VirtualPath::parse("subway/c.md").unwrap().starts_with(&sub));
        assert!(sub.starts_with(&VirtualPath::root()));
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        assert_eq!(VirtualPath::parse(".hidden").unwrap().extension(), None);
        assert_eq!(VirtualPath::parse("README").unwrap().extension(), None);
    }

    #[test]
    fn test_node_id_is_deterministic() {
        let path = VirtualPath::parse("sub/b.md").unwrap();
        let a = NodeId::derive("docs", &path);
        let b = NodeId::derive("docs", &path);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);

        // Same path in another tree gets another id
        assert_ne!(a, NodeId::derive("notes", &path));
        assert_eq!(NodeId::parse(a.as_str()), Some(a));
    }

    #[test]
    fn test_node_id_parse_rejects_garbage() {
        assert!(NodeId::parse("sub/b.md").is_none());
        assert!(NodeId::parse("ABCDEF0123456789ABCDEF0123456789").is_none());
        assert!(NodeId::parse("").is_none());
    }
}
