//! Tree records and the tree load state machine.

use std::fmt;

use serde::Serialize;

use crate::id::NodeId;

/// Coarse load state of a tree, ordered by load progress.
///
/// The three `Loaded*` states are derived from the hydrated and total file
/// counts and are never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreeState {
    Unloaded,
    LoadingMetadata,
    LoadedMetadataOnly,
    LoadedPartial,
    LoadedFull,
}

impl TreeState {
    /// Whether the full node graph is known.
    pub fn is_loaded(&self) -> bool {
        match self {
            Self::Unloaded | Self::LoadingMetadata => false,
            Self::LoadedMetadataOnly | Self::LoadedPartial | Self::LoadedFull => true,
        }
    }

    /// Loaded state implied by the hydrated and total file counts.
    ///
    /// A tree without files has nothing to hydrate and stays metadata-only.
    pub fn derive(hydrated: usize, total: usize) -> Self {
        assert!(hydrated <= total, "{} hydrated of {} files", hydrated, total);
        if hydrated == 0 {
            Self::LoadedMetadataOnly
        } else if hydrated < total {
            Self::LoadedPartial
        } else {
            Self::LoadedFull
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "UNLOADED",
            Self::LoadingMetadata => "LOADING_METADATA",
            Self::LoadedMetadataOnly => "LOADED_METADATA_ONLY",
            Self::LoadedPartial => "LOADED_PARTIAL",
            Self::LoadedFull => "LOADED_FULL",
        }
    }
}

impl fmt::Display for TreeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named hierarchy exposed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tree {
    pub name: String,
    pub virtual_path: String,
    pub state: TreeState,
    /// Present exactly when `state` is not `UNLOADED`
    pub root_node: Option<NodeId>,
}

impl Tree {
    pub fn unloaded(name: impl Into<String>, virtual_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            virtual_path: virtual_path.into(),
            state: TreeState::Unloaded,
            root_node: None,
        }
    }
}

/// Counters describing a tree's residency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub folders: usize,
    pub files: usize,
    pub hydrated: usize,
    pub resident_bytes: usize,
    pub state: Option<TreeState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_state() {
        assert_eq!(TreeState::derive(0, 2), TreeState::LoadedMetadataOnly);
        assert_eq!(TreeState::derive(1, 2), TreeState::LoadedPartial);
        assert_eq!(TreeState::derive(2, 2), TreeState::LoadedFull);
        assert_eq!(TreeState::derive(0, 0), TreeState::LoadedMetadataOnly);
    }

    #[test]
    fn test_state_order_follows_load_progress() {
        assert!(TreeState::Unloaded < TreeState::LoadingMetadata);
        assert!(TreeState::LoadingMetadata < TreeState::LoadedMetadataOnly);
        assert!(TreeState::LoadedPartial < TreeState::LoadedFull);
        assert!(!TreeState::LoadingMetadata.is_loaded());
        assert!(TreeState::LoadedMetadataOnly.is_loaded());
    }

    #[test]
    fn test_state_serializes_screaming() {
        let json = serde_json::to_string(&TreeState::LoadedMetadataOnly).unwrap();
        assert_eq!(json, "\"LOADED_METADATA_ONLY\"");
        assert_eq!(TreeState::LoadedPartial.to_string(), "LOADED_PARTIAL");
    }
}
