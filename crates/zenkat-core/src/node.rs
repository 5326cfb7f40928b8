//! Node records held by the [`NodeStore`](crate::store::NodeStore).

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::decoder::{DecodeWarning, Document};
use crate::id::{NodeId, VirtualPath};

/// Kind of entry a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// Hydration axis of a file node. Folders have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HydrationState {
    Dehydrated,
    Hydrating,
    Hydrated,
}

/// Resident content of a hydrated file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    /// Raw bytes as fetched from the source, rendered as lossy UTF-8 text
    #[serde(rename = "text", serialize_with = "serialize_lossy")]
    pub raw: Vec<u8>,
    /// Structured form, absent when decoding failed or is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<DecodeWarning>,
}

fn serialize_lossy<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(raw))
}

impl Content {
    pub fn new(raw: Vec<u8>, decoded: Option<Document>, warning: Option<DecodeWarning>) -> Self {
        Self {
            raw,
            decoded,
            warning,
        }
    }

    /// Resident size in bytes, used for memory budgeting.
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Raw content as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw).ok()
    }
}

/// Per-file hydration state. Content exists only in the hydrated state.
#[derive(Debug, Clone)]
pub enum FileState {
    Dehydrated,
    Hydrating,
    Hydrated(Arc<Content>),
}

impl FileState {
    pub fn hydration(&self) -> HydrationState {
        match self {
            Self::Dehydrated => HydrationState::Dehydrated,
            Self::Hydrating => HydrationState::Hydrating,
            Self::Hydrated(_) => HydrationState::Hydrated,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Folder {
        /// Children in the order the source listed them
        children: Vec<NodeId>,
    },
    File {
        size: Option<u64>,
        state: FileState,
    },
}

/// One entry of a tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub virtual_path: VirtualPath,
    pub name: String,
    /// `None` only for the tree root
    pub parent: Option<NodeId>,
    pub data: NodeData,
}

impl Node {
    pub fn folder(id: NodeId, virtual_path: VirtualPath, name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            id,
            virtual_path,
            name: name.into(),
            parent,
            data: NodeData::Folder {
                children: Vec::new(),
            },
        }
    }

    pub fn file(
        id: NodeId,
        virtual_path: VirtualPath,
        name: impl Into<String>,
        parent: NodeId,
        size: Option<u64>,
    ) -> Self {
        Self {
            id,
            virtual_path,
            name: name.into(),
            parent: Some(parent),
            data: NodeData::File {
                size,
                state: FileState::Dehydrated,
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Folder { .. } => NodeKind::Folder,
            NodeData::File { .. } => NodeKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind() == NodeKind::File
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Folder { children } => children,
            NodeData::File { .. } => &[],
        }
    }

    pub fn hydration_state(&self) -> Option<HydrationState> {
        match &self.data {
            NodeData::File { state, .. } => Some(state.hydration()),
            NodeData::Folder { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&Arc<Content>> {
        match &self.data {
            NodeData::File {
                state: FileState::Hydrated(content),
                ..
            } => Some(content),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.data {
            NodeData::File { size, .. } => *size,
            NodeData::Folder { .. } => None,
        }
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            virtual_path: self.virtual_path.to_string(),
            kind: self.kind(),
            parent: self.parent.clone(),
            hydration: self.hydration_state(),
            child_count: match &self.data {
                NodeData::Folder { children } => Some(children.len()),
                NodeData::File { .. } => None,
            },
            size: self.size(),
        }
    }

    pub fn detail(&self) -> NodeDetail {
        NodeDetail {
            summary: self.summary(),
            children: self.children().to_vec(),
            content: self.content().cloned(),
        }
    }
}

/// Abbreviated node view returned by listings and queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub virtual_path: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hydration: Option<HydrationState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Full node view including children and resident content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub summary: NodeSummary,
    pub children: Vec<NodeId>,
    pub content: Option<Arc<Content>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node() -> Node {
        let root = NodeId::derive("docs", &VirtualPath::root());
        let path = VirtualPath::parse("a.md").unwrap();
        Node::file(NodeId::derive("docs", &path), path, "a.md", root, Some(5))
    }

    #[test]
    fn test_file_starts_dehydrated_without_content() {
        let node = file_node();
        assert_eq!(node.kind(), NodeKind::File);
        assert_eq!(node.hydration_state(), Some(HydrationState::Dehydrated));
        assert!(node.content().is_none());
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_folder_has_no_hydration_axis() {
        let root = Node::folder(
            NodeId::derive("docs", &VirtualPath::root()),
            VirtualPath::root(),
            "docs",
            None,
        );
        assert!(root.is_root());
        assert_eq!(root.hydration_state(), None);
        assert_eq!(root.summary().child_count, Some(0));
    }

    #[test]
    fn test_detail_serializes_content_as_text() {
        let mut node = file_node();
        node.data = NodeData::File {
            size: Some(5),
            state: FileState::Hydrated(Arc::new(Content::new(b"# Hi\n".to_vec(), None, None))),
        };

        let json = serde_json::to_value(node.detail()).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["hydration"], "hydrated");
        assert_eq!(json["virtual_path"], "/a.md");
        assert_eq!(json["content"]["text"], "# Hi\n");
    }
}
