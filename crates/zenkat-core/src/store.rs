//! In-memory Node Store.
//!
//! The store owns every [`Tree`] and [`Node`] record. Each tree lives in its own
//! slot behind a `parking_lot::RwLock`, so mutations on one tree never contend
//! with another and readers always see a whole pre- or post-mutation snapshot.
//! Nothing in here performs I/O.
//!
//! Structural invariants (dangling parents, duplicate ids, content on a
//! non-hydrated file) are asserted. Violations are bugs in the caller and
//! panic instead of returning an error.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, ZenkatError};
use crate::id::{NodeId, VirtualPath};
use crate::node::{Content, FileState, Node, NodeData};
use crate::tree::{Tree, TreeState, TreeStats};

/// Outcome of [`NodeStore::begin_crawl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStart {
    /// The graph is already known; nothing to do.
    Loaded(NodeId),
    /// The tree moved to `LOADING_METADATA`; install with this generation.
    Started { generation: u64, root: NodeId },
    /// Another crawl already owns `LOADING_METADATA`.
    InProgress,
}

/// Outcome of [`NodeStore::begin_hydration`].
#[derive(Debug, Clone)]
pub enum HydrationStart {
    /// The file is already resident.
    Resident(Arc<Content>),
    /// The file moved to `HYDRATING`; the caller must fetch it.
    Fetch(FetchTicket),
}

/// What a hydration needs to know to fetch a file and store the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub path: VirtualPath,
    pub size: Option<u64>,
}

struct TreeData {
    tree: Tree,
    nodes: HashMap<NodeId, Node>,
    /// Node ids in crawl order
    order: Vec<NodeId>,
    folder_count: usize,
    file_count: usize,
    hydrated_count: usize,
    resident_bytes: usize,
    /// Bumped on every unload so stale crawls and fetches can be detected
    generation: u64,
}

impl TreeData {
    fn new(tree: Tree) -> Self {
        Self {
            tree,
            nodes: HashMap::new(),
            order: Vec::new(),
            folder_count: 0,
            file_count: 0,
            hydrated_count: 0,
            resident_bytes: 0,
            generation: 0,
        }
    }

    fn clear_graph(&mut self) {
        self.nodes.clear();
        self.order.clear();
        self.folder_count = 0;
        self.file_count = 0;
        self.hydrated_count = 0;
        self.resident_bytes = 0;
        self.tree.root_node = None;
        self.tree.state = TreeState::Unloaded;
        self.generation += 1;
    }

    fn refresh_state(&mut self) {
        if self.tree.state.is_loaded() {
            self.tree.state = TreeState::derive(self.hydrated_count, self.file_count);
        }
    }

    /// Insert a new node or replace an existing one, linking it to its parent.
    fn upsert(&mut self, node: Node) {
        match &node.parent {
            None => {
                assert!(
                    node.virtual_path.is_root() && !node.is_file(),
                    "tree '{}': parentless node {} is not the root folder",
                    self.tree.name,
                    node.virtual_path
                );
                assert_eq!(
                    self.tree.root_node.as_ref(),
                    Some(&node.id),
                    "tree '{}': root id mismatch",
                    self.tree.name
                );
            }
            Some(parent) => {
                let parent_node = self.nodes.get_mut(parent).unwrap_or_else(|| {
                    panic!(
                        "tree '{}': node {} has dangling parent {}",
                        self.tree.name, node.virtual_path, parent
                    )
                });
                match &mut parent_node.data {
                    NodeData::Folder { children } => {
                        if !children.contains(&node.id) {
                            children.push(node.id.clone());
                        }
                    }
                    NodeData::File { .. } => panic!(
                        "tree '{}': parent of {} is a file",
                        self.tree.name, node.virtual_path
                    ),
                }
            }
        }

        let mut node = node;
        if let Some(previous) = self.nodes.remove(&node.id) {
            self.forget_counts(&previous);
            // Replacing a folder keeps the children the crawler linked
            if let (NodeData::Folder { children: old }, NodeData::Folder { children: new }) =
                (previous.data, &mut node.data)
            {
                if new.is_empty() {
                    *new = old;
                }
            }
        } else {
            self.order.push(node.id.clone());
        }
        self.record_counts(&node);
        self.nodes.insert(node.id.clone(), node);
        self.refresh_state();
    }

    fn record_counts(&mut self, node: &Node) {
        match &node.data {
            NodeData::Folder { .. } => self.folder_count += 1,
            NodeData::File { state, .. } => {
                self.file_count += 1;
                if let FileState::Hydrated(content) = state {
                    self.hydrated_count += 1;
                    self.resident_bytes += content.size();
                }
            }
        }
    }

    fn forget_counts(&mut self, node: &Node) {
        match &node.data {
            NodeData::Folder { .. } => self.folder_count -= 1,
            NodeData::File { state, .. } => {
                self.file_count -= 1;
                if let FileState::Hydrated(content) = state {
                    self.hydrated_count -= 1;
                    self.resident_bytes -= content.size();
                }
            }
        }
    }

    fn set_file_state(&mut self, id: &NodeId, new_state: FileState) -> Option<TreeState> {
        let node = self.nodes.get_mut(id)?;
        let NodeData::File { state, .. } = &mut node.data else {
            panic!(
                "tree '{}': hydration state set on folder {}",
                self.tree.name, node.virtual_path
            );
        };

        if let FileState::Hydrated(content) = state {
            self.hydrated_count -= 1;
            self.resident_bytes -= content.size();
        }
        if let FileState::Hydrated(content) = &new_state {
            self.hydrated_count += 1;
            self.resident_bytes += content.size();
        }
        *state = new_state;

        self.refresh_state();
        Some(self.tree.state)
    }

    fn stats(&self) -> TreeStats {
        TreeStats {
            folders: self.folder_count,
            files: self.file_count,
            hydrated: self.hydrated_count,
            resident_bytes: self.resident_bytes,
            state: Some(self.tree.state),
        }
    }
}

/// Read-only view of one tree, valid while the tree's read lock is held.
pub struct TreeView<'a> {
    data: &'a TreeData,
}

impl<'a> TreeView<'a> {
    pub fn tree(&self) -> &'a Tree {
        &self.data.tree
    }

    pub fn node(&self, id: &NodeId) -> Option<&'a Node> {
        self.data.nodes.get(id)
    }

    pub fn root(&self) -> Option<&'a Node> {
        self.data.tree.root_node.as_ref().and_then(|id| self.data.nodes.get(id))
    }

    /// Nodes in crawl order, root first.
    pub fn nodes(&self) -> impl Iterator<Item = &'a Node> + 'a {
        let data = self.data;
        data.order.iter().filter_map(move |id| data.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.data.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nodes.is_empty()
    }

    pub fn stats(&self) -> TreeStats {
        self.data.stats()
    }
}

struct TreeSlot {
    data: RwLock<TreeData>,
}

/// Process-wide holder of tree and node records.
#[derive(Default)]
pub struct NodeStore {
    trees: DashMap<String, Arc<TreeSlot>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The DashMap guard is dropped before the slot lock is taken
    fn slot(&self, name: &str) -> Option<Arc<TreeSlot>> {
        self.trees.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn slot_or_err(&self, name: &str) -> Result<Arc<TreeSlot>> {
        self.slot(name).ok_or_else(|| ZenkatError::tree_not_found(name))
    }

    /// Register a tree in the `UNLOADED` state unless it is already known.
    pub fn ensure_tree(&self, name: &str, virtual_path: &str) -> Tree {
        let slot = self
            .trees
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(tree = %name, "Registering tree in store");
                Arc::new(TreeSlot {
                    data: RwLock::new(TreeData::new(Tree::unloaded(name, virtual_path))),
                })
            })
            .value()
            .clone();
        // Bound so the read guard drops before `slot`
        let tree = slot.data.read().tree.clone();
        tree
    }

    /// Drop a tree and all its nodes.
    pub fn remove_tree(&self, name: &str) -> bool {
        self.trees.remove(name).is_some()
    }

    pub fn tree_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get_tree(&self, name: &str) -> Option<Tree> {
        self.slot(name).map(|slot| slot.data.read().tree.clone())
    }

    pub fn get_node(&self, tree: &str, id: &NodeId) -> Option<Node> {
        let slot = self.slot(tree)?;
        let data = slot.data.read();
        data.nodes.get(id).cloned()
    }

    /// Children of a folder in source order. `None` if the node is unknown.
    pub fn list_children(&self, tree: &str, id: &NodeId) -> Option<Vec<NodeId>> {
        let slot = self.slot(tree)?;
        let data = slot.data.read();
        data.nodes.get(id).map(|node| node.children().to_vec())
    }

    /// Insert or replace a node of a tree whose root is known.
    ///
    /// # Panics
    ///
    /// If the tree is unknown, the parent does not exist, or a parentless node
    /// is not the tree's root folder.
    pub fn upsert_node(&self, tree: &str, node: Node) {
        let slot = self
            .slot(tree)
            .unwrap_or_else(|| panic!("upsert into unknown tree '{}'", tree));
        slot.data.write().upsert(node);
    }

    /// Move a tree between `UNLOADED` and `LOADING_METADATA`.
    ///
    /// `UNLOADED` discards the node graph. The `LOADED_*` states are derived
    /// from hydration counts and cannot be set.
    pub(crate) fn set_tree_state(&self, tree: &str, state: TreeState) -> Result<()> {
        let slot = self.slot_or_err(tree)?;
        let mut data = slot.data.write();
        match state {
            TreeState::Unloaded => data.clear_graph(),
            TreeState::LoadingMetadata => {
                assert_eq!(
                    data.tree.state,
                    TreeState::Unloaded,
                    "tree '{}': crawl started from {}",
                    tree,
                    data.tree.state
                );
                data.tree.state = TreeState::LoadingMetadata;
                data.tree.root_node = Some(NodeId::derive(tree, &VirtualPath::root()));
            }
            TreeState::LoadedMetadataOnly | TreeState::LoadedPartial | TreeState::LoadedFull => {
                panic!("tree '{}': {} is derived and cannot be set", tree, state)
            }
        }
        Ok(())
    }

    /// Set a file's hydration state and recompute the tree state under the
    /// same write lock. Returns the new tree state, or `None` if the node no
    /// longer exists.
    pub fn set_node_hydration(&self, tree: &str, id: &NodeId, state: FileState) -> Option<TreeState> {
        let slot = self.slot(tree)?;
        let mut data = slot.data.write();
        data.set_file_state(id, state)
    }

    /// Atomically claim a crawl of `tree`.
    pub fn begin_crawl(&self, tree: &str) -> Result<CrawlStart> {
        let slot = self.slot_or_err(tree)?;
        let mut data = slot.data.write();
        if data.tree.state.is_loaded() {
            if let Some(root) = data.tree.root_node.clone() {
                return Ok(CrawlStart::Loaded(root));
            }
        }
        if data.tree.state == TreeState::LoadingMetadata {
            return Ok(CrawlStart::InProgress);
        }
        data.tree.state = TreeState::LoadingMetadata;
        let root = NodeId::derive(tree, &VirtualPath::root());
        data.tree.root_node = Some(root.clone());
        Ok(CrawlStart::Started {
            generation: data.generation,
            root,
        })
    }

    /// Install a crawled graph and advance the tree to `LOADED_METADATA_ONLY`.
    ///
    /// `nodes` must start with the root folder and list every parent before
    /// its children. Returns `false` without touching the tree if it was
    /// unloaded since the crawl began.
    pub fn install_graph(&self, tree: &str, generation: u64, nodes: Vec<Node>) -> bool {
        let Some(slot) = self.slot(tree) else {
            return false;
        };
        let mut data = slot.data.write();
        if data.generation != generation || data.tree.state != TreeState::LoadingMetadata {
            return false;
        }

        assert!(
            data.nodes.is_empty(),
            "tree '{}': graph installed over existing nodes",
            tree
        );
        let mut nodes = nodes.into_iter();
        let root = nodes.next();
        assert!(
            matches!(&root, Some(node) if node.parent.is_none()),
            "tree '{}': crawled graph does not start with the root",
            tree
        );

        for node in root.into_iter().chain(nodes) {
            assert!(
                !data.nodes.contains_key(&node.id),
                "tree '{}': duplicate node id for {}",
                tree,
                node.virtual_path
            );
            assert!(
                node.children().is_empty(),
                "tree '{}': crawled folder {} arrived pre-linked",
                tree,
                node.virtual_path
            );
            data.upsert(node);
        }

        data.tree.state = TreeState::LoadedMetadataOnly;
        data.refresh_state();
        true
    }

    /// Revert a failed crawl to `UNLOADED` if it is still current.
    pub fn abort_crawl(&self, tree: &str, generation: u64) {
        if let Some(slot) = self.slot(tree) {
            let mut data = slot.data.write();
            if data.generation == generation && data.tree.state == TreeState::LoadingMetadata {
                data.tree.state = TreeState::Unloaded;
                data.tree.root_node = None;
            }
        }
    }

    /// Drop the node graph and all content, returning the tree to `UNLOADED`.
    pub fn reset_tree(&self, tree: &str) -> Result<()> {
        self.set_tree_state(tree, TreeState::Unloaded)
    }

    pub fn set_virtual_path(&self, tree: &str, virtual_path: &str) -> Result<()> {
        let slot = self.slot_or_err(tree)?;
        slot.data.write().tree.virtual_path = virtual_path.to_string();
        Ok(())
    }

    /// Atomically claim the hydration of a file.
    ///
    /// Checks run in order: tree known, metadata loaded, node known, node is a
    /// file. None of them touch the source.
    pub fn begin_hydration(&self, tree: &str, id: &NodeId) -> Result<HydrationStart> {
        let slot = self.slot_or_err(tree)?;
        let mut data = slot.data.write();
        if !data.tree.state.is_loaded() {
            return Err(ZenkatError::not_metadata_loaded(tree));
        }
        let generation = data.generation;
        let node = data
            .nodes
            .get(id)
            .ok_or_else(|| ZenkatError::node_not_found(tree, id))?;

        let (path, size, state) = match &node.data {
            NodeData::Folder { .. } => return Err(ZenkatError::not_a_file(tree, id.clone())),
            NodeData::File { size, state } => (node.virtual_path.clone(), *size, state),
        };
        if let FileState::Hydrated(content) = state {
            return Ok(HydrationStart::Resident(Arc::clone(content)));
        }

        data.set_file_state(id, FileState::Hydrating);
        Ok(HydrationStart::Fetch(FetchTicket {
            generation,
            path,
            size,
        }))
    }

    /// Store fetched content. Returns the new tree state, or `None` if the
    /// tree was unloaded while the fetch ran.
    pub fn complete_hydration(
        &self,
        tree: &str,
        generation: u64,
        id: &NodeId,
        content: Arc<Content>,
    ) -> Option<TreeState> {
        let slot = self.slot(tree)?;
        let mut data = slot.data.write();
        if data.generation != generation {
            return None;
        }
        data.set_file_state(id, FileState::Hydrated(content))
    }

    /// Revert a failed fetch to `DEHYDRATED`.
    pub fn fail_hydration(&self, tree: &str, generation: u64, id: &NodeId) {
        if let Some(slot) = self.slot(tree) {
            let mut data = slot.data.write();
            if data.generation == generation {
                data.set_file_state(id, FileState::Dehydrated);
            }
        }
    }

    /// Drop a file's content. Returns the number of bytes released, or `None`
    /// if the file was not hydrated (including while it is hydrating).
    pub fn evict(&self, tree: &str, id: &NodeId) -> Result<Option<usize>> {
        let slot = self.slot_or_err(tree)?;
        let mut data = slot.data.write();
        let node = data
            .nodes
            .get(id)
            .ok_or_else(|| ZenkatError::node_not_found(tree, id))?;
        let freed = match &node.data {
            NodeData::Folder { .. } => return Err(ZenkatError::not_a_file(tree, id.clone())),
            NodeData::File {
                state: FileState::Hydrated(content),
                ..
            } => content.size(),
            NodeData::File { .. } => return Ok(None),
        };
        data.set_file_state(id, FileState::Dehydrated);
        Ok(Some(freed))
    }

    /// Run `f` against a consistent snapshot of one tree.
    pub fn read_tree<R>(&self, tree: &str, f: impl FnOnce(TreeView<'_>) -> R) -> Option<R> {
        let slot = self.slot(tree)?;
        let data = slot.data.read();
        Some(f(TreeView { data: &data }))
    }

    pub fn stats(&self, tree: &str) -> Option<TreeStats> {
        self.read_tree(tree, |view| view.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).unwrap()
    }

    fn docs_graph() -> Vec<Node> {
        let root_id = NodeId::derive("docs", &VirtualPath::root());
        let sub_id = NodeId::derive("docs", &path("sub"));
        vec![
            Node::folder(root_id.clone(), VirtualPath::root(), "docs", None),
            Node::file(NodeId::derive("docs", &path("a.md")), path("a.md"), "a.md", root_id.clone(), Some(3)),
            Node::folder(sub_id.clone(), path("sub"), "sub", Some(root_id)),
            Node::file(NodeId::derive("docs", &path("sub/b.md")), path("sub/b.md"), "b.md", sub_id, Some(3)),
        ]
    }

    fn loaded_store() -> NodeStore {
        let store = NodeStore::new();
        store.ensure_tree("docs", "/docs");
        let CrawlStart::Started { generation, .. } = store.begin_crawl("docs").unwrap() else {
            panic!("expected crawl to start");
        };
        assert!(store.install_graph("docs", generation, docs_graph()));
        store
    }

    fn content(text: &str) -> Arc<Content> {
        Arc::new(Content::new(text.as_bytes().to_vec(), None, None))
    }

    #[test]
    fn test_unloaded_tree_has_no_root() {
        let store = NodeStore::new();
        let tree = store.ensure_tree("docs", "/docs");
        assert_eq!(tree.state, TreeState::Unloaded);
        assert!(tree.root_node.is_none());
        assert!(store.get_tree("missing").is_none());
    }

    #[test]
    fn test_begin_crawl_sets_root() {
        let store = NodeStore::new();
        store.ensure_tree("docs", "/docs");
        let start = store.begin_crawl("docs").unwrap();
        let tree = store.get_tree("docs").unwrap();
        assert_eq!(tree.state, TreeState::LoadingMetadata);
        assert!(tree.root_node.is_some());
        assert!(matches!(start, CrawlStart::Started { generation: 0, .. }));
    }

    #[test]
    fn test_begin_crawl_refuses_second_claim() {
        let store = NodeStore::new();
        store.ensure_tree("docs", "/docs");
        assert!(matches!(store.begin_crawl("docs").unwrap(), CrawlStart::Started { .. }));
        assert_eq!(store.begin_crawl("docs").unwrap(), CrawlStart::InProgress);
    }

    #[test]
    fn test_install_links_children_in_order() {
        let store = loaded_store();
        let tree = store.get_tree("docs").unwrap();
        assert_eq!(tree.state, TreeState::LoadedMetadataOnly);

        let root = tree.root_node.unwrap();
        let children = store.list_children("docs", &root).unwrap();
        assert_eq!(
            children,
            vec![NodeId::derive("docs", &path("a.md")), NodeId::derive("docs", &path("sub"))]
        );

        let stats = store.stats("docs").unwrap();
        assert_eq!(stats.folders, 2);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.hydrated, 0);
    }

    #[test]
    fn test_begin_crawl_on_loaded_tree_returns_root() {
        let store = loaded_store();
        let root = store.get_tree("docs").unwrap().root_node.unwrap();
        assert_eq!(store.begin_crawl("docs").unwrap(), CrawlStart::Loaded(root));
    }

    #[test]
    fn test_hydration_counts_drive_state() {
        let store = loaded_store();
        let a = NodeId::derive("docs", &path("a.md"));
        let b = NodeId::derive("docs", &path("sub/b.md"));

        let state = store.set_node_hydration("docs", &a, FileState::Hydrated(content("aaa")));
        assert_eq!(state, Some(TreeState::LoadedPartial));
        let state = store.set_node_hydration("docs", &b, FileState::Hydrated(content("bbbb")));
        assert_eq!(state, Some(TreeState::LoadedFull));
        assert_eq!(store.stats("docs").unwrap().resident_bytes, 7);

        // Hydrating does not count as hydrated
        let state = store.set_node_hydration("docs", &b, FileState::Hydrating);
        assert_eq!(state, Some(TreeState::LoadedPartial));
        assert_eq!(store.stats("docs").unwrap().resident_bytes, 3);
    }

    #[test]
    fn test_begin_hydration_checks() {
        let store = NodeStore::new();
        store.ensure_tree("docs", "/docs");
        let a = NodeId::derive("docs", &path("a.md"));
        let err = store.begin_hydration("docs", &a).unwrap_err();
        assert!(matches!(err, ZenkatError::NotMetadataLoaded { .. }));

        let store = loaded_store();
        let sub = NodeId::derive("docs", &path("sub"));
        let err = store.begin_hydration("docs", &sub).unwrap_err();
        assert!(matches!(err, ZenkatError::NotAFile { .. }));

        let missing = NodeId::derive("docs", &path("zzz.md"));
        let err = store.begin_hydration("docs", &missing).unwrap_err();
        assert!(matches!(err, ZenkatError::NodeNotFound { .. }));
    }

    #[test]
    fn test_stale_hydration_is_dropped_after_reset() {
        let store = loaded_store();
        let a = NodeId::derive("docs", &path("a.md"));
        let HydrationStart::Fetch(ticket) = store.begin_hydration("docs", &a).unwrap() else {
            panic!("expected fetch");
        };
        store.reset_tree("docs").unwrap();

        assert_eq!(store.complete_hydration("docs", ticket.generation, &a, content("x")), None);
        let tree = store.get_tree("docs").unwrap();
        assert_eq!(tree.state, TreeState::Unloaded);
        assert!(tree.root_node.is_none());
    }

    #[test]
    fn test_evict_only_hydrated_files() {
        let store = loaded_store();
        let a = NodeId::derive("docs", &path("a.md"));
        assert_eq!(store.evict("docs", &a).unwrap(), None);

        store.set_node_hydration("docs", &a, FileState::Hydrated(content("aaa")));
        assert_eq!(store.evict("docs", &a).unwrap(), Some(3));
        assert_eq!(store.get_tree("docs").unwrap().state, TreeState::LoadedMetadataOnly);
    }

    #[test]
    fn test_abort_crawl_reverts_to_unloaded() {
        let store = NodeStore::new();
        store.ensure_tree("docs", "/docs");
        let CrawlStart::Started { generation, .. } = store.begin_crawl("docs").unwrap() else {
            panic!("expected crawl to start");
        };
        store.abort_crawl("docs", generation);
        let tree = store.get_tree("docs").unwrap();
        assert_eq!(tree.state, TreeState::Unloaded);
        assert!(tree.root_node.is_none());
    }

    #[test]
    #[should_panic(expected = "dangling parent")]
    fn test_dangling_parent_panics() {
        let store = loaded_store();
        let ghost = NodeId::derive("docs", &path("ghost"));
        let p = path("ghost/c.md");
        store.upsert_node("docs", Node::file(NodeId::derive("docs", &p), p, "c.md", ghost, None));
    }

    #[test]
    fn test_upsert_adds_child() {
        let store = loaded_store();
        let sub = NodeId::derive("docs", &path("sub"));
        let p = path("sub/c.md");
        let id = NodeId::derive("docs", &p);
        store.upsert_node("docs", Node::file(id.clone(), p, "c.md", sub.clone(), None));

        assert_eq!(store.list_children("docs", &sub).unwrap().last(), Some(&id));
        assert_eq!(store.stats("docs").unwrap().files, 3);
    }

    #[test]
    #[should_panic(expected = "derived")]
    fn test_derived_state_cannot_be_set() {
        let store = loaded_store();
        let _ = store.set_tree_state("docs", TreeState::LoadedFull);
    }
}
