//! Structural and content predicates over a tree's node graph.
//!
//! Predicates arrive as externally tagged JSON:
//!
//! ```json
//! {"and": [{"kind": "file"}, "missing_content", {"path_glob": "sub/**"}]}
//! ```

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::decoder::BlockType;
use crate::error::{Result, ZenkatError};
use crate::id::{NodeId, VirtualPath};
use crate::node::{HydrationState, Node, NodeKind};
use crate::store::TreeView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Predicate {
    /// Every node
    All,
    Kind(NodeKind),
    /// Files in the given hydration state
    Hydration(HydrationState),
    /// Files whose content is not resident
    MissingContent,
    /// Files whose content is resident
    HasContent,
    /// Glob over the virtual path, without the leading slash
    PathGlob(String),
    PathPrefix(String),
    Extension(String),
    /// Exact entry name
    Name(String),
    ChildOf(NodeId),
    DescendantOf(NodeId),
    Depth {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    /// Substring of the raw content
    ContentContains(String),
    /// A decoded heading with this level and/or containing this text
    HasHeading {
        #[serde(default)]
        level: Option<u8>,
        #[serde(default)]
        text: Option<String>,
    },
    BlockType(BlockType),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse and validate a JSON predicate.
    pub fn parse_json(json: &str) -> Result<Self> {
        let predicate: Self =
            serde_json::from_str(json).map_err(|e| ZenkatError::invalid_query(e.to_string()))?;
        predicate.compile()?;
        Ok(predicate)
    }

    /// Whether evaluating this predicate reads file content.
    pub fn needs_content(&self) -> bool {
        match self {
            Self::ContentContains(_) | Self::HasHeading { .. } | Self::BlockType(_) => true,
            Self::And(items) | Self::Or(items) => items.iter().any(Self::needs_content),
            Self::Not(inner) => inner.needs_content(),
            Self::All
            | Self::Kind(_)
            | Self::Hydration(_)
            | Self::MissingContent
            | Self::HasContent
            | Self::PathGlob(_)
            | Self::PathPrefix(_)
            | Self::Extension(_)
            | Self::Name(_)
            | Self::ChildOf(_)
            | Self::DescendantOf(_)
            | Self::Depth { .. } => false,
        }
    }

    /// Validate and prepare for evaluation.
    pub fn compile(&self) -> Result<CompiledPredicate> {
        let compiled = match self {
            Self::All => CompiledPredicate::All,
            Self::Kind(kind) => CompiledPredicate::Kind(*kind),
            Self::Hydration(state) => CompiledPredicate::Hydration(*state),
            Self::MissingContent => CompiledPredicate::MissingContent,
            Self::HasContent => CompiledPredicate::HasContent,
            Self::PathGlob(pattern) => {
                let glob = Glob::new(pattern.trim_start_matches('/')).map_err(|e| {
                    ZenkatError::invalid_query(format!("invalid glob '{}': {}", pattern, e))
                })?;
                CompiledPredicate::PathGlob(glob.compile_matcher())
            }
            Self::PathPrefix(prefix) => {
                let path = VirtualPath::parse(prefix).ok_or_else(|| {
                    ZenkatError::invalid_query(format!("invalid path prefix '{}'", prefix))
                })?;
                CompiledPredicate::PathPrefix(path)
            }
            Self::Extension(ext) => {
                CompiledPredicate::Extension(ext.trim_start_matches('.').to_ascii_lowercase())
            }
            Self::Name(name) => CompiledPredicate::Name(name.clone()),
            Self::ChildOf(id) => CompiledPredicate::ChildOf(id.clone()),
            Self::DescendantOf(id) => CompiledPredicate::DescendantOf(id.clone()),
            Self::Depth { min, max } => {
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(ZenkatError::invalid_query(format!(
                            "depth min {} is greater than max {}",
                            min, max
                        )));
                    }
                }
                CompiledPredicate::Depth {
                    min: min.unwrap_or(0),
                    max: max.unwrap_or(usize::MAX),
                }
            }
            Self::ContentContains(needle) => CompiledPredicate::ContentContains(needle.clone()),
            Self::HasHeading { level, text } => {
                if matches!(level, Some(l) if !(1..=6).contains(l)) {
                    return Err(ZenkatError::invalid_query("heading level must be 1-6"));
                }
                CompiledPredicate::HasHeading {
                    level: *level,
                    text: text.as_ref().map(|t| t.to_lowercase()),
                }
            }
            Self::BlockType(block_type) => CompiledPredicate::BlockType(*block_type),
            Self::And(items) => CompiledPredicate::And(Self::compile_all("and", items)?),
            Self::Or(items) => CompiledPredicate::Or(Self::compile_all("or", items)?),
            Self::Not(inner) => CompiledPredicate::Not(Box::new(inner.compile()?)),
        };
        Ok(compiled)
    }

    fn compile_all(op: &str, items: &[Predicate]) -> Result<Vec<CompiledPredicate>> {
        if items.is_empty() {
            return Err(ZenkatError::invalid_query(format!("'{}' needs at least one operand", op)));
        }
        items.iter().map(Self::compile).collect()
    }
}

/// A validated predicate ready to run against a [`TreeView`].
#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    All,
    Kind(NodeKind),
    Hydration(HydrationState),
    MissingContent,
    HasContent,
    PathGlob(GlobMatcher),
    PathPrefix(VirtualPath),
    Extension(String),
    Name(String),
    ChildOf(NodeId),
    DescendantOf(NodeId),
    Depth { min: usize, max: usize },
    ContentContains(String),
    HasHeading { level: Option<u8>, text: Option<String> },
    BlockType(BlockType),
    And(Vec<CompiledPredicate>),
    Or(Vec<CompiledPredicate>),
    Not(Box<CompiledPredicate>),
}

impl CompiledPredicate {
    pub fn matches(&self, node: &Node, view: &TreeView<'_>) -> bool {
        match self {
            Self::All => true,
            Self::Kind(kind) => node.kind() == *kind,
            Self::Hydration(state) => node.hydration_state() == Some(*state),
            Self::MissingContent => node.is_file() && node.content().is_none(),
            Self::HasContent => node.content().is_some(),
            Self::PathGlob(glob) => glob.is_match(node.virtual_path.as_str()),
            Self::PathPrefix(prefix) => node.virtual_path.starts_with(prefix),
            Self::Extension(ext) => node
                .virtual_path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            Self::Name(name) => node.name == *name,
            Self::ChildOf(parent) => node.parent.as_ref() == Some(parent),
            Self::DescendantOf(ancestor) => match view.node(ancestor) {
                Some(ancestor) => {
                    node.id != ancestor.id && node.virtual_path.starts_with(&ancestor.virtual_path)
                }
                None => false,
            },
            Self::Depth { min, max } => (*min..=*max).contains(&node.virtual_path.depth()),
            Self::ContentContains(needle) => node
                .content()
                .is_some_and(|c| String::from_utf8_lossy(&c.raw).contains(needle.as_str())),
            Self::HasHeading { level, text } => node
                .content()
                .and_then(|c| c.decoded.as_ref())
                .is_some_and(|doc| {
                    doc.headings().any(|(l, t)| {
                        level.is_none_or(|want| want == l)
                            && text.as_ref().is_none_or(|want| t.to_lowercase().contains(want))
                    })
                }),
            Self::BlockType(block_type) => node
                .content()
                .and_then(|c| c.decoded.as_ref())
                .is_some_and(|doc| doc.contains(*block_type)),
            Self::And(items) => items.iter().all(|p| p.matches(node, view)),
            Self::Or(items) => items.iter().any(|p| p.matches(node, view)),
            Self::Not(inner) => !inner.matches(node, view),
        }
    }
}
