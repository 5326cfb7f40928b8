//! Query Engine and the types it answers with.

mod engine;
mod predicate;

pub use engine::{EngineOptions, QueryEngine};
pub use predicate::{CompiledPredicate, Predicate};

pub use crate::flight::Wait;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::node::{NodeDetail, NodeSummary};
use crate::tree::TreeState;

/// Accepted eagerness names, for error messages and validation.
pub const EAGERNESS_NAMES: &[&str] = &["none", "metadata", "full"];

/// How much loading a read request may trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eagerness {
    /// Never load; answer from what is resident.
    None,
    /// Crawl unloaded trees.
    #[default]
    Metadata,
    /// Crawl and hydrate whatever the request needs.
    Full,
}

impl Eagerness {
    pub fn crawls(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn hydrates(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl FromStr for Eagerness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "metadata" => Ok(Self::Metadata),
            "full" => Ok(Self::Full),
            _ => Err(format!(
                "unknown eagerness '{}', expected one of: {}",
                s,
                EAGERNESS_NAMES.join(", ")
            )),
        }
    }
}

impl fmt::Display for Eagerness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Metadata => write!(f, "metadata"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Per-request loading policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub eagerness: Eagerness,
    pub wait: Wait,
    /// Return full node details from `query` instead of summaries
    pub detail: bool,
}

impl QueryOptions {
    pub fn new(eagerness: Eagerness, wait: Wait) -> Self {
        Self {
            eagerness,
            wait,
            detail: false,
        }
    }

    pub fn with_detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(Eagerness::default(), Wait::block(Duration::from_secs(30)))
    }
}

/// A query result with its completeness flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer<T> {
    pub data: T,
    /// `false` when the eagerness policy left data the request needs unloaded
    pub complete: bool,
    pub tree_state: TreeState,
}

/// One node matched by a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryHit {
    Summary(NodeSummary),
    Detail(NodeDetail),
}

impl QueryHit {
    pub fn summary(&self) -> &NodeSummary {
        match self {
            Self::Summary(summary) => summary,
            Self::Detail(detail) => &detail.summary,
        }
    }
}
