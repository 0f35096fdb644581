//! Arena-backed execution tree.
//!
//! Nodes live in a `Vec` and refer to their children by `NodeId` index. The
//! tree owns every node; passes mutate it in place through the helpers below.
//! A spliced-out node leaves a forwarding entry so a traversal that is
//! standing on it can continue with whatever replaced it.

use std::collections::HashMap;
use std::fmt;

use dsflow_core::id::OpId;
use dsflow_operators::{Sampler, SourceSpec};

use crate::error::PassError;
use crate::logical::MapStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum OperatorKind {
    Source { spec: SourceSpec, sampler: Sampler },
    Map(MapStage),
    Shuffle { buffer_size: usize },
    Batch { batch_size: usize, drop_remainder: bool },
    Repeat { count: Option<u32> },
    Project { columns: Vec<String> },
    Rename { from: Vec<String>, to: Vec<String> },
    Take { count: usize },
    Skip { count: usize },
}

impl OperatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Source { .. } => "source",
            OperatorKind::Map(_) => "map",
            OperatorKind::Shuffle { .. } => "shuffle",
            OperatorKind::Batch { .. } => "batch",
            OperatorKind::Repeat { .. } => "repeat",
            OperatorKind::Project { .. } => "project",
            OperatorKind::Rename { .. } => "rename",
            OperatorKind::Take { .. } => "take",
            OperatorKind::Skip { .. } => "skip",
        }
    }

    /// One-line description with parameters.
    pub fn describe(&self) -> String {
        match self {
            OperatorKind::Source { spec, sampler } => format!(
                "source({}, rows={}, sampler={:?})",
                spec.name(),
                spec.len(),
                sampler
            ),
            OperatorKind::Map(stage) => {
                let steps: Vec<String> = stage.steps.iter().map(|s| s.describe()).collect();
                let mut s = format!(
                    "map(steps=[{}], in={:?}, out={:?}",
                    steps.join(", "),
                    stage.input_columns,
                    stage.output_columns
                );
                if !stage.project_columns.is_empty() {
                    s.push_str(&format!(", project={:?}", stage.project_columns));
                }
                if let Some(n) = stage.num_parallel_workers {
                    s.push_str(&format!(", workers={}", n));
                }
                s.push(')');
                s
            }
            OperatorKind::Shuffle { buffer_size } => format!("shuffle(buffer={})", buffer_size),
            OperatorKind::Batch {
                batch_size,
                drop_remainder,
            } => format!(
                "batch(size={}, drop_remainder={})",
                batch_size, drop_remainder
            ),
            OperatorKind::Repeat { count: Some(n) } => format!("repeat({})", n),
            OperatorKind::Repeat { count: None } => "repeat(forever)".to_string(),
            OperatorKind::Project { columns } => format!("project({:?})", columns),
            OperatorKind::Rename { from, to } => format!("rename({:?} -> {:?})", from, to),
            OperatorKind::Take { count } => format!("take({})", count),
            OperatorKind::Skip { count } => format!("skip({})", count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Identity that survives rewrites (used in logs/explain).
    pub id: OpId,
    pub kind: OperatorKind,
    /// Ordered children; sources have none, every other operator has one.
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionTree {
    nodes: Vec<Option<Node>>,
    root: Option<NodeId>,
    forwarded: HashMap<NodeId, NodeId>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; `children` must already be in the tree.
    pub fn add(&mut self, kind: OperatorKind, children: Vec<NodeId>) -> Result<NodeId, PassError> {
        for c in &children {
            self.node(*c)?;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            id: OpId::new(id.0 as u64),
            kind,
            children,
        }));
        Ok(id)
    }

    pub fn set_root(&mut self, id: NodeId) -> Result<(), PassError> {
        self.node(id)?;
        self.root = Some(id);
        Ok(())
    }

    pub fn root(&self) -> Result<NodeId, PassError> {
        self.root
            .ok_or_else(|| PassError::Internal("execution tree has no root".into()))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, PassError> {
        self.get(id).ok_or(PassError::MissingNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, PassError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(PassError::MissingNode(id))
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, PassError> {
        Ok(self.node(id)?.children.clone())
    }

    /// Replace the child list of `id`. Callers are responsible for keeping
    /// the tree acyclic; traversal reports a cycle if they do not.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<(), PassError> {
        for c in &children {
            self.node(*c)?;
        }
        self.node_mut(id)?.children = children;
        Ok(())
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live parent of `id`, if any.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.iter().enumerate().find_map(|(i, n)| {
            n.as_ref()
                .filter(|n| n.children.contains(&id))
                .map(|_| NodeId(i))
        })
    }

    /// Remove a single-child node, linking its child into its place.
    /// Returns the child that took over.
    pub fn splice_out(&mut self, id: NodeId) -> Result<NodeId, PassError> {
        let node = self.node(id)?;
        let child = match node.children.as_slice() {
            [only] => *only,
            other => {
                return Err(PassError::Internal(format!(
                    "cannot splice out {} ({}) with {} children",
                    id,
                    node.kind.name(),
                    other.len()
                )))
            }
        };
        match self.parent_of(id) {
            Some(parent) => {
                for c in self.node_mut(parent)?.children.iter_mut() {
                    if *c == id {
                        *c = child;
                    }
                }
            }
            None if self.root == Some(id) => self.root = Some(child),
            None => {
                return Err(PassError::Internal(format!(
                    "node {} is detached from the tree",
                    id
                )))
            }
        }
        self.nodes[id.0] = None;
        self.forwarded.insert(id, child);
        Ok(child)
    }

    /// Follow splice forwarding until reaching a live node.
    pub fn resolve(&self, mut id: NodeId) -> NodeId {
        while self.get(id).is_none() {
            match self.forwarded.get(&id) {
                Some(next) => id = *next,
                None => break,
            }
        }
        id
    }

    /// Pre-order node ids reachable from the root.
    pub fn preorder(&self) -> Result<Vec<NodeId>, PassError> {
        let mut out = Vec::with_capacity(self.len());
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![self.root()?];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(PassError::Cycle(id));
            }
            let node = self.node(id)?;
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(out)
    }
}
