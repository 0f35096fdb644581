//! The tree-pass visitor contract.
//!
//! A pass visits every reachable node exactly once in pre-order (parent
//! before children, children left to right). `run_on_tree` reads a node's
//! children *after* visiting it, so a pass that rewrites the children of the
//! node it is standing on sees its own rewrite honoured. The returned `bool`
//! is the "modified" flag the compiler uses to iterate to a fixed point.

use std::collections::HashSet;

use crate::error::PassError;
use crate::tree::{ExecutionTree, Node, NodeId, OperatorKind};

/// A value plus whether producing it changed anything.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed<T> {
    pub data: T,
    pub changed: bool,
}

impl<T> Transformed<T> {
    pub fn yes(data: T) -> Self {
        Self {
            data,
            changed: true,
        }
    }

    pub fn no(data: T) -> Self {
        Self {
            data,
            changed: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transformed<U> {
        Transformed {
            data: f(self.data),
            changed: self.changed,
        }
    }
}

/// Visitor over an [`ExecutionTree`].
///
/// Per-variant hooks default to "no change". A pass that needs structural
/// access (splicing, looking at children) overrides `visit_node` instead.
pub trait TreePass {
    fn name(&self) -> &'static str;

    fn visit_node(&mut self, tree: &mut ExecutionTree, id: NodeId) -> Result<bool, PassError> {
        let node = tree.node_mut(id)?;
        match node.kind {
            OperatorKind::Source { .. } => self.visit_source(node),
            OperatorKind::Map(_) => self.visit_map(node),
            OperatorKind::Shuffle { .. } => self.visit_shuffle(node),
            OperatorKind::Batch { .. } => self.visit_batch(node),
            OperatorKind::Repeat { .. } => self.visit_repeat(node),
            OperatorKind::Project { .. } => self.visit_project(node),
            OperatorKind::Rename { .. } => self.visit_rename(node),
            OperatorKind::Take { .. } => self.visit_take(node),
            OperatorKind::Skip { .. } => self.visit_skip(node),
        }
    }

    fn visit_source(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_map(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_shuffle(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_batch(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_repeat(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_project(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_rename(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_take(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }

    fn visit_skip(&mut self, _node: &mut Node) -> Result<bool, PassError> {
        Ok(false)
    }
}

/// Run `pass` over every reachable node. Returns whether any visit reported
/// a modification.
pub fn run_on_tree<P: TreePass + ?Sized>(
    pass: &mut P,
    tree: &mut ExecutionTree,
) -> Result<bool, PassError> {
    let mut modified = false;
    let mut visited = HashSet::new();
    let mut stack = vec![tree.root()?];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            return Err(PassError::Cycle(id));
        }
        modified |= pass.visit_node(tree, id)?;

        match tree.get(id) {
            Some(node) => stack.extend(node.children.iter().rev().copied()),
            None => {
                // The visit spliced this node out; carry on from its replacement.
                let next = tree.resolve(id);
                if next == id {
                    return Err(PassError::MissingNode(id));
                }
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
        }
    }
    Ok(modified)
}
