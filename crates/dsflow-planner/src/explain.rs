//! Human-readable rendering of an execution tree.

use std::fmt::Write as _;

use dsflow_core::hash::{hash_str, Hash256};

use crate::error::PassError;
use crate::tree::{ExecutionTree, NodeId};

/// Indented, one node per line, root first:
///
/// ```text
/// batch(size=2, drop_remainder=false) [OpId(2)]
///   repeat(2) [OpId(1)]
///     source(synthetic_mnist, ...) [OpId(0)]
/// ```
pub fn render(tree: &ExecutionTree) -> Result<String, PassError> {
    let mut out = String::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(tree.root()?, 0)];
    let mut lines = 0usize;
    while let Some((id, depth)) = stack.pop() {
        lines += 1;
        if lines > tree.len() {
            return Err(PassError::Cycle(id));
        }
        let node = tree.node(id)?;
        let _ = writeln!(
            out,
            "{}{} [{}]",
            "  ".repeat(depth),
            node.kind.describe(),
            node.id
        );
        for c in node.children.iter().rev() {
            stack.push((*c, depth + 1));
        }
    }
    Ok(out)
}

/// Stable digest of the rendered tree.
pub fn fingerprint(tree: &ExecutionTree) -> Result<Hash256, PassError> {
    Ok(hash_str(&render(tree)?))
}
