//! Removes operators that cannot change the stream: `repeat(1)`,
//! `shuffle` with a buffer of at most one row, and `skip(0)`.

use crate::error::PassError;
use crate::pass::TreePass;
use crate::tree::{ExecutionTree, NodeId, OperatorKind};

#[derive(Debug, Default)]
pub struct RemovalPass {
    removed: usize,
}

impl RemovalPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes spliced out so far.
    pub fn removed(&self) -> usize {
        self.removed
    }

    fn is_noop(kind: &OperatorKind) -> bool {
        matches!(
            kind,
            OperatorKind::Repeat { count: Some(1) }
                | OperatorKind::Shuffle { buffer_size: 0 | 1 }
                | OperatorKind::Skip { count: 0 }
        )
    }
}

impl TreePass for RemovalPass {
    fn name(&self) -> &'static str {
        "removal"
    }

    fn visit_node(&mut self, tree: &mut ExecutionTree, id: NodeId) -> Result<bool, PassError> {
        let node = tree.node(id)?;
        if !Self::is_noop(&node.kind) {
            return Ok(false);
        }
        let (op, what) = (node.id, node.kind.describe());
        tree.splice_out(id)?;
        self.removed += 1;
        tracing::debug!(%op, %what, "removed no-op operator");
        Ok(true)
    }
}
