//! Logs the tree as the optimizer sees it. Never modifies anything.

use crate::error::PassError;
use crate::explain;
use crate::pass::TreePass;
use crate::tree::{ExecutionTree, NodeId};

#[derive(Debug, Default)]
pub struct PrinterPass {
    last: Option<String>,
}

impl PrinterPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent rendering.
    pub fn last_rendering(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl TreePass for PrinterPass {
    fn name(&self) -> &'static str {
        "printer"
    }

    fn visit_node(&mut self, tree: &mut ExecutionTree, id: NodeId) -> Result<bool, PassError> {
        if tree.root()? != id {
            return Ok(false);
        }
        let text = explain::render(tree)?;
        tracing::info!(nodes = tree.len(), "execution tree:\n{}", text);
        self.last = Some(text);
        Ok(false)
    }
}
