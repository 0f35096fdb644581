//! Step fusion inside map operators.
//!
//! Runs of two or more adjacent fusable steps collapse into one
//! [`FusedStep`]. Order is preserved and non-fusable steps stay where they
//! are, so the rewritten list computes exactly what the original did. Fused
//! steps report themselves as non-fusable, which makes the pass idempotent.

use std::mem;
use std::sync::Arc;

use dsflow_operators::{FusedStep, TransformStep};

use crate::error::PassError;
use crate::pass::{Transformed, TreePass};
use crate::tree::{Node, OperatorKind};

type Steps = Vec<Arc<dyn TransformStep>>;

/// Merge every run of >= 2 adjacent fusable steps.
pub fn fuse_steps(steps: Steps) -> Result<Transformed<Steps>, PassError> {
    if steps.iter().filter(|s| s.fusable()).count() < 2 {
        return Ok(Transformed::no(steps));
    }

    let mut out: Steps = Vec::with_capacity(steps.len());
    let mut run: Steps = Vec::new();
    let mut changed = false;

    for step in steps {
        if step.fusable() {
            run.push(step);
            continue;
        }
        changed |= flush(&mut run, &mut out)?;
        out.push(step);
    }
    changed |= flush(&mut run, &mut out)?;

    Ok(Transformed { data: out, changed })
}

/// Move the pending run into `out`, fusing it when it has 2+ steps.
fn flush(run: &mut Steps, out: &mut Steps) -> Result<bool, PassError> {
    match run.len() {
        0 => Ok(false),
        1 => {
            out.append(run);
            Ok(false)
        }
        _ => {
            let fused = FusedStep::new(mem::take(run))
                .map_err(|e| PassError::Internal(format!("fusing steps: {}", e)))?;
            out.push(Arc::new(fused));
            Ok(true)
        }
    }
}

/// Tree pass applying [`fuse_steps`] to every map node.
#[derive(Debug, Default)]
pub struct FusionPass {
    fused_nodes: usize,
}

impl FusionPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map nodes rewritten so far.
    pub fn fused_nodes(&self) -> usize {
        self.fused_nodes
    }

    /// Fuse the steps of one map node. Any other node kind is a caller bug.
    pub fn run_on_node(&mut self, node: &mut Node) -> Result<bool, PassError> {
        let stage = match &mut node.kind {
            OperatorKind::Map(stage) => stage,
            other => {
                return Err(PassError::Internal(format!(
                    "fusion pass applied to non-map node {} ({})",
                    node.id,
                    other.name()
                )))
            }
        };

        let before = stage.steps.len();
        // Work on a copy of the Arcs so an error leaves the node untouched.
        let result = fuse_steps(stage.steps.clone())?;
        if !result.changed {
            return Ok(false);
        }
        stage.steps = result.data;
        self.fused_nodes += 1;
        tracing::debug!(
            op = %node.id,
            before,
            after = stage.steps.len(),
            "fused map steps"
        );
        Ok(true)
    }
}

impl TreePass for FusionPass {
    fn name(&self) -> &'static str {
        "fusion"
    }

    fn visit_map(&mut self, node: &mut Node) -> Result<bool, PassError> {
        self.run_on_node(node)
    }
}
