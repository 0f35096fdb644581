//! Lowering: `LogicalPlan` -> arena `ExecutionTree`.
//!
//! Nodes are added leaf first, so the source always gets `OpId(0)` and ids
//! grow towards the root.

use dsflow_operators::traits::mix_seed;

use crate::error::{PassError, PlanError};
use crate::logical::LogicalPlan;
use crate::tree::{ExecutionTree, NodeId, OperatorKind};

pub fn lower_to_tree(plan: &LogicalPlan) -> Result<ExecutionTree, PlanError> {
    let mut tree = ExecutionTree::new();
    let root = lower_node(plan, &mut tree)?;
    tree.set_root(root)
        .map_err(|e| PlanError::Lowering(e.to_string()))?;
    Ok(tree)
}

/// Give every unseeded random step in the tree its own seed derived from
/// `seed`, the owning operator's id and the step's position. Steps are
/// replaced, never mutated, so plans shared between runs are unaffected.
/// Returns the number of steps reseeded.
pub fn seed_random_steps(tree: &mut ExecutionTree, seed: u64) -> Result<usize, PassError> {
    let mut reseeded = 0;
    for id in tree.preorder()? {
        let node = tree.node_mut(id)?;
        let op_seed = mix_seed(seed, node.id.get());
        if let OperatorKind::Map(stage) = &mut node.kind {
            for (i, step) in stage.steps.iter_mut().enumerate() {
                if let Some(fresh) = step.reseeded(mix_seed(op_seed, i as u64)) {
                    *step = fresh;
                    reseeded += 1;
                }
            }
        }
    }
    Ok(reseeded)
}

fn lower_node(plan: &LogicalPlan, tree: &mut ExecutionTree) -> Result<NodeId, PlanError> {
    let children = match plan.input() {
        Some(input) => vec![lower_node(input, tree)?],
        None => vec![],
    };
    let kind = match plan {
        LogicalPlan::Source { spec, sampler } => OperatorKind::Source {
            spec: spec.clone(),
            sampler: sampler.clone(),
        },
        LogicalPlan::Map { stage, .. } => OperatorKind::Map(stage.clone()),
        LogicalPlan::Shuffle { buffer_size, .. } => OperatorKind::Shuffle {
            buffer_size: *buffer_size,
        },
        LogicalPlan::Batch {
            batch_size,
            drop_remainder,
            ..
        } => OperatorKind::Batch {
            batch_size: *batch_size,
            drop_remainder: *drop_remainder,
        },
        LogicalPlan::Repeat { count, .. } => OperatorKind::Repeat { count: *count },
        LogicalPlan::Project { columns, .. } => OperatorKind::Project {
            columns: columns.clone(),
        },
        LogicalPlan::Rename { from, to, .. } => OperatorKind::Rename {
            from: from.clone(),
            to: to.clone(),
        },
        LogicalPlan::Take { count, .. } => OperatorKind::Take { count: *count },
        LogicalPlan::Skip { count, .. } => OperatorKind::Skip { count: *count },
    };
    tree.add(kind, children)
        .map_err(|e| PlanError::Lowering(e.to_string()))
}
