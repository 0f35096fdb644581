//! Deterministic replay & provenance helpers.
//!
//! A run is reproducible when the compiled tree and the seed match; worker
//! layout does not change results. The manifest hash covers the tree and the
//! whole config.

use dsflow_core::config::PipelineConfig;
use dsflow_core::hash::{hash_serde, Hash256};
use dsflow_planner::explain;
use dsflow_planner::ExecutionTree;

use crate::ExecError;

/// Digest of the compiled tree as rendered by `explain`.
pub fn hash_tree(tree: &ExecutionTree) -> Result<Hash256, ExecError> {
    explain::fingerprint(tree).map_err(|e| ExecError::Hash(e.to_string()))
}

/// Tree digest folded together with the config that drives it.
pub fn hash_run(tree: &ExecutionTree, cfg: &PipelineConfig) -> Result<Hash256, ExecError> {
    let t = hash_tree(tree)?;
    let c = hash_serde(cfg).map_err(|e| ExecError::Hash(e.to_string()))?;
    Ok(t.xor(c))
}
