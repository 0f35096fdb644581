//! A single step standing in for a run of consecutive fusable steps.

use std::sync::Arc;

use dsflow_core::row::TensorRow;

use crate::traits::{mix_seed, OpError, TransformStep};

/// Applies its inner steps in order as one call.
///
/// A fused step reports itself as non-fusable, so running the fusion pass on
/// an already-fused map leaves it untouched.
pub struct FusedStep {
    steps: Vec<Arc<dyn TransformStep>>,
}

impl FusedStep {
    /// Wrap two or more fusable steps.
    pub fn new(steps: Vec<Arc<dyn TransformStep>>) -> Result<Self, OpError> {
        if steps.len() < 2 {
            return Err(OpError::InvalidParams(format!(
                "fused step needs at least 2 steps, got {}",
                steps.len()
            )));
        }
        if let Some(bad) = steps.iter().find(|s| !s.fusable()) {
            return Err(OpError::InvalidParams(format!(
                "step '{}' is not fusable",
                bad.name()
            )));
        }
        Ok(Self { steps })
    }
}

impl TransformStep for FusedStep {
    fn name(&self) -> &'static str {
        "fused"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.steps.iter().try_fold(input, |row, step| step.apply(row))
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        self.steps
            .iter()
            .try_fold(input, |row, step| step.apply_at(row, ordinal))
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let mut any = false;
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| match step.reseeded(mix_seed(seed, i as u64)) {
                Some(fresh) => {
                    any = true;
                    fresh
                }
                None => Arc::clone(step),
            })
            .collect();
        any.then(|| Arc::new(Self { steps }) as Arc<dyn TransformStep>)
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.steps.iter().map(|s| s.describe()).collect();
        format!("fused[{}]", inner.join(", "))
    }
}
