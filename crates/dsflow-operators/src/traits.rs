//! Transform step trait + the crate error type.
//!
//! A map stage owns an ordered list of steps. The runtime calls `apply` once
//! per row with the tensors of the map's input columns, possibly from several
//! worker threads at once, so steps must be `Send + Sync`. Random steps keep
//! no shared RNG: each row's draws come from the step seed and the row's
//! ordinal within the map stage, so results do not depend on which worker
//! handled the row.

use std::fmt;
use std::sync::Arc;

use dsflow_core::row::TensorRow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("shape error: {0}")]
    Shape(String),

    #[error("sampler error: {0}")]
    Sampler(String),
}

impl From<dsflow_core::Error> for OpError {
    fn from(e: dsflow_core::Error) -> Self {
        match e {
            dsflow_core::Error::Shape(msg) | dsflow_core::Error::Column(msg) => OpError::Shape(msg),
            other => OpError::Exec(other.to_string()),
        }
    }
}

/// One per-row tensor operation inside a map stage.
///
/// Invariants:
/// - `fusable()` is a fixed property of the step; the fusion pass merges only
///   adjacent steps that return `true`.
/// - `apply` must not depend on which thread calls it, other than through
///   internally synchronized state.
pub trait TransformStep: Send + Sync + 'static {
    /// Human-readable step name (stable).
    fn name(&self) -> &'static str;

    /// Whether this step may be merged with its fusable neighbours.
    fn fusable(&self) -> bool;

    /// Transform one row's input tensors into its output tensors.
    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError>;

    /// Apply to the `ordinal`-th row the map stage has processed in this run.
    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let _ = ordinal;
        self.apply(input)
    }

    /// A copy of this step drawing from `seed`. `None` for deterministic
    /// steps and for random steps whose seed was fixed at construction.
    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let _ = seed;
        None
    }

    /// Name plus parameters, used by explain output and logs.
    fn describe(&self) -> String {
        self.name().to_string()
    }
}

/// Derive a child seed; used for per-operator, per-step and per-row seeds.
pub fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut z = seed ^ salt.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl fmt::Debug for dyn TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
