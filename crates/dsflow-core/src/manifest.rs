//! Run manifest for audit/replay.
//!
//! The iterator emits a manifest when it stops; with the same compiled tree
//! fingerprint, config and seed the runtime produces the same row order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Stable hash of the compiled execution tree.
    pub plan_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Seed the run was configured with, if any.
    pub seed: Option<u64>,

    /// Rows handed to the consumer.
    pub rows_yielded: u64,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(plan_hash: Hash256, seed: Option<u64>, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            seed,
            rows_yielded: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, rows_yielded: u64) -> Self {
        self.finished_ms = finished_ms;
        self.rows_yielded = rows_yielded;
        self
    }
}
