//! dsflow: declarative dataset pipelines compiled into an optimized
//! execution tree and drained through a prefetching iterator.
//!
//! This facade re-exports the workspace crates so integration tests and
//! downstream users can depend on a single package.

pub use dsflow_core;
pub use dsflow_exec;
pub use dsflow_operators;
pub use dsflow_planner;

pub mod prelude {
    pub use dsflow_core::prelude::*;
    pub use dsflow_exec::{CreateIterator, ExecError, PipelineIterator, StopHandle};
    pub use dsflow_operators::vision::BorderType;
    pub use dsflow_operators::{OpError, Sampler, SourceSpec, Transform, TransformSpec, TransformStep};
    pub use dsflow_planner::{Dataset, MapOptions, PlanError, TreeCompiler};
}
