#![forbid(unsafe_code)]
//! dsflow-operators: per-row transform steps, samplers and sources.
//!
//! Design intent:
//! - Keep this crate pure and synchronous; threading lives in `dsflow-exec`.
//! - Every step declares whether it may be fused with its neighbours; the
//!   planner's fusion pass relies only on that flag.
//! - Parameters are validated when a step is constructed, so a bad pipeline
//!   fails at the builder call rather than mid-iteration.

pub mod fused;
pub mod sampler;
pub mod source;
pub mod traits;
pub mod transform;
pub mod vision;

pub use fused::FusedStep;
pub use sampler::Sampler;
pub use source::SourceSpec;
pub use traits::{OpError, TransformStep};
pub use transform::{Transform, TransformSpec};
