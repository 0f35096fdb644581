//! Convenient re-exports for downstream crates.

pub use crate::config::PipelineConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::OpId;
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::row::{Row, TensorRow};
pub use crate::tensor::{DataType, Tensor, TensorData};
