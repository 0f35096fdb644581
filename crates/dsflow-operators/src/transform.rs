//! Declarative transform specs and the `Transform` handle map stages take.
//!
//! Specs are plain serde data (usable from YAML); `build` validates them and
//! produces the runtime step. Callers can also hand in any custom
//! `TransformStep` directly.

use std::fmt;
use std::sync::Arc;

use dsflow_core::tensor::DataType;
use serde::{Deserialize, Serialize};

use crate::traits::{OpError, TransformStep};
use crate::vision::{
    BorderType, CenterCrop, CutOut, HwcToChw, Normalize, Pad, RandomCrop, RandomHorizontalFlip,
    RandomVerticalFlip, Rescale, Resize, TypeCast, UniformAugment,
};

fn default_fill() -> Vec<f64> {
    vec![0.0]
}

fn default_prob() -> f32 {
    0.5
}

fn default_patches() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformSpec {
    Resize {
        height: usize,
        width: usize,
    },
    CenterCrop {
        height: usize,
        width: usize,
    },
    Pad {
        padding: Vec<usize>,
        #[serde(default = "default_fill")]
        fill: Vec<f64>,
        #[serde(default)]
        border: BorderType,
    },
    Normalize {
        mean: Vec<f32>,
        std: Vec<f32>,
    },
    Rescale {
        rescale: f32,
        #[serde(default)]
        shift: f32,
    },
    TypeCast {
        dtype: DataType,
    },
    RandomHorizontalFlip {
        #[serde(default = "default_prob")]
        prob: f32,
        #[serde(default)]
        seed: Option<u64>,
    },
    RandomVerticalFlip {
        #[serde(default = "default_prob")]
        prob: f32,
        #[serde(default)]
        seed: Option<u64>,
    },
    RandomCrop {
        height: usize,
        width: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    CutOut {
        length: usize,
        #[serde(default = "default_patches")]
        num_patches: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    HwcToChw,
    UniformAugment {
        ops: Vec<TransformSpec>,
        num_ops: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl TransformSpec {
    pub fn resize(height: usize, width: usize) -> Self {
        TransformSpec::Resize { height, width }
    }

    pub fn center_crop(height: usize, width: usize) -> Self {
        TransformSpec::CenterCrop { height, width }
    }

    pub fn pad(padding: Vec<usize>, fill: Vec<f64>, border: BorderType) -> Self {
        TransformSpec::Pad {
            padding,
            fill,
            border,
        }
    }

    pub fn random_horizontal_flip(prob: f32) -> Self {
        TransformSpec::RandomHorizontalFlip { prob, seed: None }
    }

    pub fn random_crop(height: usize, width: usize) -> Self {
        TransformSpec::RandomCrop {
            height,
            width,
            seed: None,
        }
    }

    pub fn uniform_augment(ops: Vec<TransformSpec>, num_ops: usize) -> Self {
        TransformSpec::UniformAugment {
            ops,
            num_ops,
            seed: None,
        }
    }

    /// Validate parameters and construct the runtime step.
    pub fn build(&self) -> Result<Arc<dyn TransformStep>, OpError> {
        let step: Arc<dyn TransformStep> = match self {
            TransformSpec::Resize { height, width } => Arc::new(Resize::new(*height, *width)?),
            TransformSpec::CenterCrop { height, width } => {
                Arc::new(CenterCrop::new(*height, *width)?)
            }
            TransformSpec::Pad {
                padding,
                fill,
                border,
            } => Arc::new(Pad::new(padding, fill.clone(), *border)?),
            TransformSpec::Normalize { mean, std } => {
                Arc::new(Normalize::new(mean.clone(), std.clone())?)
            }
            TransformSpec::Rescale { rescale, shift } => Arc::new(Rescale::new(*rescale, *shift)?),
            TransformSpec::TypeCast { dtype } => Arc::new(TypeCast::new(*dtype)),
            TransformSpec::RandomHorizontalFlip { prob, seed } => {
                Arc::new(RandomHorizontalFlip::new(*prob, *seed)?)
            }
            TransformSpec::RandomVerticalFlip { prob, seed } => {
                Arc::new(RandomVerticalFlip::new(*prob, *seed)?)
            }
            TransformSpec::RandomCrop {
                height,
                width,
                seed,
            } => Arc::new(RandomCrop::new(*height, *width, *seed)?),
            TransformSpec::CutOut {
                length,
                num_patches,
                seed,
            } => Arc::new(CutOut::new(*length, *num_patches, *seed)?),
            TransformSpec::HwcToChw => Arc::new(HwcToChw),
            TransformSpec::UniformAugment { ops, num_ops, seed } => {
                let steps = ops
                    .iter()
                    .map(TransformSpec::build)
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(UniformAugment::new(steps, *num_ops, *seed)?)
            }
        };
        Ok(step)
    }
}

/// What a map stage receives: a built-in spec or a caller-supplied step.
#[derive(Clone)]
pub enum Transform {
    Builtin(TransformSpec),
    Custom(Arc<dyn TransformStep>),
}

impl Transform {
    pub fn custom<S: TransformStep>(step: S) -> Self {
        Transform::Custom(Arc::new(step))
    }

    pub fn build(&self) -> Result<Arc<dyn TransformStep>, OpError> {
        match self {
            Transform::Builtin(spec) => spec.build(),
            Transform::Custom(step) => Ok(Arc::clone(step)),
        }
    }
}

impl From<TransformSpec> for Transform {
    fn from(spec: TransformSpec) -> Self {
        Transform::Builtin(spec)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Builtin(spec) => write!(f, "Builtin({:?})", spec),
            Transform::Custom(step) => write!(f, "Custom({})", step.describe()),
        }
    }
}
