//! Per-element value transforms.

use dsflow_core::row::TensorRow;
use dsflow_core::tensor::{DataType, Tensor, TensorData};

use super::{single_image, ImageDims};
use crate::traits::{OpError, TransformStep};

/// `(x - mean[c]) / std[c]` per channel; output is float32.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self, OpError> {
        if mean.is_empty() || mean.len() != std.len() {
            return Err(OpError::InvalidParams(format!(
                "normalize: mean ({}) and std ({}) must be non-empty and equal length",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(OpError::InvalidParams(
                "normalize: std values must be positive".into(),
            ));
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(OpError::InvalidParams(
                "normalize: mean values must be finite".into(),
            ));
        }
        Ok(Self { mean, std })
    }
}

impl TransformStep for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let image = single_image("normalize", input)?;
        let dims = ImageDims::of("normalize", &image)?;
        if self.mean.len() != 1 && self.mean.len() != dims.c {
            return Err(OpError::Shape(format!(
                "normalize: {} mean values for an image with {} channels",
                self.mean.len(),
                dims.c
            )));
        }
        let n = self.mean.len();
        let values: Vec<f32> = image
            .data()
            .to_f32_vec()
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let ch = (i % dims.c) % n;
                (v - self.mean[ch]) / self.std[ch]
            })
            .collect();
        Ok(vec![Tensor::from_f32(image.shape().to_vec(), values)?])
    }

    fn describe(&self) -> String {
        format!("normalize(mean={:?}, std={:?})", self.mean, self.std)
    }
}

/// `x * rescale + shift`; output is float32.
#[derive(Debug, Clone)]
pub struct Rescale {
    rescale: f32,
    shift: f32,
}

impl Rescale {
    pub fn new(rescale: f32, shift: f32) -> Result<Self, OpError> {
        if !rescale.is_finite() || !shift.is_finite() {
            return Err(OpError::InvalidParams(
                "rescale: factors must be finite".into(),
            ));
        }
        Ok(Self { rescale, shift })
    }
}

impl TransformStep for Rescale {
    fn name(&self) -> &'static str {
        "rescale"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let tensor = single_image("rescale", input)?;
        let values: Vec<f32> = tensor
            .data()
            .to_f32_vec()
            .into_iter()
            .map(|v| v * self.rescale + self.shift)
            .collect();
        Ok(vec![Tensor::from_f32(tensor.shape().to_vec(), values)?])
    }

    fn describe(&self) -> String {
        format!("rescale({}, {})", self.rescale, self.shift)
    }
}

/// Convert element type.
#[derive(Debug, Clone)]
pub struct TypeCast {
    dtype: DataType,
}

impl TypeCast {
    pub fn new(dtype: DataType) -> Self {
        Self { dtype }
    }
}

impl TransformStep for TypeCast {
    fn name(&self) -> &'static str {
        "type_cast"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let tensor = single_image("type_cast", input)?;
        if tensor.dtype() == self.dtype {
            return Ok(vec![tensor]);
        }
        let data: TensorData = tensor.data().cast(self.dtype);
        Ok(vec![Tensor::new(tensor.shape().to_vec(), data)?])
    }

    fn describe(&self) -> String {
        format!("type_cast({:?})", self.dtype)
    }
}
