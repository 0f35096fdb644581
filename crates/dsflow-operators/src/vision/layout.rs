use dsflow_core::row::TensorRow;
use dsflow_core::tensor::Tensor;

use super::single_image;
use crate::traits::{OpError, TransformStep};

/// Transpose `[h, w, c]` to `[c, h, w]`.
#[derive(Debug, Clone, Default)]
pub struct HwcToChw;

impl TransformStep for HwcToChw {
    fn name(&self) -> &'static str {
        "hwc_to_chw"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let image = single_image("hwc_to_chw", input)?;
        let (h, w, c) = match image.shape() {
            &[h, w, c] => (h, w, c),
            other => {
                return Err(OpError::Shape(format!(
                    "hwc_to_chw: expected rank-3 image, got shape {:?}",
                    other
                )))
            }
        };
        let mut indices = Vec::with_capacity(h * w * c);
        for ch in 0..c {
            for y in 0..h {
                for x in 0..w {
                    indices.push(Some((y * w + x) * c + ch));
                }
            }
        }
        let data = image.data().gather(&indices, 0.0)?;
        Ok(vec![Tensor::new(vec![c, h, w], data)?])
    }
}
