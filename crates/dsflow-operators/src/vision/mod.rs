//! Vision transform stand-ins.
//!
//! Images are `[height, width, channels]` (or `[height, width]`, treated as a
//! single channel) row-major tensors. Geometry ops compute a source index for
//! every output element and gather, so they work for every dtype. Every op
//! takes exactly one input tensor and produces one.

mod color;
mod geometry;
mod layout;
mod pad;
mod random;

pub use color::{Normalize, Rescale, TypeCast};
pub use geometry::{CenterCrop, Resize};
pub use layout::HwcToChw;
pub use pad::{BorderType, Pad};
pub use random::{CutOut, RandomCrop, RandomHorizontalFlip, RandomVerticalFlip, UniformAugment};

use dsflow_core::row::TensorRow;
use dsflow_core::tensor::Tensor;

use crate::traits::OpError;

/// Take the single image tensor out of a step's input.
pub(crate) fn single_image(op: &str, mut input: TensorRow) -> Result<Tensor, OpError> {
    if input.len() != 1 {
        return Err(OpError::Shape(format!(
            "{}: expected 1 input tensor, got {}",
            op,
            input.len()
        )));
    }
    input
        .pop()
        .ok_or_else(|| OpError::Shape(format!("{}: missing input tensor", op)))
}

/// Height/width/channel view of an image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageDims {
    pub h: usize,
    pub w: usize,
    pub c: usize,
    /// Whether the tensor carries an explicit channel axis.
    pub has_channels: bool,
}

impl ImageDims {
    pub fn of(op: &str, t: &Tensor) -> Result<Self, OpError> {
        match t.shape() {
            &[h, w] => Ok(Self {
                h,
                w,
                c: 1,
                has_channels: false,
            }),
            &[h, w, c] => Ok(Self {
                h,
                w,
                c,
                has_channels: true,
            }),
            other => Err(OpError::Shape(format!(
                "{}: expected an HWC or HW image, got shape {:?}",
                op, other
            ))),
        }
    }

    /// Shape with the same layout and channel count but new spatial size.
    pub fn with_size(&self, h: usize, w: usize) -> Vec<usize> {
        if self.has_channels {
            vec![h, w, self.c]
        } else {
            vec![h, w]
        }
    }

    pub fn offset(&self, y: usize, x: usize, ch: usize) -> usize {
        (y * self.w + x) * self.c + ch
    }
}

/// Build an `out_h x out_w` image where pixel `(y, x)` copies the source
/// pixel returned by `src`, or `fill` when it returns `None`.
pub(crate) fn remap<F>(
    image: &Tensor,
    dims: ImageDims,
    out_h: usize,
    out_w: usize,
    fill: f64,
    src: F,
) -> Result<Tensor, OpError>
where
    F: Fn(usize, usize) -> Option<(usize, usize)>,
{
    let mut indices = Vec::with_capacity(out_h * out_w * dims.c);
    for y in 0..out_h {
        for x in 0..out_w {
            let from = src(y, x);
            for ch in 0..dims.c {
                indices.push(from.map(|(sy, sx)| dims.offset(sy, sx, ch)));
            }
        }
    }
    let data = image.data().gather(&indices, fill)?;
    Ok(Tensor::new(dims.with_size(out_h, out_w), data)?)
}
