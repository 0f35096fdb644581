//! Resize and center crop.

use dsflow_core::row::TensorRow;

use super::{remap, single_image, ImageDims};
use crate::traits::{OpError, TransformStep};

/// Nearest-neighbour resize to a fixed `height x width`.
#[derive(Debug, Clone)]
pub struct Resize {
    height: usize,
    width: usize,
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Result<Self, OpError> {
        if height == 0 || width == 0 {
            return Err(OpError::InvalidParams(format!(
                "resize: target size must be positive, got {}x{}",
                height, width
            )));
        }
        Ok(Self { height, width })
    }
}

impl TransformStep for Resize {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let image = single_image("resize", input)?;
        let dims = ImageDims::of("resize", &image)?;
        if dims.h == 0 || dims.w == 0 {
            return Err(OpError::Shape("resize: input image is empty".into()));
        }
        let (out_h, out_w) = (self.height, self.width);
        let out = remap(&image, dims, out_h, out_w, 0.0, |y, x| {
            Some((y * dims.h / out_h, x * dims.w / out_w))
        })?;
        Ok(vec![out])
    }

    fn describe(&self) -> String {
        format!("resize({}x{})", self.height, self.width)
    }
}

/// Crop the central `height x width` window.
///
/// The window must fit inside the image; an odd margin puts the extra pixel
/// on the bottom/right.
#[derive(Debug, Clone)]
pub struct CenterCrop {
    height: usize,
    width: usize,
}

impl CenterCrop {
    pub fn new(height: usize, width: usize) -> Result<Self, OpError> {
        if height == 0 || width == 0 {
            return Err(OpError::InvalidParams(format!(
                "center_crop: crop size must be positive, got {}x{}",
                height, width
            )));
        }
        Ok(Self { height, width })
    }
}

impl TransformStep for CenterCrop {
    fn name(&self) -> &'static str {
        "center_crop"
    }

    fn fusable(&self) -> bool {
        true
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let image = single_image("center_crop", input)?;
        let dims = ImageDims::of("center_crop", &image)?;
        if self.height > dims.h || self.width > dims.w {
            return Err(OpError::Shape(format!(
                "center_crop: crop {}x{} larger than image {}x{}",
                self.height, self.width, dims.h, dims.w
            )));
        }
        let top = (dims.h - self.height) / 2;
        let left = (dims.w - self.width) / 2;
        let out = remap(&image, dims, self.height, self.width, 0.0, |y, x| {
            Some((y + top, x + left))
        })?;
        Ok(vec![out])
    }

    fn describe(&self) -> String {
        format!("center_crop({}x{})", self.height, self.width)
    }
}
