//! Border padding.

use dsflow_core::row::TensorRow;
use serde::{Deserialize, Serialize};

use super::{remap, single_image, ImageDims};
use crate::traits::{OpError, TransformStep};

/// How pixels outside the source image are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderType {
    /// Fill with a constant value (per channel).
    #[default]
    Constant,
    /// Repeat the nearest edge pixel.
    Edge,
    /// Mirror without repeating the edge pixel: `c b | a b c | b a`.
    Reflect,
    /// Mirror including the edge pixel: `b a | a b c | c b`.
    Symmetric,
}

impl BorderType {
    /// Map a possibly out-of-range coordinate onto `0..n`.
    fn resolve(self, i: isize, n: usize) -> Option<usize> {
        let n = n as isize;
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        match self {
            BorderType::Constant => None,
            BorderType::Edge => Some(i.clamp(0, n - 1) as usize),
            BorderType::Reflect => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * (n - 1);
                let m = i.rem_euclid(period);
                Some((if m < n { m } else { period - m }) as usize)
            }
            BorderType::Symmetric => {
                let period = 2 * n;
                let m = i.rem_euclid(period);
                Some((if m < n { m } else { period - 1 - m }) as usize)
            }
        }
    }
}

/// Pad the borders of an image.
///
/// `padding` takes one value (all sides), two values (left/right, then
/// top/bottom) or four values (left, top, right, bottom). `fill` holds one
/// value for every channel or one value per channel and only matters for
/// [`BorderType::Constant`].
#[derive(Debug, Clone)]
pub struct Pad {
    left: usize,
    top: usize,
    right: usize,
    bottom: usize,
    fill: Vec<f64>,
    border: BorderType,
}

impl Pad {
    pub fn new(padding: &[usize], fill: Vec<f64>, border: BorderType) -> Result<Self, OpError> {
        let (left, top, right, bottom) = match padding {
            &[all] => (all, all, all, all),
            &[lr, tb] => (lr, tb, lr, tb),
            &[l, t, r, b] => (l, t, r, b),
            _ => {
                return Err(OpError::InvalidParams(format!(
                    "pad: padding needs 1, 2 or 4 values, got {}",
                    padding.len()
                )))
            }
        };
        if fill.is_empty() {
            return Err(OpError::InvalidParams("pad: fill must not be empty".into()));
        }
        if fill.iter().any(|v| !v.is_finite()) {
            return Err(OpError::InvalidParams("pad: fill values must be finite".into()));
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
            fill,
            border,
        })
    }

    fn fill_for(&self, channels: usize) -> Result<Vec<f64>, OpError> {
        match self.fill.len() {
            1 => Ok(vec![self.fill[0]; channels]),
            n if n == channels => Ok(self.fill.clone()),
            n => Err(OpError::Shape(format!(
                "pad: {} fill values for an image with {} channels",
                n, channels
            ))),
        }
    }
}

impl TransformStep for Pad {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        let image = single_image("pad", input)?;
        let dims = ImageDims::of("pad", &image)?;
        if dims.h == 0 || dims.w == 0 {
            return Err(OpError::Shape("pad: input image is empty".into()));
        }
        let out_h = dims.h + self.top + self.bottom;
        let out_w = dims.w + self.left + self.right;
        let (top, left) = (self.top as isize, self.left as isize);
        let border = self.border;
        let src = |y: usize, x: usize| {
            let sy = border.resolve(y as isize - top, dims.h)?;
            let sx = border.resolve(x as isize - left, dims.w)?;
            Some((sy, sx))
        };

        if border != BorderType::Constant {
            return Ok(vec![remap(&image, dims, out_h, out_w, 0.0, &src)?]);
        }

        let fill = self.fill_for(dims.c)?;
        let mut out = remap(&image, dims, out_h, out_w, fill[0], &src)?;
        if fill.iter().any(|v| *v != fill[0]) {
            let out_dims = ImageDims {
                h: out_h,
                w: out_w,
                ..dims
            };
            for y in 0..out_h {
                for x in 0..out_w {
                    if src(y, x).is_some() {
                        continue;
                    }
                    for (ch, v) in fill.iter().enumerate() {
                        out.set_f64(out_dims.offset(y, x, ch), *v)?;
                    }
                }
            }
        }
        Ok(vec![out])
    }

    fn describe(&self) -> String {
        format!(
            "pad(l={}, t={}, r={}, b={}, {:?})",
            self.left, self.top, self.right, self.bottom, self.border
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::test_util::ramp;
    use dsflow_core::tensor::{Tensor, TensorData};

    fn row(values: Vec<u8>) -> Tensor {
        let w = values.len();
        Tensor::from_u8(vec![1, w, 1], values).unwrap()
    }

    #[test]
    fn padding_forms() {
        let img = ramp(4, 4, 1);
        let one = Pad::new(&[1], vec![0.0], BorderType::Constant).unwrap();
        assert_eq!(one.apply(vec![img.clone()]).unwrap()[0].shape(), &[6, 6, 1]);

        let two = Pad::new(&[1, 4], vec![0.0], BorderType::Constant).unwrap();
        assert_eq!(two.apply(vec![img.clone()]).unwrap()[0].shape(), &[12, 6, 1]);

        let four = Pad::new(&[1, 2, 3, 4], vec![0.0], BorderType::Constant).unwrap();
        assert_eq!(four.apply(vec![img]).unwrap()[0].shape(), &[10, 8, 1]);
    }

    #[test]
    fn bad_arity_rejected() {
        assert!(Pad::new(&[1, 2, 3], vec![0.0], BorderType::Constant).is_err());
        assert!(Pad::new(&[], vec![0.0], BorderType::Constant).is_err());
        assert!(Pad::new(&[1], vec![], BorderType::Constant).is_err());
    }

    #[test]
    fn borders_along_one_axis() {
        let img = row(vec![1, 2, 3]);
        let expect = |border, want: Vec<u8>| {
            let pad = Pad::new(&[2, 0], vec![9.0], border).unwrap();
            let out = pad.apply(vec![img.clone()]).unwrap();
            assert_eq!(out[0].data(), &TensorData::U8(want), "{:?}", border);
        };
        expect(BorderType::Constant, vec![9, 9, 1, 2, 3, 9, 9]);
        expect(BorderType::Edge, vec![1, 1, 1, 2, 3, 3, 3]);
        expect(BorderType::Reflect, vec![3, 2, 1, 2, 3, 2, 1]);
        expect(BorderType::Symmetric, vec![2, 1, 1, 2, 3, 3, 2]);
    }

    #[test]
    fn per_channel_fill() {
        let img = Tensor::from_u8(vec![1, 1, 3], vec![7, 7, 7]).unwrap();
        let pad = Pad::new(&[1, 0], vec![1.0, 2.0, 3.0], BorderType::Constant).unwrap();
        let out = pad.apply(vec![img]).unwrap();
        assert_eq!(out[0].data(), &TensorData::U8(vec![1, 2, 3, 7, 7, 7, 1, 2, 3]));
    }

    #[test]
    fn fill_channel_mismatch_only_matters_for_constant() {
        let img = ramp(2, 2, 1);
        let constant = Pad::new(&[1], vec![1.0, 1.0, 1.0], BorderType::Constant).unwrap();
        assert!(constant.apply(vec![img.clone()]).is_err());
        let edge = Pad::new(&[1], vec![1.0, 1.0, 1.0], BorderType::Edge).unwrap();
        assert_eq!(edge.apply(vec![img]).unwrap()[0].shape(), &[4, 4, 1]);
    }

    #[test]
    fn pad_is_not_fusable() {
        let pad = Pad::new(&[1], vec![0.0], BorderType::Constant).unwrap();
        assert!(!pad.fusable());
    }
}
