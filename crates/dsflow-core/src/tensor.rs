//! Dense row-major tensors carried through pipeline rows.
//!
//! Deliberately small: shape, dtype and a flat buffer. Transforms build new
//! tensors by computing source indices and calling [`TensorData::gather`], which
//! keeps per-dtype code in one place.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Int32,
    Int64,
    Float32,
}

impl DataType {
    /// Width of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::Int32 | DataType::Float32 => 4,
            DataType::Int64 => 8,
        }
    }
}

/// Element types a tensor buffer can hold.
trait Element: Copy {
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Element for u8 {
    fn from_f64(v: f64) -> Self {
        v.round() as u8
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for i32 {
    fn from_f64(v: f64) -> Self {
        v.round() as i32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for i64 {
    fn from_f64(v: f64) -> Self {
        v.round() as i64
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f32 {
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Flat element buffer, one variant per dtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
}

macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::U8($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::I64($v) => $body,
            TensorData::F32($v) => $body,
        }
    };
}

macro_rules! concat_variant {
    ($parts:expr, $dtype:expr, $variant:ident) => {{
        let mut out = Vec::new();
        for part in $parts {
            match part {
                TensorData::$variant(v) => out.extend_from_slice(v),
                other => {
                    return Err(Error::Shape(format!(
                        "cannot concatenate {:?} buffer with {:?} buffer",
                        $dtype,
                        other.dtype()
                    )))
                }
            }
        }
        TensorData::$variant(out)
    }};
}

fn gather_vec<T: Element>(src: &[T], indices: &[Option<usize>], fill: f64) -> Result<Vec<T>> {
    let fill = T::from_f64(fill);
    indices
        .iter()
        .map(|idx| match idx {
            Some(i) => src.get(*i).copied().ok_or_else(|| {
                Error::Shape(format!(
                    "gather index {} out of bounds for {} elements",
                    i,
                    src.len()
                ))
            }),
            None => Ok(fill),
        })
        .collect()
}

fn convert_vec<S: Element, T: Element>(src: &[S]) -> Vec<T> {
    src.iter().map(|v| T::from_f64(v.to_f64())).collect()
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            TensorData::U8(_) => DataType::UInt8,
            TensorData::I32(_) => DataType::Int32,
            TensorData::I64(_) => DataType::Int64,
            TensorData::F32(_) => DataType::Float32,
        }
    }

    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled buffer of `len` elements.
    pub fn zeros(dtype: DataType, len: usize) -> Self {
        match dtype {
            DataType::UInt8 => TensorData::U8(vec![0; len]),
            DataType::Int32 => TensorData::I32(vec![0; len]),
            DataType::Int64 => TensorData::I64(vec![0; len]),
            DataType::Float32 => TensorData::F32(vec![0.0; len]),
        }
    }

    /// Build a new buffer where slot `i` copies `self[indices[i]]`, or `fill`
    /// (converted to the buffer dtype) when the index is `None`.
    pub fn gather(&self, indices: &[Option<usize>], fill: f64) -> Result<TensorData> {
        Ok(match self {
            TensorData::U8(v) => TensorData::U8(gather_vec(v, indices, fill)?),
            TensorData::I32(v) => TensorData::I32(gather_vec(v, indices, fill)?),
            TensorData::I64(v) => TensorData::I64(gather_vec(v, indices, fill)?),
            TensorData::F32(v) => TensorData::F32(gather_vec(v, indices, fill)?),
        })
    }

    /// Concatenate buffers of the same dtype end to end.
    pub fn concat(parts: &[&TensorData]) -> Result<TensorData> {
        let first = parts
            .first()
            .ok_or_else(|| Error::Shape("cannot concatenate zero buffers".into()))?;
        let dtype = first.dtype();
        Ok(match first {
            TensorData::U8(_) => concat_variant!(parts, dtype, U8),
            TensorData::I32(_) => concat_variant!(parts, dtype, I32),
            TensorData::I64(_) => concat_variant!(parts, dtype, I64),
            TensorData::F32(_) => concat_variant!(parts, dtype, F32),
        })
    }

    /// Element at flat position `idx`, widened to f64.
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        with_data!(self, v => v.get(idx).map(|x| x.to_f64()))
    }

    /// Overwrite the element at `idx`; returns false when out of bounds.
    pub fn set_f64(&mut self, idx: usize, value: f64) -> bool {
        with_data!(self, v => match v.get_mut(idx) {
            Some(slot) => {
                *slot = Element::from_f64(value);
                true
            }
            None => false,
        })
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        with_data!(self, v => convert_vec::<_, f32>(v))
    }

    /// Convert to another dtype (integers round, u8 saturates).
    pub fn cast(&self, dtype: DataType) -> TensorData {
        match dtype {
            DataType::UInt8 => TensorData::U8(with_data!(self, v => convert_vec::<_, u8>(v))),
            DataType::Int32 => TensorData::I32(with_data!(self, v => convert_vec::<_, i32>(v))),
            DataType::Int64 => TensorData::I64(with_data!(self, v => convert_vec::<_, i64>(v))),
            DataType::Float32 => TensorData::F32(self.to_f32_vec()),
        }
    }
}

/// A dense tensor: shape plus a flat row-major buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Build a tensor, checking that the buffer matches the shape.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::Shape(format!(
                "shape {:?} needs {} elements, buffer has {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn from_u8(shape: Vec<usize>, values: Vec<u8>) -> Result<Self> {
        Self::new(shape, TensorData::U8(values))
    }

    pub fn from_f32(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        Self::new(shape, TensorData::F32(values))
    }

    pub fn from_i32(shape: Vec<usize>, values: Vec<i32>) -> Result<Self> {
        Self::new(shape, TensorData::I32(values))
    }

    /// Rank-0 int32 tensor (labels).
    pub fn scalar_i32(v: i32) -> Self {
        Self {
            shape: vec![],
            data: TensorData::I32(vec![v]),
        }
    }

    pub fn zeros(shape: Vec<usize>, dtype: DataType) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: TensorData::zeros(dtype, len),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.num_elements() * self.dtype().size_bytes()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Element at a flat row-major position, widened to f64.
    pub fn get_f64(&self, flat_idx: usize) -> Option<f64> {
        self.data.get_f64(flat_idx)
    }

    /// Overwrite one element at a flat row-major position.
    pub fn set_f64(&mut self, flat_idx: usize, value: f64) -> Result<()> {
        if self.data.set_f64(flat_idx, value) {
            Ok(())
        } else {
            Err(Error::Shape(format!(
                "index {} out of bounds for {} elements",
                flat_idx,
                self.num_elements()
            )))
        }
    }

    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        Self::new(shape, self.data)
    }

    /// Stack equally-shaped tensors along a new leading axis.
    pub fn stack(tensors: &[Tensor]) -> Result<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::Shape("cannot stack an empty tensor list".into()))?;
        if let Some(bad) = tensors.iter().find(|t| t.shape != first.shape) {
            return Err(Error::Shape(format!(
                "cannot stack tensors of shape {:?} and {:?}",
                first.shape, bad.shape
            )));
        }
        let parts: Vec<&TensorData> = tensors.iter().map(|t| &t.data).collect();
        let data = TensorData::concat(&parts)?;
        let mut shape = Vec::with_capacity(first.rank() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);
        Tensor::new(shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        let err = Tensor::from_u8(vec![2, 2], vec![1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("needs 4 elements"));
    }

    #[test]
    fn scalar_has_empty_shape() {
        let t = Tensor::scalar_i32(5);
        assert_eq!(t.rank(), 0);
        assert_eq!(t.num_elements(), 1);
        assert_eq!(t.get_f64(0), Some(5.0));
    }

    #[test]
    fn stack_adds_leading_axis() {
        let a = Tensor::from_u8(vec![2], vec![1, 2]).unwrap();
        let b = Tensor::from_u8(vec![2], vec![3, 4]).unwrap();
        let s = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &TensorData::U8(vec![1, 2, 3, 4]));
    }

    #[test]
    fn stack_rejects_ragged_shapes() {
        let a = Tensor::from_u8(vec![2], vec![1, 2]).unwrap();
        let b = Tensor::from_u8(vec![3], vec![3, 4, 5]).unwrap();
        assert!(Tensor::stack(&[a, b]).is_err());
    }

    #[test]
    fn stack_rejects_mixed_dtypes() {
        let a = Tensor::from_u8(vec![1], vec![1]).unwrap();
        let b = Tensor::from_f32(vec![1], vec![1.0]).unwrap();
        assert!(Tensor::stack(&[a, b]).is_err());
    }

    #[test]
    fn gather_fills_missing_slots() {
        let data = TensorData::U8(vec![10, 20, 30]);
        let out = data.gather(&[Some(2), None, Some(0)], 7.0).unwrap();
        assert_eq!(out, TensorData::U8(vec![30, 7, 10]));
        assert!(data.gather(&[Some(3)], 0.0).is_err());
    }

    #[test]
    fn set_writes_in_place() {
        let mut t = Tensor::zeros(vec![2, 2], DataType::Int32);
        t.set_f64(3, 9.0).unwrap();
        assert_eq!(t.get_f64(3), Some(9.0));
        assert!(t.set_f64(4, 1.0).is_err());
    }

    #[test]
    fn cast_rounds_and_saturates() {
        let data = TensorData::F32(vec![1.6, -4.0, 300.0]);
        assert_eq!(data.cast(DataType::UInt8), TensorData::U8(vec![2, 0, 255]));
        assert_eq!(data.cast(DataType::Int32), TensorData::I32(vec![2, -4, 300]));
    }
}
