//! Random augmentations. None of them fuse.
//!
//! A random step holds a seed, not an RNG. Row `n` of a run draws from
//! `mix_seed(seed, n)`, so replaying a run (same seed, same row order)
//! replays every draw regardless of how rows were split across workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dsflow_core::row::TensorRow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{remap, single_image, ImageDims};
use crate::traits::{mix_seed, OpError, TransformStep};

/// Seed state shared by the random steps.
#[derive(Debug)]
struct Draws {
    seed: u64,
    /// Set when the caller chose the seed; such steps ignore reseeding.
    fixed: bool,
    /// Ordinal source for plain `apply` calls.
    calls: AtomicU64,
}

impl Draws {
    fn new(seed: Option<u64>) -> Self {
        Self {
            seed: seed.unwrap_or_else(rand::random),
            fixed: seed.is_some(),
            calls: AtomicU64::new(0),
        }
    }

    fn reseed(&self, seed: u64) -> Option<Self> {
        if self.fixed {
            return None;
        }
        Some(Self {
            seed,
            fixed: false,
            calls: AtomicU64::new(0),
        })
    }

    fn fork(&self) -> Self {
        Self {
            seed: self.seed,
            fixed: self.fixed,
            calls: AtomicU64::new(0),
        }
    }

    fn next_ordinal(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed)
    }

    fn rng(&self, ordinal: u64) -> StdRng {
        StdRng::seed_from_u64(mix_seed(self.seed, ordinal))
    }
}

fn check_prob(op: &str, prob: f32) -> Result<(), OpError> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(OpError::InvalidParams(format!(
            "{}: probability must be in [0, 1], got {}",
            op, prob
        )));
    }
    Ok(())
}

fn roll(rng: &mut StdRng, prob: f32) -> bool {
    prob > 0.0 && rng.random::<f32>() < prob
}

/// Mirror left-right with probability `prob`.
#[derive(Debug)]
pub struct RandomHorizontalFlip {
    prob: f32,
    draws: Draws,
}

impl RandomHorizontalFlip {
    pub fn new(prob: f32, seed: Option<u64>) -> Result<Self, OpError> {
        check_prob("random_horizontal_flip", prob)?;
        Ok(Self {
            prob,
            draws: Draws::new(seed),
        })
    }
}

impl TransformStep for RandomHorizontalFlip {
    fn name(&self) -> &'static str {
        "random_horizontal_flip"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.apply_at(input, self.draws.next_ordinal())
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let image = single_image(self.name(), input)?;
        let dims = ImageDims::of(self.name(), &image)?;
        if !roll(&mut self.draws.rng(ordinal), self.prob) {
            return Ok(vec![image]);
        }
        let out = remap(&image, dims, dims.h, dims.w, 0.0, |y, x| {
            Some((y, dims.w - 1 - x))
        })?;
        Ok(vec![out])
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let draws = self.draws.reseed(seed)?;
        Some(Arc::new(Self {
            prob: self.prob,
            draws,
        }))
    }

    fn describe(&self) -> String {
        format!("random_horizontal_flip(p={})", self.prob)
    }
}

/// Mirror top-bottom with probability `prob`.
#[derive(Debug)]
pub struct RandomVerticalFlip {
    prob: f32,
    draws: Draws,
}

impl RandomVerticalFlip {
    pub fn new(prob: f32, seed: Option<u64>) -> Result<Self, OpError> {
        check_prob("random_vertical_flip", prob)?;
        Ok(Self {
            prob,
            draws: Draws::new(seed),
        })
    }
}

impl TransformStep for RandomVerticalFlip {
    fn name(&self) -> &'static str {
        "random_vertical_flip"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.apply_at(input, self.draws.next_ordinal())
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let image = single_image(self.name(), input)?;
        let dims = ImageDims::of(self.name(), &image)?;
        if !roll(&mut self.draws.rng(ordinal), self.prob) {
            return Ok(vec![image]);
        }
        let out = remap(&image, dims, dims.h, dims.w, 0.0, |y, x| {
            Some((dims.h - 1 - y, x))
        })?;
        Ok(vec![out])
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let draws = self.draws.reseed(seed)?;
        Some(Arc::new(Self {
            prob: self.prob,
            draws,
        }))
    }

    fn describe(&self) -> String {
        format!("random_vertical_flip(p={})", self.prob)
    }
}

/// Crop a `height x width` window at a random position. The window must fit
/// inside the image.
#[derive(Debug)]
pub struct RandomCrop {
    height: usize,
    width: usize,
    draws: Draws,
}

impl RandomCrop {
    pub fn new(height: usize, width: usize, seed: Option<u64>) -> Result<Self, OpError> {
        if height == 0 || width == 0 {
            return Err(OpError::InvalidParams(format!(
                "random_crop: crop size must be positive, got {}x{}",
                height, width
            )));
        }
        Ok(Self {
            height,
            width,
            draws: Draws::new(seed),
        })
    }
}

impl TransformStep for RandomCrop {
    fn name(&self) -> &'static str {
        "random_crop"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.apply_at(input, self.draws.next_ordinal())
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let image = single_image(self.name(), input)?;
        let dims = ImageDims::of(self.name(), &image)?;
        if self.height > dims.h || self.width > dims.w {
            return Err(OpError::Shape(format!(
                "random_crop: crop {}x{} larger than image {}x{}",
                self.height, self.width, dims.h, dims.w
            )));
        }
        let mut rng = self.draws.rng(ordinal);
        let top = rng.random_range(0..=dims.h - self.height);
        let left = rng.random_range(0..=dims.w - self.width);
        let out = remap(&image, dims, self.height, self.width, 0.0, |y, x| {
            Some((y + top, x + left))
        })?;
        Ok(vec![out])
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let draws = self.draws.reseed(seed)?;
        Some(Arc::new(Self {
            height: self.height,
            width: self.width,
            draws,
        }))
    }

    fn describe(&self) -> String {
        format!("random_crop({}x{})", self.height, self.width)
    }
}

/// Zero `num_patches` random `length x length` squares (clipped at the
/// image border).
#[derive(Debug)]
pub struct CutOut {
    length: usize,
    num_patches: usize,
    draws: Draws,
}

impl CutOut {
    pub fn new(length: usize, num_patches: usize, seed: Option<u64>) -> Result<Self, OpError> {
        if length == 0 || num_patches == 0 {
            return Err(OpError::InvalidParams(format!(
                "cut_out: length and num_patches must be positive, got {} and {}",
                length, num_patches
            )));
        }
        Ok(Self {
            length,
            num_patches,
            draws: Draws::new(seed),
        })
    }
}

impl TransformStep for CutOut {
    fn name(&self) -> &'static str {
        "cut_out"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.apply_at(input, self.draws.next_ordinal())
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let mut image = single_image(self.name(), input)?;
        let dims = ImageDims::of(self.name(), &image)?;
        if dims.h == 0 || dims.w == 0 {
            return Ok(vec![image]);
        }
        let patch_h = self.length.min(dims.h);
        let patch_w = self.length.min(dims.w);
        let mut rng = self.draws.rng(ordinal);
        for _ in 0..self.num_patches {
            let top = rng.random_range(0..=dims.h - patch_h);
            let left = rng.random_range(0..=dims.w - patch_w);
            for y in top..top + patch_h {
                for x in left..left + patch_w {
                    for ch in 0..dims.c {
                        image.set_f64(dims.offset(y, x, ch), 0.0)?;
                    }
                }
            }
        }
        Ok(vec![image])
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let draws = self.draws.reseed(seed)?;
        Some(Arc::new(Self {
            length: self.length,
            num_patches: self.num_patches,
            draws,
        }))
    }

    fn describe(&self) -> String {
        format!("cut_out({}, n={})", self.length, self.num_patches)
    }
}

/// Pick `num_ops` of the wrapped steps per row (keeping their relative
/// order) and apply each picked step with probability 1/2.
pub struct UniformAugment {
    ops: Vec<Arc<dyn TransformStep>>,
    num_ops: usize,
    draws: Draws,
}

impl UniformAugment {
    pub fn new(
        ops: Vec<Arc<dyn TransformStep>>,
        num_ops: usize,
        seed: Option<u64>,
    ) -> Result<Self, OpError> {
        if ops.is_empty() || num_ops == 0 || num_ops > ops.len() {
            return Err(OpError::InvalidParams(format!(
                "uniform_augment: num_ops must be in 1..={}, got {}",
                ops.len(),
                num_ops
            )));
        }
        Ok(Self {
            ops,
            num_ops,
            draws: Draws::new(seed),
        })
    }
}

impl TransformStep for UniformAugment {
    fn name(&self) -> &'static str {
        "uniform_augment"
    }

    fn fusable(&self) -> bool {
        false
    }

    fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
        self.apply_at(input, self.draws.next_ordinal())
    }

    fn apply_at(&self, input: TensorRow, ordinal: u64) -> Result<TensorRow, OpError> {
        let mut rng = self.draws.rng(ordinal);
        let mut picked = rand::seq::index::sample(&mut rng, self.ops.len(), self.num_ops).into_vec();
        picked.sort_unstable();
        let mut row = input;
        for i in picked {
            if !rng.random_bool(0.5) {
                continue;
            }
            row = self.ops[i].apply_at(row, ordinal)?;
        }
        Ok(row)
    }

    fn reseeded(&self, seed: u64) -> Option<Arc<dyn TransformStep>> {
        let inner: Vec<Option<Arc<dyn TransformStep>>> = self
            .ops
            .iter()
            .enumerate()
            .map(|(i, op)| op.reseeded(mix_seed(seed, i as u64 + 1)))
            .collect();
        let draws = self.draws.reseed(seed);
        if draws.is_none() && inner.iter().all(Option::is_none) {
            return None;
        }
        let ops = inner
            .into_iter()
            .zip(&self.ops)
            .map(|(new, old)| new.unwrap_or_else(|| Arc::clone(old)))
            .collect();
        Some(Arc::new(Self {
            ops,
            num_ops: self.num_ops,
            draws: draws.unwrap_or_else(|| self.draws.fork()),
        }))
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.ops.iter().map(|s| s.describe()).collect();
        format!("uniform_augment([{}], n={})", inner.join(", "), self.num_ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::test_util::ramp;
    use crate::vision::CenterCrop;
    use dsflow_core::tensor::{Tensor, TensorData};

    #[test]
    fn flips_with_certainty() {
        let img = Tensor::from_u8(vec![2, 2, 1], vec![1, 2, 3, 4]).unwrap();
        let h = RandomHorizontalFlip::new(1.0, Some(0)).unwrap();
        assert_eq!(
            h.apply(vec![img.clone()]).unwrap()[0].data(),
            &TensorData::U8(vec![2, 1, 4, 3])
        );
        let v = RandomVerticalFlip::new(1.0, Some(0)).unwrap();
        assert_eq!(
            v.apply(vec![img.clone()]).unwrap()[0].data(),
            &TensorData::U8(vec![3, 4, 1, 2])
        );
        let never = RandomHorizontalFlip::new(0.0, None).unwrap();
        assert_eq!(never.apply(vec![img.clone()]).unwrap()[0], img);
    }

    #[test]
    fn probability_out_of_range_rejected() {
        assert!(RandomHorizontalFlip::new(1.5, None).is_err());
        assert!(RandomVerticalFlip::new(-0.1, None).is_err());
    }

    #[test]
    fn draws_depend_only_on_seed_and_ordinal() {
        let a = RandomCrop::new(3, 3, Some(11)).unwrap();
        let b = RandomCrop::new(3, 3, Some(11)).unwrap();
        // Visit ordinals in a different order on `b`.
        let a_out: Vec<_> = (0..8)
            .map(|n| a.apply_at(vec![ramp(8, 8, 1)], n).unwrap())
            .collect();
        for n in (0..8).rev() {
            assert_eq!(b.apply_at(vec![ramp(8, 8, 1)], n).unwrap(), a_out[n as usize]);
        }
        assert!(a_out.iter().any(|r| r != &a_out[0]));
    }

    #[test]
    fn fixed_seed_ignores_reseeding() {
        let fixed = RandomHorizontalFlip::new(0.5, Some(3)).unwrap();
        assert!(fixed.reseeded(99).is_none());
        let free = RandomHorizontalFlip::new(0.5, None).unwrap();
        let a = free.reseeded(99).unwrap();
        let b = free.reseeded(99).unwrap();
        for n in 0..16 {
            assert_eq!(
                a.apply_at(vec![ramp(2, 3, 1)], n).unwrap(),
                b.apply_at(vec![ramp(2, 3, 1)], n).unwrap()
            );
        }
    }

    #[test]
    fn random_crop_stays_inside_the_image() {
        let op = RandomCrop::new(2, 3, None).unwrap();
        for _ in 0..20 {
            let out = op.apply(vec![ramp(4, 5, 1)]).unwrap();
            assert_eq!(out[0].shape(), &[2, 3, 1]);
        }
        let too_big = RandomCrop::new(5, 5, None).unwrap().apply(vec![ramp(4, 4, 1)]);
        assert!(matches!(too_big, Err(OpError::Shape(_))));
        assert!(RandomCrop::new(0, 2, None).is_err());
    }

    #[test]
    fn cut_out_zeroes_a_patch() {
        let img = Tensor::from_u8(vec![4, 4, 1], vec![9; 16]).unwrap();
        let op = CutOut::new(2, 1, Some(3)).unwrap();
        let out = op.apply(vec![img]).unwrap();
        let zeros = out[0].data().to_f32_vec().iter().filter(|v| **v == 0.0).count();
        assert_eq!(zeros, 4);
    }

    #[test]
    fn cut_out_clips_oversized_patch() {
        let op = CutOut::new(10, 2, Some(1)).unwrap();
        let out = op.apply(vec![ramp(3, 3, 1)]).unwrap();
        assert!(out[0].data().to_f32_vec().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn uniform_augment_applies_subsets_in_order() {
        let crop: Arc<dyn TransformStep> = Arc::new(RandomCrop::new(6, 6, None).unwrap());
        let center: Arc<dyn TransformStep> = Arc::new(CenterCrop::new(4, 4).unwrap());
        let op = UniformAugment::new(vec![crop, center], 2, Some(5)).unwrap();
        let mut shapes = std::collections::HashSet::new();
        for n in 0..64 {
            let out = op.apply_at(vec![ramp(8, 8, 1)], n).unwrap();
            shapes.insert(out[0].shape().to_vec());
        }
        // Each of the two steps is skipped or applied independently.
        assert!(shapes.contains(&vec![8, 8, 1]));
        assert!(shapes.contains(&vec![6, 6, 1]));
        assert!(shapes.contains(&vec![4, 4, 1]));
        assert_eq!(op.describe(), "uniform_augment([random_crop(6x6), center_crop(4x4)], n=2)");
    }

    #[test]
    fn uniform_augment_validates_num_ops() {
        let center: Arc<dyn TransformStep> = Arc::new(CenterCrop::new(4, 4).unwrap());
        assert!(UniformAugment::new(vec![Arc::clone(&center)], 2, None).is_err());
        assert!(UniformAugment::new(vec![center], 0, None).is_err());
        assert!(UniformAugment::new(vec![], 1, None).is_err());
    }

    #[test]
    fn uniform_augment_reseeds_inner_random_steps() {
        let crop: Arc<dyn TransformStep> = Arc::new(RandomCrop::new(2, 2, None).unwrap());
        let op = UniformAugment::new(vec![crop], 1, Some(1)).unwrap();
        assert!(op.reseeded(7).is_some());
        let center: Arc<dyn TransformStep> = Arc::new(CenterCrop::new(2, 2).unwrap());
        let fixed = UniformAugment::new(vec![center], 1, Some(1)).unwrap();
        assert!(fixed.reseeded(7).is_none());
    }

    #[test]
    fn random_ops_are_not_fusable() {
        assert!(!RandomHorizontalFlip::new(0.5, None).unwrap().fusable());
        assert!(!CutOut::new(1, 1, None).unwrap().fusable());
        assert!(!RandomCrop::new(1, 1, None).unwrap().fusable());
    }
}
