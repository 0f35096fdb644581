//! Dataset sources: deterministic synthetic generators plus in-memory rows.
//!
//! Synthetic sources stand in for file readers. Row `i` is a pure function of
//! `i`, so any sampler order can be served without holding the dataset.

use dsflow_core::row::Row;
use dsflow_core::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::traits::OpError;

pub const IMAGE_COLUMN: &str = "image";
pub const LABEL_COLUMN: &str = "label";

const MNIST_SIDE: usize = 28;
const MNIST_CLASSES: usize = 10;
const CIFAR10_SIDE: usize = 32;
const CIFAR10_CLASSES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// `image: [28, 28, 1] u8`, `label: i32` in `0..10`.
    SyntheticMnist { num_rows: usize },
    /// `image: [32, 32, 3] u8`, `label: i32` in `0..10`.
    SyntheticCifar10 { num_rows: usize },
    /// `image: [height, width, 3] u8`, `label: i32` in `0..num_classes`.
    SyntheticImageFolder {
        num_rows: usize,
        num_classes: usize,
        height: usize,
        width: usize,
    },
    /// Caller-provided rows, served as-is.
    InMemory { rows: Vec<Row> },
}

impl SourceSpec {
    pub fn synthetic_mnist(num_rows: usize) -> Self {
        SourceSpec::SyntheticMnist { num_rows }
    }

    pub fn synthetic_cifar10(num_rows: usize) -> Self {
        SourceSpec::SyntheticCifar10 { num_rows }
    }

    pub fn synthetic_image_folder(
        num_rows: usize,
        num_classes: usize,
        height: usize,
        width: usize,
    ) -> Self {
        SourceSpec::SyntheticImageFolder {
            num_rows,
            num_classes,
            height,
            width,
        }
    }

    pub fn in_memory(rows: Vec<Row>) -> Self {
        SourceSpec::InMemory { rows }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceSpec::SyntheticMnist { .. } => "synthetic_mnist",
            SourceSpec::SyntheticCifar10 { .. } => "synthetic_cifar10",
            SourceSpec::SyntheticImageFolder { .. } => "synthetic_image_folder",
            SourceSpec::InMemory { .. } => "in_memory",
        }
    }

    pub fn validate(&self) -> Result<(), OpError> {
        match self {
            SourceSpec::SyntheticMnist { .. } | SourceSpec::SyntheticCifar10 { .. } => Ok(()),
            SourceSpec::SyntheticImageFolder {
                num_classes,
                height,
                width,
                ..
            } => {
                if *num_classes == 0 || *height == 0 || *width == 0 {
                    return Err(OpError::InvalidParams(format!(
                        "synthetic_image_folder: num_classes/height/width must be positive, got {}/{}/{}",
                        num_classes, height, width
                    )));
                }
                Ok(())
            }
            SourceSpec::InMemory { rows } => {
                let first = match rows.first() {
                    Some(r) => r.column_names(),
                    None => return Ok(()),
                };
                if let Some((i, _)) = rows
                    .iter()
                    .enumerate()
                    .find(|(_, r)| r.column_names() != first)
                {
                    return Err(OpError::InvalidParams(format!(
                        "in_memory: row {} has columns {:?}, expected {:?}",
                        i,
                        rows[i].column_names(),
                        first
                    )));
                }
                Ok(())
            }
        }
    }

    /// Rows in one pass over the source.
    pub fn len(&self) -> usize {
        match self {
            SourceSpec::SyntheticMnist { num_rows }
            | SourceSpec::SyntheticCifar10 { num_rows }
            | SourceSpec::SyntheticImageFolder { num_rows, .. } => *num_rows,
            SourceSpec::InMemory { rows } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        match self {
            SourceSpec::InMemory { rows } => rows
                .first()
                .map(|r| r.column_names().into_iter().map(String::from).collect())
                .unwrap_or_default(),
            _ => vec![IMAGE_COLUMN.to_string(), LABEL_COLUMN.to_string()],
        }
    }

    /// Class label of every row, for per-class samplers. In-memory rows
    /// without a scalar `label` column count as class 0.
    pub fn labels(&self) -> Vec<i32> {
        match self {
            SourceSpec::SyntheticMnist { num_rows } => {
                (0..*num_rows).map(|i| (i % MNIST_CLASSES) as i32).collect()
            }
            SourceSpec::SyntheticCifar10 { num_rows } => {
                (0..*num_rows).map(|i| (i % CIFAR10_CLASSES) as i32).collect()
            }
            SourceSpec::SyntheticImageFolder {
                num_rows,
                num_classes,
                ..
            } => (0..*num_rows).map(|i| (i % (*num_classes).max(1)) as i32).collect(),
            SourceSpec::InMemory { rows } => rows
                .iter()
                .map(|r| {
                    r.get(LABEL_COLUMN)
                        .and_then(|t| t.get_f64(0))
                        .map_or(0, |v| v as i32)
                })
                .collect(),
        }
    }

    /// Produce row `index`.
    pub fn read(&self, index: usize) -> Result<Row, OpError> {
        if index >= self.len() {
            return Err(OpError::Exec(format!(
                "{}: row {} out of range for {} rows",
                self.name(),
                index,
                self.len()
            )));
        }
        match self {
            SourceSpec::SyntheticMnist { .. } => {
                let image = synthetic_image(index, MNIST_SIDE, MNIST_SIDE, 1)?;
                Ok(labelled(image, (index % MNIST_CLASSES) as i32))
            }
            SourceSpec::SyntheticCifar10 { .. } => {
                let image = synthetic_image(index, CIFAR10_SIDE, CIFAR10_SIDE, 3)?;
                Ok(labelled(image, (index % CIFAR10_CLASSES) as i32))
            }
            SourceSpec::SyntheticImageFolder {
                num_classes,
                height,
                width,
                ..
            } => {
                let image = synthetic_image(index, *height, *width, 3)?;
                Ok(labelled(image, (index % (*num_classes).max(1)) as i32))
            }
            SourceSpec::InMemory { rows } => Ok(rows[index].clone()),
        }
    }
}

fn synthetic_image(index: usize, h: usize, w: usize, c: usize) -> Result<Tensor, OpError> {
    let values = (0..h * w * c)
        .map(|i| ((index * 31 + i * 7) % 256) as u8)
        .collect();
    Ok(Tensor::from_u8(vec![h, w, c], values)?)
}

fn labelled(image: Tensor, label: i32) -> Row {
    let mut row = Row::new();
    row.insert(IMAGE_COLUMN, image);
    row.insert(LABEL_COLUMN, Tensor::scalar_i32(label));
    row
}
