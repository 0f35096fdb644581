//! Pipeline rows: an ordered, name-unique mapping of column name to tensor.
//!
//! Column order is preserved so that projections and batching are
//! deterministic. An empty row doubles as the end-of-stream sentinel at the
//! iterator boundary.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// The tensors a transform step consumes and produces, in column order.
pub type TensorRow = Vec<Tensor>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Tensor)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(name, tensor)` pairs; duplicate names are rejected.
    pub fn from_columns(columns: Vec<(String, Tensor)>) -> Result<Self> {
        let mut row = Row::new();
        for (name, tensor) in columns {
            if row.contains(&name) {
                return Err(Error::Column(format!("duplicate column '{}'", name)));
            }
            row.columns.push((name, tensor));
        }
        Ok(row)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Insert or replace a column; a replaced column keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.columns[idx].1 = tensor,
            None => self.columns.push((name, tensor)),
        }
    }

    /// Insert at a position, shifting later columns right. Replaces in place if
    /// the name already exists.
    pub fn insert_at(&mut self, idx: usize, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.position(&name) {
            Some(existing) => self.columns[existing].1 = tensor,
            None => {
                let idx = idx.min(self.columns.len());
                self.columns.insert(idx, (name, tensor));
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        let idx = self.position(name)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.columns.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn into_columns(self) -> Vec<(String, Tensor)> {
        self.columns
    }

    /// Keep only `names`, in the given order.
    pub fn project(mut self, names: &[String]) -> Result<Row> {
        let mut out = Row::new();
        for name in names {
            let tensor = self
                .remove(name)
                .ok_or_else(|| Error::Column(format!("project: column '{}' not found", name)))?;
            out.columns.push((name.clone(), tensor));
        }
        Ok(out)
    }

    /// Rename `from` to `to`, keeping the column position.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from != to && self.contains(to) {
            return Err(Error::Column(format!(
                "rename: target column '{}' already exists",
                to
            )));
        }
        let idx = self
            .position(from)
            .ok_or_else(|| Error::Column(format!("rename: column '{}' not found", from)))?;
        self.columns[idx].0 = to.to_string();
        Ok(())
    }
}

impl std::ops::Index<&str> for Row {
    type Output = Tensor;

    fn index(&self, name: &str) -> &Tensor {
        match self.get(name) {
            Some(t) => t,
            None => panic!("row has no column '{}'", name),
        }
    }
}
