//! Logical pipeline plan and the fluent `Dataset` builder.
//!
//! Every builder call validates its arguments against the columns the plan
//! produces so far, so a broken pipeline fails where it is declared.

use std::collections::HashSet;
use std::sync::Arc;

use dsflow_operators::{Sampler, SourceSpec, Transform, TransformStep};

use crate::cardinality::estimate_rows;
use crate::error::PlanError;

/// A map stage: its steps plus column bookkeeping.
#[derive(Debug, Clone)]
pub struct MapStage {
    pub steps: Vec<Arc<dyn TransformStep>>,
    /// Columns fed to the first step, in order.
    pub input_columns: Vec<String>,
    /// Names given to the last step's outputs, in order.
    pub output_columns: Vec<String>,
    /// If non-empty, the row is projected to these columns afterwards.
    pub project_columns: Vec<String>,
    /// Per-stage override of `PipelineConfig::num_parallel_workers`.
    pub num_parallel_workers: Option<usize>,
}

impl MapStage {
    /// Columns after this stage, given the columns before it.
    ///
    /// Input columns are removed and the outputs are inserted where the
    /// left-most input column used to be.
    pub fn output_schema(&self, input: &[String]) -> Result<Vec<String>, PlanError> {
        let mut cols = input.to_vec();
        let mut insert_at = cols.len();
        for name in &self.input_columns {
            let pos = cols.iter().position(|c| c == name).ok_or_else(|| {
                PlanError::InvalidArgument(format!(
                    "map: input column '{}' not in {:?}",
                    name, input
                ))
            })?;
            insert_at = insert_at.min(pos);
        }
        cols.retain(|c| !self.input_columns.contains(c));
        let insert_at = insert_at.min(cols.len());
        for (offset, name) in self.output_columns.iter().enumerate() {
            if cols.contains(name) {
                return Err(PlanError::InvalidArgument(format!(
                    "map: output column '{}' collides with an existing column",
                    name
                )));
            }
            cols.insert(insert_at + offset, name.clone());
        }
        if self.project_columns.is_empty() {
            return Ok(cols);
        }
        check_columns("map project", &self.project_columns, &cols)?;
        Ok(self.project_columns.clone())
    }
}

#[derive(Debug, Clone)]
pub enum LogicalPlan {
    Source {
        spec: SourceSpec,
        sampler: Sampler,
    },
    Map {
        input: Box<LogicalPlan>,
        stage: MapStage,
    },
    Shuffle {
        input: Box<LogicalPlan>,
        buffer_size: usize,
    },
    Batch {
        input: Box<LogicalPlan>,
        batch_size: usize,
        drop_remainder: bool,
    },
    /// `count: None` repeats forever.
    Repeat {
        input: Box<LogicalPlan>,
        count: Option<u32>,
    },
    Project {
        input: Box<LogicalPlan>,
        columns: Vec<String>,
    },
    Rename {
        input: Box<LogicalPlan>,
        from: Vec<String>,
        to: Vec<String>,
    },
    Take {
        input: Box<LogicalPlan>,
        count: usize,
    },
    Skip {
        input: Box<LogicalPlan>,
        count: usize,
    },
}

impl LogicalPlan {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::Source { .. } => "source",
            LogicalPlan::Map { .. } => "map",
            LogicalPlan::Shuffle { .. } => "shuffle",
            LogicalPlan::Batch { .. } => "batch",
            LogicalPlan::Repeat { .. } => "repeat",
            LogicalPlan::Project { .. } => "project",
            LogicalPlan::Rename { .. } => "rename",
            LogicalPlan::Take { .. } => "take",
            LogicalPlan::Skip { .. } => "skip",
        }
    }

    pub fn input(&self) -> Option<&LogicalPlan> {
        match self {
            LogicalPlan::Source { .. } => None,
            LogicalPlan::Map { input, .. }
            | LogicalPlan::Shuffle { input, .. }
            | LogicalPlan::Batch { input, .. }
            | LogicalPlan::Repeat { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Rename { input, .. }
            | LogicalPlan::Take { input, .. }
            | LogicalPlan::Skip { input, .. } => Some(input),
        }
    }

    /// Column names rows carry after this node.
    pub fn output_columns(&self) -> Result<Vec<String>, PlanError> {
        match self {
            LogicalPlan::Source { spec, .. } => Ok(spec.column_names()),
            LogicalPlan::Map { input, stage } => stage.output_schema(&input.output_columns()?),
            LogicalPlan::Project { columns, .. } => Ok(columns.clone()),
            // All pairs apply at once, so swaps work.
            LogicalPlan::Rename { input, from, to } => Ok(input
                .output_columns()?
                .into_iter()
                .map(|c| match from.iter().position(|f| *f == c) {
                    Some(k) => to[k].clone(),
                    None => c,
                })
                .collect()),
            LogicalPlan::Shuffle { input, .. }
            | LogicalPlan::Batch { input, .. }
            | LogicalPlan::Repeat { input, .. }
            | LogicalPlan::Take { input, .. }
            | LogicalPlan::Skip { input, .. } => input.output_columns(),
        }
    }

    /// Number of nodes in the chain.
    pub fn depth(&self) -> usize {
        1 + self.input().map_or(0, LogicalPlan::depth)
    }
}

fn check_unique(what: &str, names: &[String]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for n in names {
        if !seen.insert(n) {
            return Err(PlanError::InvalidArgument(format!(
                "{}: duplicate column '{}'",
                what, n
            )));
        }
    }
    Ok(())
}

fn check_columns(what: &str, wanted: &[String], available: &[String]) -> Result<(), PlanError> {
    check_unique(what, wanted)?;
    if let Some(missing) = wanted.iter().find(|c| !available.contains(c)) {
        return Err(PlanError::InvalidArgument(format!(
            "{}: column '{}' not in {:?}",
            what, missing, available
        )));
    }
    Ok(())
}

fn to_strings<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|s| s.as_ref().to_string()).collect()
}

/// Options for [`Dataset::map_with`].
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    pub operations: Vec<Transform>,
    /// Defaults to the first column of the incoming rows.
    pub input_columns: Vec<String>,
    /// Defaults to `input_columns`.
    pub output_columns: Vec<String>,
    pub project_columns: Vec<String>,
    pub num_parallel_workers: Option<usize>,
}

impl MapOptions {
    pub fn new(operations: Vec<Transform>) -> Self {
        Self {
            operations,
            ..Default::default()
        }
    }

    pub fn input_columns<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.input_columns = to_strings(cols);
        self
    }

    pub fn output_columns<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.output_columns = to_strings(cols);
        self
    }

    pub fn project_columns<S: AsRef<str>>(mut self, cols: &[S]) -> Self {
        self.project_columns = to_strings(cols);
        self
    }

    pub fn num_parallel_workers(mut self, n: usize) -> Self {
        self.num_parallel_workers = Some(n);
        self
    }
}

/// A lazily-described pipeline. Nothing runs until an iterator is created.
#[derive(Debug, Clone)]
pub struct Dataset {
    plan: LogicalPlan,
}

impl Dataset {
    pub fn source(spec: SourceSpec, sampler: Sampler) -> Result<Self, PlanError> {
        spec.validate()?;
        sampler.validate()?;
        Ok(Self {
            plan: LogicalPlan::Source { spec, sampler },
        })
    }

    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    pub fn into_plan(self) -> LogicalPlan {
        self.plan
    }

    pub fn column_names(&self) -> Result<Vec<String>, PlanError> {
        self.plan.output_columns()
    }

    /// Rows one full iteration yields, or `None` when it never ends.
    pub fn dataset_size(&self) -> Option<u64> {
        estimate_rows(&self.plan)
    }

    fn wrap(self, f: impl FnOnce(Box<LogicalPlan>) -> LogicalPlan) -> Self {
        Self {
            plan: f(Box::new(self.plan)),
        }
    }

    /// Apply `operations` to the first column.
    pub fn map(self, operations: Vec<Transform>) -> Result<Self, PlanError> {
        self.map_with(MapOptions::new(operations))
    }

    pub fn map_with(self, options: MapOptions) -> Result<Self, PlanError> {
        if options.operations.is_empty() {
            return Err(PlanError::InvalidArgument(
                "map: operations must not be empty".into(),
            ));
        }
        if options.num_parallel_workers == Some(0) {
            return Err(PlanError::InvalidArgument(
                "map: num_parallel_workers must be >= 1".into(),
            ));
        }
        let steps = options
            .operations
            .iter()
            .map(Transform::build)
            .collect::<Result<Vec<_>, _>>()?;

        let current = self.plan.output_columns()?;
        let input_columns = if options.input_columns.is_empty() {
            let first = current.first().ok_or_else(|| {
                PlanError::InvalidArgument("map: incoming rows have no columns".into())
            })?;
            vec![first.clone()]
        } else {
            options.input_columns
        };
        check_columns("map input", &input_columns, &current)?;
        let output_columns = if options.output_columns.is_empty() {
            input_columns.clone()
        } else {
            options.output_columns
        };
        check_unique("map output", &output_columns)?;

        let stage = MapStage {
            steps,
            input_columns,
            output_columns,
            project_columns: options.project_columns,
            num_parallel_workers: options.num_parallel_workers,
        };
        stage.output_schema(&current)?;
        Ok(self.wrap(|input| LogicalPlan::Map { input, stage }))
    }

    pub fn batch(self, batch_size: usize) -> Result<Self, PlanError> {
        self.batch_with(batch_size, false)
    }

    pub fn batch_with(self, batch_size: usize, drop_remainder: bool) -> Result<Self, PlanError> {
        if batch_size == 0 {
            return Err(PlanError::InvalidArgument(
                "batch: batch_size must be >= 1".into(),
            ));
        }
        Ok(self.wrap(|input| LogicalPlan::Batch {
            input,
            batch_size,
            drop_remainder,
        }))
    }

    pub fn shuffle(self, buffer_size: usize) -> Result<Self, PlanError> {
        if buffer_size == 0 {
            return Err(PlanError::InvalidArgument(
                "shuffle: buffer_size must be >= 1".into(),
            ));
        }
        Ok(self.wrap(|input| LogicalPlan::Shuffle { input, buffer_size }))
    }

    pub fn repeat(self, count: u32) -> Result<Self, PlanError> {
        if count == 0 {
            return Err(PlanError::InvalidArgument(
                "repeat: count must be >= 1 (use repeat_forever for an endless stream)".into(),
            ));
        }
        Ok(self.wrap(|input| LogicalPlan::Repeat {
            input,
            count: Some(count),
        }))
    }

    pub fn repeat_forever(self) -> Result<Self, PlanError> {
        Ok(self.wrap(|input| LogicalPlan::Repeat { input, count: None }))
    }

    pub fn project<S: AsRef<str>>(self, columns: &[S]) -> Result<Self, PlanError> {
        let columns = to_strings(columns);
        if columns.is_empty() {
            return Err(PlanError::InvalidArgument(
                "project: columns must not be empty".into(),
            ));
        }
        check_columns("project", &columns, &self.plan.output_columns()?)?;
        Ok(self.wrap(|input| LogicalPlan::Project { input, columns }))
    }

    pub fn rename<S: AsRef<str>>(self, from: &[S], to: &[S]) -> Result<Self, PlanError> {
        let (from, to) = (to_strings(from), to_strings(to));
        if from.is_empty() || from.len() != to.len() {
            return Err(PlanError::InvalidArgument(format!(
                "rename: need matching non-empty column lists, got {} and {}",
                from.len(),
                to.len()
            )));
        }
        let current = self.plan.output_columns()?;
        check_columns("rename", &from, &current)?;
        check_unique("rename target", &to)?;
        if let Some(clash) = to
            .iter()
            .find(|t| current.contains(t) && !from.contains(t))
        {
            return Err(PlanError::InvalidArgument(format!(
                "rename: target column '{}' already exists",
                clash
            )));
        }
        Ok(self.wrap(|input| LogicalPlan::Rename { input, from, to }))
    }

    pub fn take(self, count: usize) -> Result<Self, PlanError> {
        Ok(self.wrap(|input| LogicalPlan::Take { input, count }))
    }

    pub fn skip(self, count: usize) -> Result<Self, PlanError> {
        Ok(self.wrap(|input| LogicalPlan::Skip { input, count }))
    }
}
