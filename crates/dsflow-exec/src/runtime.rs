//! Runtime: instantiate pull-based operators from a compiled execution tree.
//!
//! Behavior:
//! - Every tree node becomes one `RowStream`; the root stream is what the
//!   iterator pulls from.
//! - `next_row` returns `Ok(None)` once the current pass is exhausted and
//!   keeps doing so until `reset`. Resetting a source advances it to the next
//!   sampler epoch, which is how `repeat` gets a fresh order per pass.
//! - Map stages with more than one worker pull `workers * chunk_rows` rows,
//!   process them in chunks on scoped threads and emit them in input order.
//!   Every row carries its ordinal within the stage into the steps, so random
//!   steps draw the same values whichever worker runs the row.

use std::collections::VecDeque;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use dsflow_core::config::PipelineConfig;
use dsflow_core::row::Row;
use dsflow_core::tensor::Tensor;
use dsflow_operators::{OpError, Sampler, SourceSpec};
use dsflow_planner::{ExecutionTree, MapStage, NodeId, OperatorKind, PassError, PlanError};

use crate::metrics::emit_span;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("plan: {0}")]
    Plan(#[from] PlanError),
    #[error("operator exec: {0}")]
    Operator(String),
    #[error("invalid tree: {0}")]
    Invalid(String),
    #[error("iterator was stopped")]
    Stopped,
    #[error("worker: {0}")]
    Worker(String),
    #[error("hashing error: {0}")]
    Hash(String),
}

impl From<OpError> for ExecError {
    fn from(e: OpError) -> Self {
        ExecError::Operator(e.to_string())
    }
}

impl From<dsflow_core::Error> for ExecError {
    fn from(e: dsflow_core::Error) -> Self {
        ExecError::Operator(e.to_string())
    }
}

impl From<PassError> for ExecError {
    fn from(e: PassError) -> Self {
        ExecError::Invalid(e.to_string())
    }
}

/// A pull-based runtime operator.
pub trait RowStream: Send {
    fn name(&self) -> &'static str;

    /// Next row of the current pass, `None` once it is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>, ExecError>;

    /// Rewind for another pass over the input.
    fn reset(&mut self) -> Result<(), ExecError>;
}

/// Builds runtime operators for a compiled tree.
pub struct Engine {
    cfg: PipelineConfig,
}

impl Engine {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Instantiate the operator chain rooted at the tree's root.
    pub fn build(&self, tree: &ExecutionTree) -> Result<Box<dyn RowStream>, ExecError> {
        // Rejects cycles and dangling children before recursing.
        tree.preorder()?;
        self.build_node(tree, tree.root()?)
    }

    fn build_node(&self, tree: &ExecutionTree, id: NodeId) -> Result<Box<dyn RowStream>, ExecError> {
        let node = tree.node(id)?;
        let child = match node.children.as_slice() {
            [] => None,
            [only] => Some(self.build_node(tree, *only)?),
            many => {
                return Err(ExecError::Invalid(format!(
                    "{} ({}) has {} children; only linear pipelines run",
                    node.id,
                    node.kind.name(),
                    many.len()
                )))
            }
        };

        let op: Box<dyn RowStream> = match (&node.kind, child) {
            (OperatorKind::Source { spec, sampler }, None) => {
                Box::new(SourceOp::new(spec.clone(), sampler.clone(), self.cfg.seed))
            }
            (OperatorKind::Map(stage), Some(child)) => Box::new(MapOp {
                child,
                stage: stage.clone(),
                workers: stage
                    .num_parallel_workers
                    .unwrap_or(self.cfg.num_parallel_workers)
                    .max(1),
                chunk_rows: self.cfg.worker_chunk_rows.max(1),
                rows_seen: 0,
                ready: VecDeque::new(),
            }),
            (OperatorKind::Shuffle { buffer_size }, Some(child)) => Box::new(ShuffleOp {
                child,
                buffer_size: (*buffer_size).max(1),
                buffer: Vec::new(),
                rng: op_rng(self.cfg.seed, node.id.get()),
                drained: false,
            }),
            (
                OperatorKind::Batch {
                    batch_size,
                    drop_remainder,
                },
                Some(child),
            ) => Box::new(BatchOp {
                child,
                batch_size: (*batch_size).max(1),
                drop_remainder: *drop_remainder,
            }),
            (OperatorKind::Repeat { count }, Some(child)) => Box::new(RepeatOp {
                child,
                count: *count,
                passes: 0,
                yielded: false,
                finished: false,
            }),
            (OperatorKind::Project { columns }, Some(child)) => Box::new(ProjectOp {
                child,
                columns: columns.clone(),
            }),
            (OperatorKind::Rename { from, to }, Some(child)) => Box::new(RenameOp {
                child,
                from: from.clone(),
                to: to.clone(),
            }),
            (OperatorKind::Take { count }, Some(child)) => Box::new(TakeOp {
                child,
                count: *count,
                taken: 0,
            }),
            (OperatorKind::Skip { count }, Some(child)) => Box::new(SkipOp {
                child,
                count: *count,
                skipped: false,
            }),
            (kind, _) => {
                return Err(ExecError::Invalid(format!(
                    "{} ({}) has the wrong number of children",
                    node.id,
                    kind.name()
                )))
            }
        };

        emit_span(
            "build_operator",
            &[("op", node.id.to_string()), ("kind", node.kind.describe())],
        );
        Ok(op)
    }
}

fn op_rng(seed: Option<u64>, op: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ op.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

// --- operators ---

struct SourceOp {
    spec: SourceSpec,
    sampler: Sampler,
    labels: Vec<i32>,
    seed: Option<u64>,
    epoch: u64,
    order: Option<Vec<usize>>,
    pos: usize,
}

impl SourceOp {
    fn new(spec: SourceSpec, sampler: Sampler, seed: Option<u64>) -> Self {
        let labels = match sampler {
            Sampler::Pk { .. } => spec.labels(),
            _ => Vec::new(),
        };
        Self {
            spec,
            sampler,
            labels,
            seed,
            epoch: 0,
            order: None,
            pos: 0,
        }
    }
}

impl RowStream for SourceOp {
    fn name(&self) -> &'static str {
        "source"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        if self.order.is_none() {
            let order =
                self.sampler
                    .indices(self.spec.len(), &self.labels, self.seed, self.epoch)?;
            self.order = Some(order);
        }
        let index = match self.order.as_deref().and_then(|o| o.get(self.pos)) {
            Some(i) => *i,
            None => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(self.spec.read(index)?))
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.epoch += 1;
        self.order = None;
        self.pos = 0;
        Ok(())
    }
}

struct MapOp {
    child: Box<dyn RowStream>,
    stage: MapStage,
    workers: usize,
    chunk_rows: usize,
    /// Rows handed to the steps so far; survives `reset`.
    rows_seen: u64,
    ready: VecDeque<Row>,
}

/// Run one row through a map stage: pull the input columns, apply the
/// steps, put the outputs where the left-most input was.
fn apply_stage(stage: &MapStage, mut row: Row, ordinal: u64) -> Result<Row, ExecError> {
    let at = stage
        .input_columns
        .iter()
        .filter_map(|c| row.position(c))
        .min()
        .unwrap_or(row.len());
    let mut tensors = Vec::with_capacity(stage.input_columns.len());
    for name in &stage.input_columns {
        let t = row
            .remove(name)
            .ok_or_else(|| ExecError::Operator(format!("map: column '{}' not found", name)))?;
        tensors.push(t);
    }
    for step in &stage.steps {
        tensors = step
            .apply_at(tensors, ordinal)
            .map_err(|e| ExecError::Operator(format!("{}: {}", step.name(), e)))?;
    }
    if tensors.len() != stage.output_columns.len() {
        return Err(ExecError::Operator(format!(
            "map: steps produced {} columns for {} output names",
            tensors.len(),
            stage.output_columns.len()
        )));
    }
    let at = at.min(row.len());
    for (offset, (name, t)) in stage.output_columns.iter().zip(tensors).enumerate() {
        if row.contains(name) {
            return Err(ExecError::Operator(format!(
                "map: output column '{}' already exists",
                name
            )));
        }
        row.insert_at(at + offset, name.clone(), t);
    }
    if stage.project_columns.is_empty() {
        Ok(row)
    } else {
        Ok(row.project(&stage.project_columns)?)
    }
}

fn run_chunks(
    stage: &MapStage,
    rows: Vec<Row>,
    chunk_rows: usize,
    first_ordinal: u64,
) -> Result<Vec<Row>, ExecError> {
    let mut chunks: Vec<(u64, Vec<Row>)> = Vec::new();
    let mut next = first_ordinal;
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk: Vec<Row> = rows.by_ref().take(chunk_rows).collect();
        let start = next;
        next += chunk.len() as u64;
        chunks.push((start, chunk));
    }

    let joined: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|(start, chunk)| {
                s.spawn(move || {
                    crate::fail_point!("map_worker");
                    chunk
                        .into_iter()
                        .zip(start..)
                        .map(|(r, ordinal)| apply_stage(stage, r, ordinal))
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();
        // Join everything before inspecting results so no worker outlives the
        // scope unjoined.
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut out = Vec::new();
    for result in joined {
        let rows = result.map_err(|_| ExecError::Worker("map worker panicked".into()))??;
        out.extend(rows);
    }
    Ok(out)
}

impl RowStream for MapOp {
    fn name(&self) -> &'static str {
        "map"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        if let Some(row) = self.ready.pop_front() {
            return Ok(Some(row));
        }
        let want = if self.workers > 1 {
            self.workers.saturating_mul(self.chunk_rows)
        } else {
            1
        };
        let mut pulled = Vec::new();
        while pulled.len() < want {
            match self.child.next_row()? {
                Some(row) => pulled.push(row),
                None => break,
            }
        }
        if pulled.is_empty() {
            return Ok(None);
        }

        let first = self.rows_seen;
        self.rows_seen += pulled.len() as u64;
        let done = if self.workers > 1 && pulled.len() > 1 {
            run_chunks(&self.stage, pulled, self.chunk_rows, first)?
        } else {
            pulled
                .into_iter()
                .zip(first..)
                .map(|(r, ordinal)| apply_stage(&self.stage, r, ordinal))
                .collect::<Result<Vec<_>, _>>()?
        };
        emit_span("map_round", &[("rows", done.len().to_string())]);
        self.ready.extend(done);
        Ok(self.ready.pop_front())
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.ready.clear();
        self.child.reset()
    }
}

struct ShuffleOp {
    child: Box<dyn RowStream>,
    buffer_size: usize,
    buffer: Vec<Row>,
    rng: StdRng,
    drained: bool,
}

impl RowStream for ShuffleOp {
    fn name(&self) -> &'static str {
        "shuffle"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        while !self.drained && self.buffer.len() < self.buffer_size {
            match self.child.next_row()? {
                Some(row) => self.buffer.push(row),
                None => self.drained = true,
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let pick = self.rng.random_range(0..self.buffer.len());
        Ok(Some(self.buffer.swap_remove(pick)))
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.buffer.clear();
        self.drained = false;
        self.child.reset()
    }
}

struct BatchOp {
    child: Box<dyn RowStream>,
    batch_size: usize,
    drop_remainder: bool,
}

/// Stack same-named columns of `rows` along a new leading axis.
fn stack_rows(rows: Vec<Row>) -> Result<Row, ExecError> {
    let names: Vec<String> = match rows.first() {
        Some(first) => first.column_names().into_iter().map(String::from).collect(),
        None => return Err(ExecError::Operator("batch: no rows to stack".into())),
    };
    let mut columns: Vec<Vec<Tensor>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        if row.len() != names.len() {
            return Err(ExecError::Operator(format!(
                "batch: row has {} columns, expected {}",
                row.len(),
                names.len()
            )));
        }
        for (i, (name, tensor)) in row.into_columns().into_iter().enumerate() {
            if name != names[i] {
                return Err(ExecError::Operator(format!(
                    "batch: column '{}' where '{}' was expected",
                    name, names[i]
                )));
            }
            columns[i].push(tensor);
        }
    }
    let mut stacked = Vec::with_capacity(names.len());
    for (name, tensors) in names.into_iter().zip(columns) {
        let t = Tensor::stack(&tensors)
            .map_err(|e| ExecError::Operator(format!("batch column '{}': {}", name, e)))?;
        stacked.push((name, t));
    }
    Ok(Row::from_columns(stacked)?)
}

impl RowStream for BatchOp {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match self.child.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        if rows.is_empty() || (self.drop_remainder && rows.len() < self.batch_size) {
            return Ok(None);
        }
        stack_rows(rows).map(Some)
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.child.reset()
    }
}

struct RepeatOp {
    child: Box<dyn RowStream>,
    count: Option<u32>,
    passes: u32,
    yielded: bool,
    finished: bool,
}

impl RowStream for RepeatOp {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if let Some(row) = self.child.next_row()? {
                self.yielded = true;
                return Ok(Some(row));
            }
            self.passes = self.passes.saturating_add(1);
            let again = match self.count {
                Some(count) => self.passes < count,
                // An empty pass would repeat forever without yielding.
                None => self.yielded,
            };
            if !again {
                self.finished = true;
                return Ok(None);
            }
            self.yielded = false;
            self.child.reset()?;
        }
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.passes = 0;
        self.yielded = false;
        self.finished = false;
        self.child.reset()
    }
}

struct ProjectOp {
    child: Box<dyn RowStream>,
    columns: Vec<String>,
}

impl RowStream for ProjectOp {
    fn name(&self) -> &'static str {
        "project"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        match self.child.next_row()? {
            Some(row) => Ok(Some(row.project(&self.columns)?)),
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.child.reset()
    }
}

struct RenameOp {
    child: Box<dyn RowStream>,
    from: Vec<String>,
    to: Vec<String>,
}

impl RowStream for RenameOp {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        let row = match self.child.next_row()? {
            Some(row) => row,
            None => return Ok(None),
        };
        if let Some(missing) = self.from.iter().find(|f| !row.contains(f)) {
            return Err(ExecError::Operator(format!(
                "rename: column '{}' not found",
                missing
            )));
        }
        // All pairs apply at once, so swaps work.
        let columns = row
            .into_columns()
            .into_iter()
            .map(|(name, t)| match self.from.iter().position(|f| *f == name) {
                Some(i) => (self.to[i].clone(), t),
                None => (name, t),
            })
            .collect();
        Ok(Some(Row::from_columns(columns)?))
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.child.reset()
    }
}

struct TakeOp {
    child: Box<dyn RowStream>,
    count: usize,
    taken: usize,
}

impl RowStream for TakeOp {
    fn name(&self) -> &'static str {
        "take"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        if self.taken >= self.count {
            return Ok(None);
        }
        let row = self.child.next_row()?;
        if row.is_some() {
            self.taken += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.taken = 0;
        self.child.reset()
    }
}

struct SkipOp {
    child: Box<dyn RowStream>,
    count: usize,
    skipped: bool,
}

impl RowStream for SkipOp {
    fn name(&self) -> &'static str {
        "skip"
    }

    fn next_row(&mut self) -> Result<Option<Row>, ExecError> {
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.count {
                if self.child.next_row()?.is_none() {
                    return Ok(None);
                }
            }
        }
        self.child.next_row()
    }

    fn reset(&mut self) -> Result<(), ExecError> {
        self.skipped = false;
        self.child.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsflow_core::row::TensorRow;
    use dsflow_operators::source::LABEL_COLUMN;
    use dsflow_operators::{Transform, TransformSpec, TransformStep};
    use dsflow_planner::{lower_to_tree, Dataset, MapOptions, TreeCompiler};

    fn mnist(n: usize) -> Dataset {
        Dataset::source(SourceSpec::synthetic_mnist(n), Sampler::default()).unwrap()
    }

    fn run(ds: &Dataset, cfg: PipelineConfig) -> Result<Vec<Row>, ExecError> {
        let tree = TreeCompiler::new(&cfg).compile(ds.plan())?;
        let mut root = Engine::new(cfg).build(&tree)?;
        let mut out = Vec::new();
        while let Some(row) = root.next_row()? {
            out.push(row);
        }
        Ok(out)
    }

    fn labels(rows: &[Row]) -> Vec<i32> {
        rows.iter()
            .map(|r| r[LABEL_COLUMN].get_f64(0).unwrap() as i32)
            .collect()
    }

    #[test]
    fn source_reads_in_sampler_order() {
        let rows = run(&mnist(12), PipelineConfig::default()).unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(labels(&rows), vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1]);
        assert_eq!(rows[0]["image"].shape(), &[28, 28, 1]);
    }

    #[test]
    fn repeat_then_batch() {
        let ds = mnist(10).repeat(2).unwrap().batch(2).unwrap();
        let rows = run(&ds, PipelineConfig::default()).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0]["image"].shape(), &[2, 28, 28, 1]);
        assert_eq!(rows[0][LABEL_COLUMN].shape(), &[2]);
    }

    #[test]
    fn batch_drop_remainder() {
        let keep = run(&mnist(7).batch(3).unwrap(), PipelineConfig::default()).unwrap();
        assert_eq!(keep.len(), 3);
        assert_eq!(keep[2]["image"].shape()[0], 1);
        let drop = run(
            &mnist(7).batch_with(3, true).unwrap(),
            PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(drop.len(), 2);
    }

    #[test]
    fn parallel_map_preserves_order() {
        let ds = mnist(37)
            .map(vec![TransformSpec::resize(8, 8).into()])
            .unwrap();
        let serial = run(
            &ds,
            PipelineConfig {
                num_parallel_workers: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let parallel = run(
            &ds,
            PipelineConfig {
                num_parallel_workers: 4,
                worker_chunk_rows: 3,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(serial.len(), 37);
        assert_eq!(serial, parallel);
        assert_eq!(parallel[5]["image"].shape(), &[8, 8, 1]);
    }

    #[test]
    fn random_map_is_reproducible_across_worker_counts() {
        let ds = mnist(23)
            .map(vec![
                TransformSpec::random_horizontal_flip(0.5).into(),
                TransformSpec::random_crop(20, 20).into(),
            ])
            .unwrap()
            .repeat(2)
            .unwrap();
        let cfg = |workers| PipelineConfig {
            seed: Some(17),
            num_parallel_workers: workers,
            worker_chunk_rows: 2,
            ..Default::default()
        };
        let serial = run(&ds, cfg(1)).unwrap();
        assert_eq!(serial, run(&ds, cfg(1)).unwrap());
        assert_eq!(serial, run(&ds, cfg(4)).unwrap());
        assert_eq!(serial.len(), 46);
        // The second pass draws new crops for the same source rows.
        let first: Vec<_> = serial[..23].iter().map(|r| r["image"].clone()).collect();
        let second: Vec<_> = serial[23..].iter().map(|r| r["image"].clone()).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn oversized_worker_config_does_not_overflow() {
        let ds = mnist(5)
            .map(vec![TransformSpec::resize(4, 4).into()])
            .unwrap();
        let rows = run(
            &ds,
            PipelineConfig {
                num_parallel_workers: usize::MAX / 2,
                worker_chunk_rows: 4,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 5);
    }

    /// Returns its single input twice.
    struct Duplicate;

    impl TransformStep for Duplicate {
        fn name(&self) -> &'static str {
            "duplicate"
        }
        fn fusable(&self) -> bool {
            true
        }
        fn apply(&self, input: TensorRow) -> Result<TensorRow, OpError> {
            Ok(vec![input[0].clone(), input[0].clone()])
        }
    }

    #[test]
    fn map_output_count_must_match_names() {
        let ds = mnist(2).map(vec![Transform::custom(Duplicate)]).unwrap();
        let err = run(&ds, PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, ExecError::Operator(_)));

        let ds = mnist(2)
            .map_with(
                MapOptions::new(vec![Transform::custom(Duplicate)])
                    .input_columns(&["image"])
                    .output_columns(&["a", "b"]),
            )
            .unwrap();
        let rows = run(&ds, PipelineConfig::default()).unwrap();
        assert_eq!(rows[0].column_names(), vec!["a", "b", "label"]);
    }

    #[test]
    fn step_errors_surface() {
        // A crop larger than the 28x28 image only fails at run time.
        let ds = mnist(3)
            .map(vec![TransformSpec::center_crop(64, 64).into()])
            .unwrap();
        let err = run(&ds, PipelineConfig::default()).unwrap_err();
        match err {
            ExecError::Operator(msg) => assert!(msg.contains("center_crop")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn seeded_shuffle_is_a_reproducible_permutation() {
        let ds = mnist(30).shuffle(8).unwrap();
        let cfg = PipelineConfig {
            seed: Some(11),
            ..Default::default()
        };
        let a = labels(&run(&ds, cfg.clone()).unwrap());
        let b = labels(&run(&ds, cfg).unwrap());
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        let mut expected: Vec<i32> = (0..30).map(|i| i % 10).collect();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn take_skip_and_forever() {
        let ds = mnist(10).skip(3).unwrap().take(4).unwrap();
        let rows = run(&ds, PipelineConfig::default()).unwrap();
        assert_eq!(labels(&rows), vec![3, 4, 5, 6]);

        let ds = mnist(3).repeat_forever().unwrap().take(8).unwrap();
        let rows = run(&ds, PipelineConfig::default()).unwrap();
        assert_eq!(labels(&rows), vec![0, 1, 2, 0, 1, 2, 0, 1]);

        let empty = mnist(0).repeat_forever().unwrap();
        assert!(run(&empty, PipelineConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn rename_swaps_at_runtime() {
        let ds = mnist(1).rename(&["image", "label"], &["label", "image"]).unwrap();
        let rows = run(&ds, PipelineConfig::default()).unwrap();
        assert_eq!(rows[0].column_names(), vec!["label", "image"]);
        assert_eq!(rows[0]["label"].shape(), &[28, 28, 1]);
    }

    #[test]
    fn random_sampler_reshuffles_each_epoch() {
        let ds = Dataset::source(
            SourceSpec::synthetic_mnist(10),
            Sampler::random(false, None).unwrap(),
        )
        .unwrap()
        .repeat(2)
        .unwrap();
        let rows = run(
            &ds,
            PipelineConfig {
                seed: Some(5),
                ..Default::default()
            },
        )
        .unwrap();
        let l = labels(&rows);
        assert_eq!(l.len(), 20);
        let (first, second) = l.split_at(10);
        let mut a = first.to_vec();
        a.sort_unstable();
        assert_eq!(a, (0..10).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn engine_rejects_malformed_trees() {
        let ds = mnist(2).batch(1).unwrap();
        let mut tree = lower_to_tree(ds.plan()).unwrap();
        let root = tree.root().unwrap();
        tree.set_children(root, vec![]).unwrap();
        let err = Engine::new(PipelineConfig::default()).build(&tree);
        assert!(matches!(err, Err(ExecError::Invalid(_))));
    }
}
