//! The consumer-facing iterator.
//!
//! `create_iterator` compiles the dataset's plan, builds the runtime chain and
//! (unless `prefetch_size` is zero) moves it onto a prefetch thread that feeds
//! a bounded channel. Contract:
//! - `get_next_row` returns an empty row at end of stream.
//! - A runtime error is returned exactly once; the stream is over afterwards.
//! - `stop` (or a `StopHandle` from another thread) shuts the worker down;
//!   later calls to `get_next_row` return `ExecError::Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dsflow_core::config::PipelineConfig;
use dsflow_core::manifest::RunManifest;
use dsflow_core::row::Row;
use dsflow_planner::{Dataset, ExecutionTree, LogicalPlan, TreeCompiler};

use crate::replay::hash_run;
use crate::runtime::{Engine, ExecError, RowStream};

type Item = Result<Row, ExecError>;

/// Adds iterator creation to `Dataset`.
pub trait CreateIterator {
    /// Iterate with `PipelineConfig::from_env()`.
    fn create_iterator(&self) -> Result<PipelineIterator, ExecError>;

    fn create_iterator_with(&self, cfg: &PipelineConfig) -> Result<PipelineIterator, ExecError>;
}

impl CreateIterator for Dataset {
    fn create_iterator(&self) -> Result<PipelineIterator, ExecError> {
        self.create_iterator_with(&PipelineConfig::from_env())
    }

    fn create_iterator_with(&self, cfg: &PipelineConfig) -> Result<PipelineIterator, ExecError> {
        PipelineIterator::start(self.plan(), cfg)
    }
}

/// Stops a running iterator from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

enum Driver {
    /// `prefetch_size == 0`: the chain runs on the caller's thread.
    Inline(Box<dyn RowStream>),
    Prefetch {
        rx: Receiver<Item>,
        worker: JoinHandle<()>,
    },
    Done,
}

pub struct PipelineIterator {
    driver: Driver,
    stop: Arc<AtomicBool>,
    tree: ExecutionTree,
    manifest: RunManifest,
    rows_yielded: u64,
    finished_ms: Option<u64>,
}

impl PipelineIterator {
    pub fn start(plan: &LogicalPlan, cfg: &PipelineConfig) -> Result<Self, ExecError> {
        cfg.validate()
            .map_err(|e| ExecError::Invalid(e.to_string()))?;
        let tree = TreeCompiler::new(cfg).compile(plan)?;
        let plan_hash = hash_run(&tree, cfg)?;
        let root = Engine::new(cfg.clone()).build(&tree)?;
        let stop = Arc::new(AtomicBool::new(false));

        let driver = if cfg.prefetch_size == 0 {
            Driver::Inline(root)
        } else {
            let (tx, rx) = mpsc::sync_channel(cfg.prefetch_size);
            let flag = Arc::clone(&stop);
            let worker = thread::Builder::new()
                .name("dsflow-prefetch".into())
                .spawn(move || prefetch_loop(root, tx, flag))
                .map_err(|e| ExecError::Worker(format!("spawn prefetch worker: {}", e)))?;
            Driver::Prefetch { rx, worker }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            plan_hash = %plan_hash,
            nodes = tree.len(),
            prefetch = cfg.prefetch_size,
            "iterator started"
        );

        Ok(Self {
            driver,
            stop,
            tree,
            manifest: RunManifest::new(plan_hash, cfg.seed, now_millis()),
            rows_yielded: 0,
            finished_ms: None,
        })
    }

    /// Next row; an empty row means the stream has ended.
    pub fn get_next_row(&mut self) -> Result<Row, ExecError> {
        if self.stop.load(Ordering::Acquire) {
            self.shutdown();
            return Err(ExecError::Stopped);
        }
        let next = match &mut self.driver {
            Driver::Done => None,
            Driver::Inline(root) => root.next_row().transpose(),
            Driver::Prefetch { rx, .. } => rx.recv().ok(),
        };
        match next {
            Some(Ok(row)) => {
                self.rows_yielded += 1;
                Ok(row)
            }
            Some(Err(e)) => {
                self.shutdown();
                Err(e)
            }
            None => {
                // Channel closed: end of data, a stop from another thread, or
                // a worker that died.
                let joined = self.shutdown();
                if self.stop.load(Ordering::Acquire) {
                    return Err(ExecError::Stopped);
                }
                joined.map(|()| Row::new())
            }
        }
    }

    /// Stop the prefetch worker and release the runtime. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Err(_e) = self.shutdown() {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "prefetch worker failed during stop");
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn rows_yielded(&self) -> u64 {
        self.rows_yielded
    }

    /// The compiled tree this iterator runs.
    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    /// Manifest for the run so far (finished once the stream ends or stops).
    pub fn manifest(&self) -> RunManifest {
        let finished = self.finished_ms.unwrap_or_else(now_millis);
        self.manifest.clone().finish(finished, self.rows_yielded)
    }

    fn shutdown(&mut self) -> Result<(), ExecError> {
        let driver = std::mem::replace(&mut self.driver, Driver::Done);
        if matches!(driver, Driver::Done) {
            return Ok(());
        }
        self.finished_ms = Some(now_millis());
        match driver {
            Driver::Prefetch { rx, worker } => {
                drop(rx);
                worker
                    .join()
                    .map_err(|_| ExecError::Worker("prefetch worker panicked".into()))
            }
            Driver::Inline(_) | Driver::Done => Ok(()),
        }
    }
}

impl Iterator for PipelineIterator {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        match self.get_next_row() {
            Ok(row) if row.is_empty() => None,
            Ok(row) => Some(Ok(row)),
            Err(ExecError::Stopped) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for PipelineIterator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn prefetch_loop(mut root: Box<dyn RowStream>, tx: SyncSender<Item>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        crate::fail_point!("prefetch");
        let item = match root.next_row() {
            Ok(Some(row)) => Ok(row),
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let last = item.is_err();
        if !send_until_stopped(&tx, item, &stop) || last {
            break;
        }
    }
}

/// Push into the bounded channel, giving up when the consumer stops or goes
/// away. Returns whether the item was delivered.
fn send_until_stopped(tx: &SyncSender<Item>, mut item: Item, stop: &AtomicBool) -> bool {
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(back)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                item = back;
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
