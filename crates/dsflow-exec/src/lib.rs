#![forbid(unsafe_code)]
//! dsflow-exec: runtime operators, the prefetching iterator, replay hashes
//! and metrics.
//!
//! The compiled execution tree is turned into a chain of pull-based runtime
//! operators. One prefetch thread drives the chain and feeds a bounded
//! channel; map operators fan rows out to scoped worker threads in chunks and
//! reassemble them in order.

pub mod failpoints;
pub mod iterator;
pub mod metrics;
pub mod replay;
pub mod runtime;

pub use iterator::{CreateIterator, PipelineIterator, StopHandle};
pub use runtime::{Engine, ExecError, RowStream};
