#![forbid(unsafe_code)]
//! dsflow-planner: from a `Dataset` builder chain (or YAML) to an optimized
//! execution tree.
//!
//! Design:
//! - `logical` holds the builder-facing `LogicalPlan` and `Dataset`.
//! - `lower` turns a logical plan into an arena `ExecutionTree` with stable
//!   `OpId`s; parent/child links are index lists.
//! - `pass` defines the `TreePass` visitor contract; `passes` holds the
//!   built-in rewrites (no-op removal, step fusion, printing).
//! - `compiler` runs the registered passes to a fixed point.
//!
//! NOTE: No threads here; execution lives in `dsflow-exec`.

pub mod cardinality;
pub mod compiler;
pub mod dsl;
pub mod error;
pub mod explain;
pub mod logical;
pub mod lower;
pub mod pass;
pub mod passes;
pub mod tree;

pub use cardinality::estimate_rows;
pub use compiler::TreeCompiler;
pub use dsl::yaml::{parse_yaml_pipeline, ParsedPipeline};
pub use error::{PassError, PlanError};
pub use logical::{Dataset, LogicalPlan, MapOptions, MapStage};
pub use lower::{lower_to_tree, seed_random_steps};
pub use pass::{run_on_tree, Transformed, TreePass};
pub use tree::{ExecutionTree, Node, NodeId, OperatorKind};
