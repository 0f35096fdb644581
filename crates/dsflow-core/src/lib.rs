#![forbid(unsafe_code)]
//! dsflow-core: shared vocabulary for the dsflow pipeline engine.
//!
//! Everything here is plain data: tensors, rows, ids, configuration, errors,
//! stable hashing and the run manifest. No threads and no operator logic live
//! in this crate so every other crate can depend on it cheaply.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod row;
pub mod tensor;

pub use error::{Error, Result};

/// Engine version recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
