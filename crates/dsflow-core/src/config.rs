//! Pipeline configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Optional seed for shuffles, random samplers and random transforms.
    pub seed: Option<u64>,

    /// Rows buffered between the prefetch worker and the consumer. Zero runs
    /// the tree on the caller's thread.
    pub prefetch_size: usize,

    /// Worker threads per map operator (1 = inline).
    pub num_parallel_workers: usize,

    /// Rows handed to each map worker per round.
    pub worker_chunk_rows: usize,

    /// Register the step fusion pass in the compiler.
    pub enable_op_fusion: bool,

    /// Upper bound on full pass-sequence rounds while searching a fixed point.
    pub max_optimizer_rounds: usize,

    /// Register the printer pass (logs the compiled tree).
    pub print_tree: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            prefetch_size: 16,
            num_parallel_workers: 4,
            worker_chunk_rows: 8,
            enable_op_fusion: true,
            max_optimizer_rounds: 4,
            print_tree: false,
        }
    }
}

impl PipelineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `DSFLOW_SEED`: random seed
    /// - `DSFLOW_PREFETCH_SIZE`: rows buffered ahead of the consumer
    /// - `DSFLOW_NUM_PARALLEL_WORKERS`: map worker threads
    /// - `DSFLOW_WORKER_CHUNK_ROWS`: rows per map worker round
    /// - `DSFLOW_ENABLE_OP_FUSION`: `true`/`false`
    /// - `DSFLOW_MAX_OPTIMIZER_ROUNDS`: optimizer round cap
    /// - `DSFLOW_PRINT_TREE`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("DSFLOW_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_PREFETCH_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.prefetch_size = v;
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_NUM_PARALLEL_WORKERS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.num_parallel_workers = v;
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_WORKER_CHUNK_ROWS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.worker_chunk_rows = v;
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_ENABLE_OP_FUSION") {
            if let Some(v) = parse_flag(&s) {
                cfg.enable_op_fusion = v;
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_MAX_OPTIMIZER_ROUNDS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_optimizer_rounds = v;
            }
        }

        if let Ok(s) = std::env::var("DSFLOW_PRINT_TREE") {
            if let Some(v) = parse_flag(&s) {
                cfg.print_tree = v;
            }
        }

        cfg
    }

    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.num_parallel_workers == 0 {
            return Err(Error::Config("num_parallel_workers must be >= 1".into()));
        }
        if self.worker_chunk_rows == 0 {
            return Err(Error::Config("worker_chunk_rows must be >= 1".into()));
        }
        if self.max_optimizer_rounds == 0 {
            return Err(Error::Config("max_optimizer_rounds must be >= 1".into()));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = PipelineConfig {
            num_parallel_workers: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn flags_parse_loosely() {
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.prefetch_size, 16);
    }
}
