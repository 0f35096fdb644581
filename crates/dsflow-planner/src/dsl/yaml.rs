//! YAML -> `Dataset` parser for linear pipelines.
//!
//! Example:
//! ```yaml
//! config:
//!   seed: 7
//!   enable_op_fusion: true
//! steps:
//!   - op: source
//!     source: { kind: synthetic_mnist, num_rows: 20 }
//!     sampler: { kind: random, num_samples: 10 }
//!   - op: map
//!     operations:
//!       - { op: resize, height: 32, width: 32 }
//!       - { op: center_crop, height: 24, width: 24 }
//!   - op: batch
//!     batch_size: 2
//! ```
//!
//! The first step must be the only `source`; every later step wraps the
//! pipeline built so far, exactly like the `Dataset` builder calls.

use serde::{Deserialize, Serialize};

use dsflow_core::config::PipelineConfig;
use dsflow_operators::{Sampler, SourceSpec, Transform, TransformSpec};

use crate::error::PlanError;
use crate::logical::{Dataset, MapOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pipeline {
    #[serde(default)]
    pub config: Option<ConfigOverrides>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Source {
        source: SourceSpec,
        #[serde(default)]
        sampler: Sampler,
    },
    Map {
        operations: Vec<TransformSpec>,
        #[serde(default)]
        input_columns: Vec<String>,
        #[serde(default)]
        output_columns: Vec<String>,
        #[serde(default)]
        project_columns: Vec<String>,
        #[serde(default)]
        num_parallel_workers: Option<usize>,
    },
    Shuffle {
        buffer_size: usize,
    },
    Batch {
        batch_size: usize,
        #[serde(default)]
        drop_remainder: bool,
    },
    /// Omitting `count` repeats forever.
    Repeat {
        #[serde(default)]
        count: Option<u32>,
    },
    Project {
        columns: Vec<String>,
    },
    Rename {
        from: Vec<String>,
        to: Vec<String>,
    },
    Take {
        count: usize,
    },
    Skip {
        count: usize,
    },
}

/// Settings a pipeline file may override. Absent keys keep whatever the
/// caller already resolved (defaults, then environment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub seed: Option<u64>,
    pub prefetch_size: Option<usize>,
    pub num_parallel_workers: Option<usize>,
    pub worker_chunk_rows: Option<usize>,
    pub enable_op_fusion: Option<bool>,
    pub max_optimizer_rounds: Option<usize>,
    pub print_tree: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(v) = self.seed {
            cfg.seed = Some(v);
        }
        if let Some(v) = self.prefetch_size {
            cfg.prefetch_size = v;
        }
        if let Some(v) = self.num_parallel_workers {
            cfg.num_parallel_workers = v;
        }
        if let Some(v) = self.worker_chunk_rows {
            cfg.worker_chunk_rows = v;
        }
        if let Some(v) = self.enable_op_fusion {
            cfg.enable_op_fusion = v;
        }
        if let Some(v) = self.max_optimizer_rounds {
            cfg.max_optimizer_rounds = v;
        }
        if let Some(v) = self.print_tree {
            cfg.print_tree = v;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPipeline {
    pub dataset: Dataset,
    pub config: ConfigOverrides,
}

impl ParsedPipeline {
    /// `base` with this file's overrides applied.
    pub fn resolve_config(&self, base: &PipelineConfig) -> PipelineConfig {
        let mut cfg = base.clone();
        self.config.apply(&mut cfg);
        cfg
    }
}

pub fn parse_yaml_pipeline(yaml_src: &str) -> Result<ParsedPipeline, PlanError> {
    let doc: Pipeline = serde_yaml::from_str(yaml_src)?;
    let mut cur: Option<Dataset> = None;

    for (i, step) in doc.steps.into_iter().enumerate() {
        cur = Some(match (step, cur) {
            (Step::Source { source, sampler }, None) => Dataset::source(source, sampler)?,
            (Step::Source { .. }, Some(_)) => {
                return Err(PlanError::Dsl(format!(
                    "step {}: only the first step may be a source",
                    i
                )))
            }
            (other, None) => {
                return Err(PlanError::Dsl(format!(
                    "step {}: pipeline must start with a source, found {}",
                    i,
                    step_name(&other)
                )))
            }
            (
                Step::Map {
                    operations,
                    input_columns,
                    output_columns,
                    project_columns,
                    num_parallel_workers,
                },
                Some(ds),
            ) => {
                let mut options =
                    MapOptions::new(operations.into_iter().map(Transform::from).collect())
                        .input_columns(&input_columns)
                        .output_columns(&output_columns)
                        .project_columns(&project_columns);
                options.num_parallel_workers = num_parallel_workers;
                ds.map_with(options)?
            }
            (Step::Shuffle { buffer_size }, Some(ds)) => ds.shuffle(buffer_size)?,
            (
                Step::Batch {
                    batch_size,
                    drop_remainder,
                },
                Some(ds),
            ) => ds.batch_with(batch_size, drop_remainder)?,
            (Step::Repeat { count: Some(n) }, Some(ds)) => ds.repeat(n)?,
            (Step::Repeat { count: None }, Some(ds)) => ds.repeat_forever()?,
            (Step::Project { columns }, Some(ds)) => ds.project(&columns)?,
            (Step::Rename { from, to }, Some(ds)) => ds.rename(&from, &to)?,
            (Step::Take { count }, Some(ds)) => ds.take(count)?,
            (Step::Skip { count }, Some(ds)) => ds.skip(count)?,
        });
    }

    let dataset = cur.ok_or_else(|| PlanError::Dsl("pipeline has no steps".into()))?;
    Ok(ParsedPipeline {
        dataset,
        config: doc.config.unwrap_or_default(),
    })
}

fn step_name(step: &Step) -> &'static str {
    match step {
        Step::Source { .. } => "source",
        Step::Map { .. } => "map",
        Step::Shuffle { .. } => "shuffle",
        Step::Batch { .. } => "batch",
        Step::Repeat { .. } => "repeat",
        Step::Project { .. } => "project",
        Step::Rename { .. } => "rename",
        Step::Take { .. } => "take",
        Step::Skip { .. } => "skip",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::LogicalPlan;

    const BASIC: &str = r#"
config:
  seed: 7
  enable_op_fusion: false
steps:
  - op: source
    source: { kind: synthetic_mnist, num_rows: 20 }
    sampler: { kind: random, num_samples: 10 }
  - op: map
    operations:
      - { op: resize, height: 32, width: 32 }
      - { op: center_crop, height: 24, width: 24 }
  - op: repeat
    count: 2
  - op: batch
    batch_size: 4
    drop_remainder: true
"#;

    #[test]
    fn parses_linear_pipeline() {
        let parsed = parse_yaml_pipeline(BASIC).unwrap();
        assert_eq!(parsed.dataset.dataset_size(), Some(5));
        assert_eq!(parsed.dataset.plan().depth(), 4);
        match parsed.dataset.plan() {
            LogicalPlan::Batch {
                batch_size,
                drop_remainder,
                ..
            } => {
                assert_eq!(*batch_size, 4);
                assert!(*drop_remainder);
            }
            other => panic!("unexpected root {}", other.name()),
        }

        let cfg = parsed.resolve_config(&PipelineConfig::default());
        assert_eq!(cfg.seed, Some(7));
        assert!(!cfg.enable_op_fusion);
        assert_eq!(cfg.prefetch_size, PipelineConfig::default().prefetch_size);
    }

    #[test]
    fn default_sampler_and_forever_repeat() {
        let src = r#"
steps:
  - op: source
    source: { kind: synthetic_mnist, num_rows: 3 }
  - op: repeat
  - op: take
    count: 7
"#;
        let parsed = parse_yaml_pipeline(src).unwrap();
        assert_eq!(parsed.dataset.dataset_size(), Some(7));
        assert_eq!(parsed.config, ConfigOverrides::default());
    }

    #[test]
    fn map_columns_and_rename() {
        let src = r#"
steps:
  - op: source
    source: { kind: synthetic_mnist, num_rows: 4 }
  - op: map
    operations: [ { op: type_cast, dtype: Float32 } ]
    input_columns: [image]
    output_columns: [pixels]
  - op: rename
    from: [pixels, label]
    to: [label, pixels]
"#;
        let parsed = parse_yaml_pipeline(src).unwrap();
        assert_eq!(
            parsed.dataset.column_names().unwrap(),
            vec!["label".to_string(), "pixels".to_string()]
        );
    }

    #[test]
    fn source_must_come_first_and_only_once() {
        let late = r#"
steps:
  - op: batch
    batch_size: 2
"#;
        assert!(matches!(
            parse_yaml_pipeline(late).unwrap_err(),
            PlanError::Dsl(_)
        ));

        let twice = r#"
steps:
  - op: source
    source: { kind: synthetic_mnist, num_rows: 2 }
  - op: source
    source: { kind: synthetic_mnist, num_rows: 2 }
"#;
        assert!(matches!(
            parse_yaml_pipeline(twice).unwrap_err(),
            PlanError::Dsl(_)
        ));

        assert!(matches!(
            parse_yaml_pipeline("steps: []").unwrap_err(),
            PlanError::Dsl(_)
        ));
    }

    #[test]
    fn builder_validation_surfaces() {
        let src = r#"
steps:
  - op: source
    source: { kind: synthetic_mnist, num_rows: 2 }
  - op: batch
    batch_size: 0
"#;
        assert!(matches!(
            parse_yaml_pipeline(src).unwrap_err(),
            PlanError::InvalidArgument(_)
        ));
    }

    #[test]
    fn malformed_yaml_is_a_dsl_error() {
        let err = parse_yaml_pipeline("steps: [ { op: teleport } ]").unwrap_err();
        assert!(matches!(err, PlanError::Dsl(_)));
    }
}
