//! dsflow CLI: run, validate and explain YAML pipelines.
//!
//! Config precedence: defaults < `DSFLOW_*` environment < the pipeline's
//! `config` block < command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dsflow_core::config::PipelineConfig;
use dsflow_exec::CreateIterator;
use dsflow_planner::{explain, parse_yaml_pipeline, ParsedPipeline, TreeCompiler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsflow")]
#[command(about = "dsflow: dataset pipelines with an optimizing execution-tree compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline from a YAML file
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// Print every row's column shapes
        #[arg(long)]
        show_rows: bool,

        /// Stop after this many rows
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Validate a pipeline YAML file (parse and compile)
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show the compiled execution tree (EXPLAIN)
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags that override the resolved config.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Rows buffered ahead of the consumer (0 = no prefetch thread)
    #[arg(long)]
    prefetch_size: Option<usize>,

    /// Worker threads per map operator
    #[arg(long)]
    num_parallel_workers: Option<usize>,

    /// Disable the step fusion pass
    #[arg(long)]
    no_fusion: bool,

    /// Log the compiled tree from the printer pass
    #[arg(long)]
    print_tree: bool,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            overrides,
            show_rows,
            limit,
        } => {
            if let Err(e) = run_pipeline(&pipeline, &overrides, show_rows, limit) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { pipeline } => {
            if let Err(e) = validate_pipeline(&pipeline) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Pipeline is valid");
        }
        Commands::Explain {
            pipeline,
            overrides,
        } => {
            if let Err(e) = explain_pipeline(&pipeline, &overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load(path: &Path) -> Result<ParsedPipeline, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    Ok(parse_yaml_pipeline(&yaml_content)?)
}

fn resolve_config(parsed: &ParsedPipeline, base: PipelineConfig, flags: &Overrides) -> PipelineConfig {
    let mut cfg = parsed.resolve_config(&base);
    if let Some(seed) = flags.seed {
        cfg.seed = Some(seed);
    }
    if let Some(n) = flags.prefetch_size {
        cfg.prefetch_size = n;
    }
    if let Some(n) = flags.num_parallel_workers {
        cfg.num_parallel_workers = n;
    }
    if flags.no_fusion {
        cfg.enable_op_fusion = false;
    }
    if flags.print_tree {
        cfg.print_tree = true;
    }
    cfg
}

fn run_pipeline(
    pipeline_path: &Path,
    flags: &Overrides,
    show_rows: bool,
    limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load(pipeline_path)?;
    let cfg = resolve_config(&parsed, PipelineConfig::from_env(), flags);

    let mut iter = parsed.dataset.create_iterator_with(&cfg)?;
    loop {
        if limit.is_some_and(|l| iter.rows_yielded() >= l) {
            break;
        }
        let row = iter.get_next_row()?;
        if row.is_empty() {
            break;
        }
        if show_rows {
            let cols: Vec<String> = row
                .iter()
                .map(|(name, t)| format!("{}{:?}", name, t.shape()))
                .collect();
            println!("row {}: {}", iter.rows_yielded(), cols.join(" "));
        }
    }
    iter.stop();
    let manifest = iter.manifest();

    println!("✓ Pipeline executed successfully");
    println!("  Rows: {}", manifest.rows_yielded);
    println!(
        "  Duration: {}ms",
        manifest.finished_ms.saturating_sub(manifest.started_ms)
    );
    println!("  Plan hash: {}", manifest.plan_hash);
    tracing::debug!(manifest = %serde_json::to_string(&manifest)?, "run manifest");

    Ok(())
}

fn validate_pipeline(pipeline_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load(pipeline_path)?;
    let cfg = parsed.resolve_config(&PipelineConfig::from_env());
    cfg.validate()?;
    TreeCompiler::new(&cfg).compile(parsed.dataset.plan())?;
    Ok(())
}

fn explain_pipeline(
    pipeline_path: &Path,
    flags: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load(pipeline_path)?;
    let cfg = resolve_config(&parsed, PipelineConfig::from_env(), flags);
    let mut compiler = TreeCompiler::new(&cfg);
    let tree = compiler.compile(parsed.dataset.plan())?;

    println!("Pipeline Execution Tree");
    println!("=======================");
    println!();
    println!("Passes: {}", compiler.pass_names().join(", "));
    println!("Columns: {}", parsed.dataset.column_names()?.join(", "));
    match parsed.dataset.dataset_size() {
        Some(n) => println!("Rows per run: {}", n),
        None => println!("Rows per run: unbounded"),
    }
    println!("Fingerprint: {}", explain::fingerprint(&tree)?);
    println!();
    print!("{}", explain::render(&tree)?);

    Ok(())
}
