use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use gprops::dot::emit_dot;
use gprops::{Cluster, GraphProperties, InferenceOptions, Item, RecordedCluster, Registry, UnknownOpPolicy};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Emit {
    Table,
    Json,
    Dot,
}

#[derive(Parser, Debug)]
#[command(
    name = "gprops",
    version,
    about = "Infers the dtype and shape of every tensor in a dataflow graph"
)]
struct Cli {
    /// Input item (.json)
    item: PathBuf,

    /// Recorded execution trace; switches to dynamic inference
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Additional shape-rule manifest (repeatable)
    #[arg(short = 'R', long = "rules")]
    rules: Vec<PathBuf>,

    /// Maximum propagation passes
    #[arg(long, default_value_t = gprops::properties::DEFAULT_MAX_PASSES)]
    max_passes: usize,

    /// Fail on op kinds without a shape rule instead of reporting unknown
    #[arg(long)]
    strict: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Table)]
    emit: Emit,

    /// Only report these nodes (repeatable)
    #[arg(long = "node")]
    nodes: Vec<String>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ── Load rule registry ──
    let mut registry = Registry::standard();
    for path in &cli.rules {
        match registry.load_manifest(path) {
            Ok(n) => debug!(rules = n, path = %path.display(), "loaded rule manifest"),
            Err(e) => {
                eprintln!("gprops: error: {}", e);
                return ExitCode::from(2);
            }
        }
    }

    // ── Load item ──
    let item = match Item::load(&cli.item) {
        Ok(item) => item,
        Err(e) => {
            eprintln!("gprops: {}", e.to_diagnostic());
            return ExitCode::from(2);
        }
    };
    debug!(nodes = item.nodes.len(), id = %item.id, "loaded item");

    let mut cluster = match &cli.trace {
        Some(path) => match RecordedCluster::load(path) {
            Ok(cluster) => Some(cluster),
            Err(e) => {
                eprintln!("gprops: error: {}", e);
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let options = InferenceOptions {
        max_passes: cli.max_passes,
        unknown_ops: if cli.strict {
            UnknownOpPolicy::Reject
        } else {
            UnknownOpPolicy::Unknown
        },
    };
    let mut props = GraphProperties::with_options(&item, &registry, options);

    // ── Infer ──
    let result = match cluster.as_mut() {
        Some(cluster) => cluster
            .initialize(&item)
            .map_err(gprops::InferenceError::from)
            .and_then(|()| props.infer_dynamically(cluster)),
        None => props.infer_statically(),
    };
    if let Err(e) = result {
        eprintln!("gprops: {}", e.to_diagnostic());
        return ExitCode::from(1);
    }
    for diag in props.diagnostics() {
        eprintln!("gprops: {}", diag);
    }

    // ── Emit ──
    match cli.emit {
        Emit::Table => {
            for report in props.report(&cli.nodes) {
                println!("{} [{}]", report.name, report.op);
                for (i, p) in report.inputs.iter().enumerate() {
                    println!("  in  {}: {}", i, p);
                }
                for (i, p) in report.outputs.iter().enumerate() {
                    println!("  out {}: {}", i, p);
                }
            }
        }
        Emit::Json => match serde_json::to_string_pretty(&props.report(&cli.nodes)) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("gprops: error: {}", e);
                return ExitCode::from(1);
            }
        },
        Emit::Dot => print!("{}", emit_dot(&props)),
    }
    ExitCode::SUCCESS
}
