// --- File: src/main.rs ---

//! Command-line entry point: replays recorded batches through a metric
//! recorder, epoch by epoch.

use clap::{Args, Parser, Subcommand, ValueEnum};
use mml_metrics::config::MetricConfig;
use mml_metrics::metrics::Direction;
use mml_metrics::recorder::MetricRecorder;
use mml_metrics::registry::MetricRegistry;
use mml_metrics::replay::{replay, ReplayInput, ReplayOptions};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "mml-metrics: epoch-scoped metric recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every registered metric identifier
    List,
    /// Evaluate recorded batches with a metric config
    Evaluate(EvaluateArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Min,
    Max,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Metric YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Batches JSON file
    #[arg(short, long)]
    input: PathBuf,

    /// Prefix for sink tags (e.g. `val`)
    #[arg(long)]
    split: Option<String>,

    /// Write scalars to this directory instead of the config's sink directory
    #[arg(long)]
    sink_dir: Option<PathBuf>,

    /// Only forward keys matching these patterns (needs a sink)
    #[arg(long = "record-only")]
    record_only: Vec<String>,

    /// Result key to watch for early stopping
    #[arg(long)]
    monitor: Option<String>,

    /// Direction of the monitored key; derived from its metric when omitted
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    #[arg(long, default_value_t = 3)]
    patience: usize,

    /// Print one JSON object per epoch instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Command::List => {
            let registry = MetricRegistry::with_builtins();
            for id in registry.identifiers() {
                match registry.alias_target(id) {
                    Some(target) => println!("{} -> {}", id, target),
                    None => println!("{}", id),
                }
            }
            Ok(())
        }
        Command::Evaluate(args) => evaluate(args),
    }
}

fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    // ---------- 1. Configuration ----------
    let mut config = MetricConfig::from_yaml_file(&args.config)?;
    config.override_sink(args.sink_dir.clone(), args.record_only.clone())?;

    let name = args.split.as_deref().unwrap_or("eval");
    let mut recorder =
        MetricRecorder::new(config, &MetricRegistry::with_builtins())?.with_name(name);
    info!("{}", recorder);

    // ---------- 2. Input ----------
    let input = ReplayInput::from_file(&args.input)?;
    info!(epochs = input.epochs.len(), "Loaded recorded batches");

    let options = ReplayOptions {
        metric_group: args.split.clone(),
        monitor: args.monitor.clone(),
        direction: args.mode.map(|m| match m {
            Mode::Min => Direction::Min,
            Mode::Max => Direction::Max,
        }),
        patience: args.patience,
    };

    // ---------- 3. Epoch loop ----------
    let json = args.json;
    let outcome = replay(&mut recorder, input, &options, |epoch, results| {
        if json {
            let line = serde_json::json!({ "epoch": epoch, "results": results });
            println!("{}", line);
        } else {
            println!("epoch {:>3} | {}", epoch, results);
        }
    })?;

    // ---------- 4. Summary ----------
    if let Some(epoch) = outcome.stopped_at {
        info!(epoch, "Stopped early");
    }
    if !json {
        println!("{}", outcome.history.format_summary());
    }
    Ok(())
}
