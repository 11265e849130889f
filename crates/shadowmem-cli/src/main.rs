//! shadowmem CLI: estimate peak accelerator memory without running anything.

mod workload;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use shadowmem_core::config::TrackerConfig;
use shadowmem_core::dtype::DType;
use shadowmem_exec::{ShadowContext, TrackingSession};
use tracing_subscriber::EnvFilter;

use workload::{run_training, MlpSpec, OptimizerKind};

#[derive(Parser)]
#[command(name = "shadowmem")]
#[command(about = "Estimate the peak memory of a training step by shadow execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo MLP training workload under tracking and print its peak
    Estimate {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        tracker: TrackerArgs,

        /// Print the session report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the largest batch size whose peak fits in a byte budget
    Sweep {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        tracker: TrackerArgs,

        /// Memory budget in bytes
        #[arg(long)]
        budget: usize,

        /// Largest batch size to consider
        #[arg(long, default_value_t = 65_536)]
        max_batch: usize,
    },
}

#[derive(Args, Clone)]
struct ModelArgs {
    /// Batch size
    #[arg(long, default_value_t = 256)]
    batch: usize,

    /// Input features
    #[arg(long, default_value_t = 784)]
    input: usize,

    /// Hidden layer widths, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = [1024usize, 1024])]
    hidden: Vec<usize>,

    /// Output width
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// Element type for parameters and activations (defaults to the config's)
    #[arg(long)]
    dtype: Option<DType>,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,

    /// Training steps to run (optimizer state appears on the first)
    #[arg(long, default_value_t = 1)]
    steps: usize,
}

#[derive(Args, Clone)]
struct TrackerArgs {
    /// JSON tracker config; env and defaults fill the rest
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allocator block size in bytes (overrides config)
    #[arg(long)]
    align: Option<usize>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Estimate {
            model,
            tracker,
            json,
        } => estimate(&model, &tracker, json),
        Commands::Sweep {
            model,
            tracker,
            budget,
            max_batch,
        } => sweep(&model, &tracker, budget, max_batch),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &TrackerArgs) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => TrackerConfig::from_env(),
    };
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(TrackerConfig::from_json_str(&text)?)
}

fn apply_overrides(config: &mut TrackerConfig, args: &TrackerArgs) {
    if let Some(align) = args.align {
        config.align_bytes = align;
    }
}

fn mlp_spec(model: &ModelArgs, config: &TrackerConfig, batch: usize) -> MlpSpec {
    MlpSpec {
        batch,
        input: model.input,
        hidden: model.hidden.clone(),
        classes: model.classes,
        dtype: model.dtype.unwrap_or(config.default_dtype),
        optimizer: model.optimizer,
        steps: model.steps,
    }
}

/// Peak bytes of one tracked training run at `batch`.
fn measure(
    model: &ModelArgs,
    config: &TrackerConfig,
    batch: usize,
) -> Result<(TrackingSession, usize), Box<dyn std::error::Error>> {
    let spec = mlp_spec(model, config, batch);
    let session = TrackingSession::new(config.clone())?;
    let ctx = ShadowContext::from_config(config);
    let summary = session.run(&ctx, |ctx| run_training(ctx, &spec))?;
    tracing::info!(
        batch,
        parameters = summary.parameters,
        steps = summary.steps,
        peak_bytes = session.peak_bytes(),
        "workload finished"
    );
    Ok((session, summary.parameters))
}

fn estimate(
    model: &ModelArgs,
    tracker: &TrackerArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(tracker)?;
    let (session, parameters) = measure(model, &config, model.batch)?;
    let report = session.report();

    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!("Peak memory estimate");
    println!("====================");
    println!("  Batch:        {}", model.batch);
    println!("  Parameters:   {}", parameters);
    println!("  Ops observed: {}", report.ops_observed);
    println!("  Alignment:    {} bytes", report.align_bytes);
    println!("  Peak:         {}", human_bytes(report.peak_bytes));
    if report.failures > 0 {
        println!("  Unaccounted:  {} buffer(s)", report.failures);
        for d in &report.diagnostics {
            println!("    - {}", d);
        }
    }
    Ok(())
}

fn sweep(
    model: &ModelArgs,
    tracker: &TrackerArgs,
    budget: usize,
    max_batch: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_batch == 0 {
        return Err("--max-batch must be at least 1".into());
    }
    let config = load_config(tracker)?;
    let peak_at = |batch: usize| -> Result<usize, Box<dyn std::error::Error>> {
        Ok(measure(model, &config, batch)?.0.peak_bytes())
    };

    match largest_fitting(budget, max_batch, peak_at)? {
        Some((batch, peak)) => {
            println!("Largest batch within {}: {}", human_bytes(budget), batch);
            println!("  Peak at that batch: {}", human_bytes(peak));
        }
        None => {
            println!("Even batch 1 exceeds {}", human_bytes(budget));
        }
    }
    Ok(())
}

/// Binary search for the largest batch in `1..=max_batch` whose peak fits.
/// Assumes the peak does not shrink as the batch grows.
fn largest_fitting<F, E>(
    budget: usize,
    max_batch: usize,
    mut peak_at: F,
) -> Result<Option<(usize, usize)>, E>
where
    F: FnMut(usize) -> Result<usize, E>,
{
    let (mut lo, mut hi) = (1usize, max_batch);
    let mut best = None;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        let peak = peak_at(mid)?;
        if peak <= budget {
            best = Some((mid, peak));
            lo = mid + 1;
        } else if mid == 1 {
            break;
        } else {
            hi = mid - 1;
        }
    }
    Ok(best)
}

fn human_bytes(bytes: usize) -> String {
    format!("{} bytes ({:.2} MB)", bytes, bytes as f64 / 1_048_576.0)
}
