use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zslice::{load_base_dataset, LookupRegistry, QueryContext, SliceConfig, WidgetSnapshot};

/// Run one dashboard snapshot against a sale-records parquet file and print
/// the result bundle as JSON.
#[derive(Debug, Parser)]
#[command(name = "zslice", version)]
struct Args {
    /// Parquet file with the sale records
    #[arg(long)]
    data: PathBuf,

    /// Widget snapshot (JSON, tagged with "tab")
    #[arg(long)]
    snapshot: PathBuf,

    /// Lookup tables for categorical columns (JSON)
    #[arg(long)]
    lookups: Option<PathBuf>,

    /// Pipeline configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repeat the request and report timings
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => SliceConfig::from_json_file(path)?,
        None => SliceConfig::default(),
    };
    let lookups = match &args.lookups {
        Some(path) => LookupRegistry::from_json_file(path)?,
        None => LookupRegistry::default(),
    };
    let snapshot: WidgetSnapshot = serde_json::from_reader(std::fs::File::open(&args.snapshot)?)?;

    let start = Instant::now();
    let dataset = load_base_dataset(&args.data, None)?;
    info!(
        rows = dataset.num_rows(),
        ms = start.elapsed().as_secs_f64() * 1000.0,
        "dataset loaded"
    );

    let context = QueryContext::new(Arc::new(dataset), Arc::new(lookups), config)?;

    let runs = args.runs.max(1);
    let mut times = Vec::with_capacity(runs);
    let mut bundle = None;
    for _ in 0..runs {
        let start = Instant::now();
        bundle = Some(context.handle(&snapshot)?);
        times.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    if let Some(bundle) = bundle {
        let json = if args.compact {
            serde_json::to_string(&bundle)?
        } else {
            serde_json::to_string_pretty(&bundle)?
        };
        println!("{json}");
    }

    if runs > 1 {
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        let variance = times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        eprintln!("Performance ({runs} runs):");
        eprintln!("{:-<40}", "");
        eprintln!("  Mean:   {mean:.2} ms");
        eprintln!("  Stddev: {:.2} ms", variance.sqrt());
        eprintln!("  Min:    {min:.2} ms");
        eprintln!("  Max:    {max:.2} ms");
    }
    Ok(())
}
