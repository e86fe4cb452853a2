use std::{fs::File, io::BufWriter, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zk_logreg::{
    circuits::CircuitConfig,
    model::{load_dataset, load_model},
    pipeline::{AccuracyReport, Pipeline, PipelineConfig},
    simulation::Simulation,
};

/// Zero-knowledge proofs that a logistic-regression model classifies a
/// dataset correctly and meets an accuracy threshold.
#[derive(Parser, Debug)]
#[command(name = "zklr", author, version, about, long_about = None)]
struct Args {
    /// Run the narrated network simulation instead of generating proofs
    #[arg(long)]
    animated: bool,
    /// Simulated per-message latency for --animated
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,
    /// `feature,label` CSV with a header row
    #[arg(long, default_value = "data/student_dataset_test.csv")]
    dataset: PathBuf,
    /// File with `W: <float>` and `B: <float>` lines
    #[arg(long, default_value = "data/best_model_parameters.txt")]
    model: PathBuf,
    /// Directory for compiled circuit caches
    #[arg(long, default_value = "data")]
    cache_dir: PathBuf,
    /// Always compile and set up circuits from scratch
    #[arg(long)]
    no_cache: bool,
    /// Proving threads (default: available parallelism)
    #[arg(long)]
    threads: Option<usize>,
    /// Skip remaining work once this many seconds have passed
    #[arg(long)]
    deadline_secs: Option<u64>,
    /// Write the full report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn print_summary(report: &AccuracyReport) {
    let tally = &report.tally;
    println!("Per-sample proofs: {} samples", tally.total);
    println!("  verified:             {}", tally.verified);
    println!("  prediction mismatch:  {}", tally.mismatched);
    println!("  failed:               {}", tally.failed);
    println!("  verification failed:  {}", tally.verification_failed);
    println!("  skipped (deadline):   {}", tally.skipped);
    println!("Chunks:");
    for chunk in &report.chunks {
        println!(
            "  #{} (from sample {}): {} correct, {:?}",
            chunk.index + 1,
            chunk.first_sample + 1,
            chunk.count,
            chunk.status
        );
    }
    println!(
        "Accuracy: {}/{} ({:.1}%), threshold {}: {}",
        report.total_correct,
        report.evaluated_samples,
        100.0 * report.total_correct as f64 / report.evaluated_samples.max(1) as f64,
        report.threshold,
        if report.threshold_met { "met" } else { "not met" }
    );
    println!(
        "Aggregate proof: {}",
        if report.claim_verified {
            "verified"
        } else {
            "not produced"
        }
    );
    for stats in &report.circuits {
        println!(
            "  {}: {} constraints{}",
            stats.circuit,
            stats.num_constraints,
            if stats.from_cache { " (cached)" } else { "" }
        );
    }
    println!("Elapsed: {:.2}s", report.elapsed_ms as f64 / 1000.0);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let circuit = CircuitConfig::default();
    let samples = load_dataset(&args.dataset, &circuit.precision)
        .with_context(|| format!("loading dataset {}", args.dataset.display()))?;
    let model = load_model(&args.model)
        .with_context(|| format!("loading model {}", args.model.display()))?;

    if args.animated {
        Simulation {
            config: circuit,
            model,
            samples: &samples,
            latency: Duration::from_millis(args.latency_ms),
        }
        .run();
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        circuit,
        cache_dir: (!args.no_cache).then(|| args.cache_dir.clone()),
        threads: args.threads,
        deadline: args.deadline_secs.map(Duration::from_secs),
    })?;
    let report = pipeline.run(&model, &samples)?;
    print_summary(&report);

    if let Some(path) = &args.report {
        let file =
            File::create(path).with_context(|| format!("creating report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    Ok(())
}
