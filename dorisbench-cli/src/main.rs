mod app;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dorisbench")]
#[command(about = "Vector search benchmark for Apache Doris", long_about = None)]
struct Cli {
    /// Path to run configuration file
    #[arg(short, long, default_value = "dorisbench.yaml")]
    config: PathBuf,

    /// Skip configure and upload; search an existing table
    #[arg(long)]
    skip_upload: bool,

    /// Stop after upload
    #[arg(long)]
    skip_search: bool,

    /// Output format for the report
    #[arg(long, default_value = "json")]
    output: OutputFormat,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Load configuration
    let mut config = dorisbench_core::Config::from_file(&cli.config)?;
    config.benchmark.skip_upload |= cli.skip_upload;
    config.benchmark.skip_search |= cli.skip_search;
    tracing::debug!(
        config = %cli.config.display(),
        skip_upload = config.benchmark.skip_upload,
        skip_search = config.benchmark.skip_search,
        "Loaded configuration"
    );

    let base = cli.config.parent().unwrap_or(Path::new("."));

    let mut app = app::App::new(config);
    eprintln!("Loading dataset...");
    app.load_dataset(base)?;
    eprintln!(
        "Loaded {} records and {} queries",
        app.record_count(),
        app.query_count()
    );

    eprintln!("Running benchmark for {}...", app.engine_name());
    let report = app.run().await?;

    match cli.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            println!(
                "engine,dataset,parallel,top,upload_secs,total_upload_secs,rps,p50_ms,p95_ms,p99_ms,mean_precision"
            );
            let (upload, total) = report
                .upload
                .as_ref()
                .map(|u| (u.upload_time_secs, u.total_time_secs))
                .unwrap_or_default();
            for metrics in &report.search {
                println!(
                    "{},{},{},{},{:.3},{:.3},{:.2},{:.2},{:.2},{:.2},{}",
                    report.engine,
                    report.dataset,
                    metrics.parallel,
                    metrics.top,
                    upload,
                    total,
                    metrics.rps,
                    metrics.latency.p50_us as f64 / 1000.0,
                    metrics.latency.p95_us as f64 / 1000.0,
                    metrics.latency.p99_us as f64 / 1000.0,
                    metrics
                        .mean_precision
                        .map(|p| format!("{p:.4}"))
                        .unwrap_or_default(),
                );
            }
        }
    }

    Ok(())
}
