//! SST pipeline runner
//!
//! Loads a pipeline configuration, reads raster documents from a data
//! directory and writes monthly, anomaly and heat-stress layers plus chart
//! series as JSON into an output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use sst_analysis::{
    AbortFlag, FilesystemRasterSource, JsonDirectorySink, Pipeline, PipelineConfig, PipelineReport,
};

/// SST climatology and bleaching-stress pipeline
#[derive(Parser, Debug)]
#[command(name = "sst-pipeline")]
#[command(about = "Monthly SST climatology, anomalies and bleaching heat stress")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/pipeline.yaml", env = "SST_CONFIG")]
    config: PathBuf,

    /// Directory holding one sub-directory of raster documents per collection
    #[arg(short, long, default_value = "data", env = "SST_DATA_DIR")]
    data_dir: PathBuf,

    /// Directory for layer and chart output
    #[arg(short, long, default_value = "output", env = "SST_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "SST_LOG_JSON")]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = run(args).await {
        error!(error = %format!("{:#}", e), "Pipeline failed");
        std::process::exit(1);
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = fmt().with_env_filter(filter).with_target(true).with_level(true);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)?;
    info!(
        config = %args.config.display(),
        period = %config.period,
        sources = config.sources.len(),
        "Loaded configuration"
    );

    let source = Arc::new(FilesystemRasterSource::new(&args.data_dir));
    let sink = Arc::new(JsonDirectorySink::new(&args.output_dir));
    let pipeline = Pipeline::new(config, source, sink).context("Invalid pipeline configuration")?;

    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    let abort = AbortFlag::new();
    let on_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_signal.abort();
        }
    });

    let output = pipeline
        .run(&abort)
        .await
        .context("Pipeline run failed")?;

    let report_path = write_report(&args.output_dir, &output.report)?;
    info!(
        report = %report_path.display(),
        months = output.report.months,
        threshold = output.report.threshold,
        "Pipeline finished"
    );

    Ok(())
}

/// Load the YAML configuration and apply environment overrides.
fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = PipelineConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(config.with_env_overrides())
}

fn write_report(output_dir: &Path, report: &PipelineReport) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join("report.json");
    let json = serde_json::to_vec_pretty(report).context("Failed to encode report")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
