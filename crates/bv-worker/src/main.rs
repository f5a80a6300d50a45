//! Command-line analysis of a single video.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bv_models::{AnalysisConfig, JobState, ReferenceProduct, Sensitivity, VideoRef};
use bv_vision_client::DetectionClient;
use bv_worker::{AnalysisPipeline, JobManager, WorkerConfig};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SensitivityArg {
    Low,
    Medium,
    High,
}

impl From<SensitivityArg> for Sensitivity {
    fn from(arg: SensitivityArg) -> Self {
        match arg {
            SensitivityArg::Low => Sensitivity::Low,
            SensitivityArg::Medium => Sensitivity::Medium,
            SensitivityArg::High => Sensitivity::High,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bv-worker", about = "Detect reference products in a video")]
struct Cli {
    /// Local path or http(s) URL of the video
    video: String,

    /// JSON file with an array of reference products
    #[arg(short, long)]
    products: PathBuf,

    /// Frames sampled per second
    #[arg(short, long, default_value_t = 1.0)]
    rate: f64,

    #[arg(short, long, value_enum, default_value_t = SensitivityArg::Medium)]
    sensitivity: SensitivityArg,

    /// Report every matching sample instead of collapsing back-to-back repeats
    #[arg(long)]
    no_skip_similar: bool,

    /// Write the per-product CSV here in addition to the JSON report
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Seconds between progress lines
    #[arg(long, default_value_t = 5)]
    progress_interval: u64,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("bv_worker=info,bv_media=info,bv_vision_client=info,warn")
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}

fn load_products(path: &PathBuf) -> anyhow::Result<Vec<ReferenceProduct>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading products from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing products in {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let products = load_products(&cli.products)?;
    let config = AnalysisConfig {
        frame_rate: cli.rate,
        sensitivity: cli.sensitivity.into(),
        skip_similar: !cli.no_skip_similar,
    };

    let worker_config = WorkerConfig::from_env();
    info!("Worker config: {:?}", worker_config);

    let client = DetectionClient::from_env().context("building vision client")?;
    let manager = JobManager::with_ffmpeg(AnalysisPipeline::new(client, worker_config));

    let job_id = manager
        .create_job(VideoRef::new(cli.video.clone()), products, config)
        .await?;
    info!(job_id = %job_id, "Analyzing {}", cli.video);

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.progress_interval.max(1)));
    let status = loop {
        tokio::select! {
            status = manager.wait(&job_id) => break status?,
            _ = tokio::signal::ctrl_c() => {
                warn!("Received shutdown signal");
                manager.cancel_job(&job_id).await?;
            }
            _ = ticker.tick() => {
                let status = manager.get_status(&job_id).await?;
                info!(state = status.state.as_str(), "Progress {}%", status.progress_percent);
            }
        }
    };

    if status.state == JobState::Failed {
        let reason = status
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        anyhow::bail!("analysis failed: {}", reason);
    }

    let result = manager.get_result(&job_id).await?;
    if result.partial_data {
        warn!(
            dropped = result.frames_dropped,
            sampled = result.frames_sampled,
            "Report is partial"
        );
    }

    if let Some(path) = &cli.csv {
        std::fs::write(path, result.to_csv())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("CSV written to {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(result.as_ref())?);
    Ok(())
}
