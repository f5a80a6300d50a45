use std::process::Command;

use bv_vision_client::DetectionClient;
use bv_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with max_jobs={} max_inflight={}",
        config.max_concurrent_jobs, config.max_inflight_detections
    );
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;
    ensure_vision_service().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_tool(name: &str) -> anyhow::Result<()> {
    let path = which::which(name).map_err(|e| anyhow::anyhow!("{} not found in PATH: {}", name, e))?;

    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            name,
            output.status
        ));
    }
    Ok(())
}

async fn ensure_vision_service() -> anyhow::Result<()> {
    let client = DetectionClient::from_env()?;
    let url = client.config().base_url.clone();

    match client.health_check().await {
        Ok(true) => Ok(()),
        Ok(false) => Err(anyhow::anyhow!("vision service at {} reports unhealthy", url)),
        Err(e) => Err(anyhow::anyhow!("vision service at {} unreachable: {}", url, e)),
    }
}
