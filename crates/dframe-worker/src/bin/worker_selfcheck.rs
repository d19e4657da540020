use dframe_media::{check_ffmpeg, check_ffprobe};
use dframe_queue::RedisResultStore;
use dframe_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with uploads={} outputs={}",
        config.layout.uploads_root.display(),
        config.layout.outputs_root.display()
    );
    config.layout.ensure_roots().await?;

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!("worker-selfcheck: ffmpeg={} ffprobe={}", ffmpeg.display(), ffprobe.display());

    ensure_env_present(&["REDIS_URL"])?;
    if std::env::var("SELFCHECK_SKIP_REDIS").is_err() {
        RedisResultStore::from_env()?.ping().await?;
        println!("worker-selfcheck: redis reachable");
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
