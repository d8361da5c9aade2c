use std::path::PathBuf;

use anyhow::Context;
use code_extractor::{CancelToken, ExtractConfig, ExtractionDispatcher, extract_repository};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment is used as is.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,code_extractor=info"))
        .context("invalid log filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(ai_llm_service::telemetry::exclude_this_crate()),
        )
        .with(ai_llm_service::telemetry::layer())
        .try_init()
        .context("setting default subscriber failed")?;

    let root = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REPO_PATH").ok())
        .map(PathBuf::from)
        .context("usage: docpilot-backend <repo-path> (or set REPO_PATH)")?;

    let cfg = ExtractConfig::from_env()?;
    let dispatcher = ExtractionDispatcher::from_env(cfg);

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, finishing in-flight files");
            on_ctrl_c.cancel();
        }
    });

    let batch = extract_repository(&dispatcher, &root, &cancel).await?;
    info!(
        root = %root.display(),
        records = batch.total_files,
        skipped = batch.skipped_files,
        "extraction finished"
    );

    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}
