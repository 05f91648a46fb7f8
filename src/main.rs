use anyhow::Context;
use mimalloc::MiMalloc;
use sarif_fingerprints::config::AppConfig;
use sarif_fingerprints::services::fingerprinting;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout may carry the annotated document, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sarif_fingerprints=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        input = %config.sarif_input.display(),
        source_root = %config.source_root.display(),
        "Fingerprinting results document"
    );

    let document = tokio::fs::read_to_string(&config.sarif_input)
        .await
        .with_context(|| format!("Failed to read {}", config.sarif_input.display()))?;

    let annotated = fingerprinting::add_fingerprints_concurrently(
        &document,
        &config.source_root,
        &config.fingerprint_options(),
    )
    .await?;

    match &config.sarif_output {
        Some(path) => tokio::fs::write(path, annotated)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{annotated}"),
    }

    Ok(())
}
