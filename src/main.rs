use debridarr::{Bridge, Config, run_with_shutdown};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!(
        descriptor_root = %config.paths.descriptor_root.display(),
        download_root = %config.paths.download_root.display(),
        arrival_root = %config.paths.arrival_root.display(),
        categories = ?config.catalogs.enabled_categories(),
        "starting debridarr"
    );

    let bridge = Bridge::new(config).await?;
    bridge.start().await?;
    run_with_shutdown(bridge).await?;

    Ok(())
}
