use anyhow::Result;
use tracing::{info, metadata::LevelFilter, warn};
use vocal_resources::{
    core::{Environment, RemoteCatalog, CONFIG_FILE},
    ResourceManager,
};

fn setup_logging() {
    let filter = std::env::var("VOCAL_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    setup_logging();

    let config_path = std::env::var("VOCAL_ENV").unwrap_or_else(|_| CONFIG_FILE.to_string());
    let mut env = Environment::bootstrap(&config_path, &RemoteCatalog::default())?;

    {
        let manager = ResourceManager::new(&mut env);
        for engine in ["demucs", "so-vits"] {
            match manager.list_available(engine, "models") {
                Ok(models) => info!("{engine}: {} models available", models.len()),
                Err(error) => warn!("cannot list {engine} models: {error}"),
            }
        }
    }

    env.export_sources(false)?;
    Ok(())
}
