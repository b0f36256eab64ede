use engine_bridge::EngineSource;
use server::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    match &config.engine.source {
        EngineSource::Builtin => tracing::info!("Remote-bot seats use the builtin reference engine"),
        EngineSource::Process { path, .. } => tracing::info!("Remote-bot seats use engine at {path}"),
    }
    match &config.archive_dir {
        Some(dir) => tracing::info!("Archiving completed matches to {}", dir.display()),
        None => tracing::info!("ARCHIVE_DIR not set - replays kept in memory only"),
    }

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    server::serve(listener, config).await?;
    Ok(())
}
