//! Greedy BGS engine
//!
//! Speaks BGS on stdin/stdout so it can stand in for a real engine via
//! `ENGINE_PATH`. Logs go to stderr.

use tokio::io::BufReader;
use tracing::info;

use engine_bridge::reference;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Greedy engine ready");
    reference::serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    Ok(())
}
