use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lenta::{app_state::AppState, config::Config, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.server_address();

    let state = AppState::new(config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize state: {}", e))?;
    let app = handlers::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
