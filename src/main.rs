use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use brain_tumor_service::{
    model::{select_device, Model},
    server::{router, AppState},
    utils::{ensure_checkpoint, Config},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    ensure_checkpoint(&config).await?;

    let device = select_device().context("Failed to select compute device")?;
    tracing::info!("Using device {:?}", device);

    let model = Model::new(&config.model_path, device).with_context(|| {
        format!("Failed to load model from {}", config.model_path.display())
    })?;
    tracing::info!("Loaded checkpoint {}", config.model_path.display());

    let app = router(AppState::new(model), config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(app.into_make_service())
        .await
        .context("Server error")?;

    Ok(())
}
