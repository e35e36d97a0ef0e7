use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use raglab_backend::server::router::router;
use raglab_backend::state::AppState;
use raglab_backend::{core, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = core::config::AppPaths::new();
    logging::init(&paths);

    let state = AppState::initialize().await?;

    let bind_addr = format!("{}:{}", state.settings.host, state.settings.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
