use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use poliza_backend::state::AppState;
use poliza_backend::{logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    // A dead LLM backend means every single query would fail; refuse to
    // start instead of serving guaranteed apologies.
    match state.llm.health_check().await {
        Ok(true) => tracing::info!(
            "LLM backend {} reachable at {}",
            state.llm.name(),
            state.settings.llm.base_url
        ),
        _ => anyhow::bail!(
            "Cannot reach the LLM backend at {}. Is Ollama running?",
            state.settings.llm.base_url
        ),
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(8080);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
