//! HTTP surface for the governance engine

pub mod errors;
pub mod routes;

pub use errors::{ApiError, ApiResult};
pub use routes::{router, AppState};

use anyhow::Context;
use log::info;

/// Bind and serve the governance API
pub async fn serve(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {}", listen_addr))?;
    info!("Governance API listening on {}", listen_addr);
    axum::serve(listener, router(state))
        .await
        .context("serving governance API")?;
    Ok(())
}
