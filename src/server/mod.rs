//! HTTP surface: multipart upload in, tailored DOCX or JSON out.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::pipeline::TailorPipeline;

pub mod errors;
pub mod handlers;

/// Room for the job description and multipart framing on top of the document itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: TailorPipeline,
}

/// The body limit sits above the upload limit so an oversize document reaches the
/// pipeline's own size check.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.pipeline.config().max_upload_bytes + FORM_OVERHEAD_BYTES;
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/tailor", post(handlers::handle_tailor))
        .route("/api/tailor/reroll", post(handlers::handle_reroll))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn serve(pipeline: TailorPipeline, bind: &str) -> anyhow::Result<()> {
    let app = build_router(AppState { pipeline })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address: {bind}"))?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
