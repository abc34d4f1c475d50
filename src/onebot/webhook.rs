//! Przyjmowanie zdarzeń od gatewaya OneBot (HTTP POST) + healthcheck.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{InboundEvent, PlatformStatus};
use crate::engine::Engine;

#[derive(Clone)]
pub struct WebhookState {
    pub engine: Arc<Engine>,
    pub status: Arc<PlatformStatus>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/onebot", post(on_event))
        .with_state(state)
}

/// Start serwera; kończy się po `shutdown`.
pub async fn serve<F>(addr: SocketAddr, state: WebhookState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "onebot webhook listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn on_event(State(state): State<WebhookState>, Json(body): Json<Value>) -> StatusCode {
    // Zawsze 204 – gateway nie powinien ponawiać przez nasze błędy parsowania.
    let event = match serde_json::from_value::<InboundEvent>(body) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(error = %e, "cannot decode onebot event");
            return StatusCode::NO_CONTENT;
        }
    };

    match event {
        InboundEvent::MetaEvent(meta) => state.status.observe(&meta),
        InboundEvent::Message(msg) => {
            if let Some(gm) = msg.into_group_message() {
                state.engine.handle_message(gm).await;
            }
        }
        InboundEvent::Notice(_) | InboundEvent::Request(_) | InboundEvent::Unknown => {
            debug!("ignoring non-message event");
        }
    }
    StatusCode::NO_CONTENT
}
