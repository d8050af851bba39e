//! Thin HTTP adapter over the dispatcher.
//!
//! The tool contract lives entirely in [`crate::dispatcher`]; this module
//! only maps `POST /tools/call` onto it and exposes a liveness probe.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::envelope::ResponseStatus;

/// Request body for a tool invocation
#[derive(Debug, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
}

/// HTTP server wrapping a [`Dispatcher`]
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/tools/call", post(call_tool))
            .with_state(self.dispatcher.clone())
    }

    /// Serve until the listener fails or the task is dropped
    pub async fn serve(&self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "tool endpoint listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn call_tool(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<ToolCallRequest>,
) -> Response {
    let response = dispatcher.dispatch(&request.tool, request.params).await;
    let status = match response.status {
        ResponseStatus::Success | ResponseStatus::PartialSuccess => StatusCode::OK,
        ResponseStatus::Failure => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(response)).into_response()
}
