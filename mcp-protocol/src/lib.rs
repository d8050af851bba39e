//! Tool-surface crate: response envelope, workflow guidance, parameter
//! coercion, the `(tool, action)` dispatcher and a thin axum adapter.
//!
//! # Overview
//!
//! Every RPC reply is a [`ToolResponse`] envelope. Successful operations
//! carry a `workflow_guidance` block synthesised from declarative rule
//! tables; failures carry `autonomous_error_guidance` so an agent can
//! recover without a human. The dispatcher performs parameter coercion
//! (stringly booleans, JSON-array strings, integer-valued strings) before
//! any use-case service runs.
//!
//! ```no_run
//! use mcp_protocol::{Dispatcher, DispatcherOptions, McpServer};
//! use std::sync::Arc;
//!
//! async fn start(dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
//!     let server = McpServer::new(dispatcher);
//!     server.serve("127.0.0.1:3000").await
//! }
//! ```

pub mod coercion;
pub mod dispatcher;
pub mod envelope;
pub mod guidance;
pub mod params;
pub mod server;

pub use coercion::{coerce_bool, coerce_limit, coerce_string_list, normalize_params};
pub use dispatcher::{Dispatcher, DispatcherOptions, TOOLS};
pub use envelope::{Confirmation, EnvelopeError, ResponseStatus, ToolResponse};
pub use guidance::{
    autonomous_error_guidance, build_guidance, resolve_conflicts, Enforcement, GuidancePriority,
    GuidanceState, NextAction, WorkflowRule,
};
pub use server::{McpServer, ToolCallRequest};
