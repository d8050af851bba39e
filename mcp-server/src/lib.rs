//! Server library: configuration, telemetry and application wiring for the
//! task-orchestration tool endpoint.

pub mod config;
pub mod setup;
pub mod telemetry;

pub use config::Config;
pub use setup::{ensure_database_directory, initialize_app};
pub use telemetry::init_telemetry;
