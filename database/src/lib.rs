//! SQLite persistence for the orchestrator.
//!
//! Implements every repository trait from `strata-core` over a shared
//! connection pool:
//!
//! - WAL journal mode for concurrent readers, busy timeout, enforced
//!   foreign keys
//! - Migrations under `migrations/sqlite/` applied via `sqlx::migrate!`
//! - Satellite tables for task assignees, labels and dependency edges;
//!   JSON columns for the open-shape context documents
//!
//! ```rust,no_run
//! use database::{SqliteStore, SqliteTaskRepository};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::connect("sqlite:///tmp/strata.sqlite").await?;
//! store.migrate().await?;
//! let tasks = SqliteTaskRepository::new(&store);
//! # Ok(())
//! # }
//! ```

mod common;
mod context_store;
mod sqlite;

pub use context_store::{SqliteContextRepository, SqliteDelegationRepository};
pub use sqlite::{
    SqliteAgentRepository, SqliteBranchRepository, SqliteProjectRepository, SqliteStore,
    SqliteSubtaskRepository, SqliteTaskRepository,
};
