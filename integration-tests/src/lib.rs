//! End-to-end scenario tests for the orchestrator live under `tests/`.
//! This crate intentionally exports nothing.
