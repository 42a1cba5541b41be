//! `procd-worker` library crate.
//!
//! Process wiring for the dispatcher: the pipeline stage table, the
//! external-command job handler and scheduler construction. The binary
//! entrypoint lives in `main.rs`.

pub mod handlers;
pub mod stages;
pub mod wiring;
