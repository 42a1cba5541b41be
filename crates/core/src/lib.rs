//! `procd-core` -- scheduling and dispatch engine.
//!
//! Polls a [`JobSource`](ports::JobSource) for work tagged with a
//! (category, state) pair and runs each job through the category's
//! [`JobHandler`](ports::JobHandler) on a bounded [`WorkerPool`](pool::WorkerPool).
//! The [`Scheduler`](scheduler::Scheduler) drives one
//! [`CategoryDispatcher`](dispatcher::CategoryDispatcher) per registered
//! stage in a fixed-delay round-robin loop.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod pool;
pub mod ports;
pub mod scheduler;
pub mod types;

pub use config::Config;
pub use dispatcher::{CategoryDispatcher, CategorySpec, DispatcherStatus, TickReport};
pub use error::{ConfigError, DispatchError, HandlerError, JobSourceError};
pub use job::{Job, Outcome};
pub use pool::{JobHandle, WorkerPool};
pub use ports::{JobHandler, JobSource};
pub use scheduler::{PassSummary, Scheduler};
pub use types::JobId;
