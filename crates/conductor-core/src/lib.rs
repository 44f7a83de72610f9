//! conductor-core
//!
//! Task orchestration for managed database clusters ("universes"): node
//! lifecycle rules, persisted task trees with rolled-up state, admission
//! control for frozen universes, and an executor that runs subtask groups on
//! a bounded pool with cooperative abort.
//!
//! # Modules
//! - **domain**: ids, task and node states, operation types, records
//! - **ports**: TaskStore, UniverseStore, Clock, IdGenerator
//! - **impls**: in-memory port implementations
//! - **app**: executor, admission, status views
//! - **config**: file and environment configuration
//! - **observability**: metrics sink

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{ExecutorBuilder, SubTaskGroup, TaskContext, TaskExecutor, TaskHandler};
pub use config::ConductorConfig;
pub use error::ConductorError;
