//! MicroScript IDE client core
//!
//! Session and protocol orchestration for an interactive code-execution
//! engine: one-shot runs, an incremental REPL and a stepwise debugger, all
//! speaking the engine's JSON/HTTP contract.

pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod session;
pub mod testing;
pub mod workbench;

// Re-export commonly used types for tests
pub use common::{Error, ErrorCategory, Result};
pub use engine::{EngineApi, HttpEngine};
pub use workbench::Workbench;
