//! Execution engine protocol
//!
//! The engine is an external collaborator exposing a fixed JSON/HTTP
//! contract. Controllers only see the [`EngineApi`] trait, so the HTTP
//! client and the scripted test engine are interchangeable.

pub mod client;
pub mod types;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Error, Result};

pub use client::HttpEngine;
pub use types::*;

/// Network calls shared by every controller
///
/// Implementations report transport problems as network errors and
/// in-band failures (`error` fields, failing HTTP status) as
/// [`Error::Engine`]. `run` and `repl_exec` carry failure in
/// [`ExecReply::success`] instead, since a failing program is a normal outcome.
#[async_trait]
pub trait EngineApi: Send + Sync {
    async fn run(&self, code: &str) -> Result<ExecReply>;

    async fn repl_init(&self) -> Result<SessionId>;

    async fn repl_exec(&self, session: &SessionId, line: &str) -> Result<ExecReply>;

    async fn repl_reset(&self, session: &SessionId) -> Result<()>;

    async fn debug_start(&self, code: &str, breakpoints: &[u32]) -> Result<DebugStarted>;

    /// Returns the breakpoint set the engine confirmed
    async fn debug_set_breakpoints(&self, session: &SessionId, breakpoints: &[u32]) -> Result<Vec<u32>>;

    async fn debug_step(&self, session: &SessionId) -> Result<DebugState>;

    async fn debug_continue(&self, session: &SessionId) -> Result<DebugState>;

    async fn debug_state(&self, session: &SessionId) -> Result<DebugState>;

    async fn health(&self) -> Result<()>;
}

/// Run an engine call with a hard deadline
///
/// On expiry the call's future is dropped, which aborts the underlying
/// request, and [`Error::Timeout`] is returned.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit)),
    }
}
