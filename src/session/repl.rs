//! REPL controller
//!
//! Lazily creates a REPL session, submits lines strictly one at a time and
//! records everything in an append-only [`ReplLog`].
//!
//! Two locks order the work:
//! - `turn` is held for the whole of an `exec` or `reset`, so at most one
//!   line is in flight per session and statements reach the interpreter in
//!   submission order.
//! - `init` guards session creation; callers that arrive while an init
//!   request is outstanding wait for it and reuse its session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::common::Result;
use crate::engine::{with_timeout, EngineApi, ExecReply, SessionId};

use super::history::HistoryBuffer;
use super::log::{LogKind, ReplLog};
use super::registry::SessionRegistry;

/// Log text for a transport failure during `exec`
pub const NETWORK_ERROR: &str = "Network error";

/// REPL session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    NoSession,
    SessionActive,
}

pub struct ReplController {
    engine: Arc<dyn EngineApi>,
    registry: Arc<SessionRegistry>,
    log: Arc<ReplLog>,
    history: Mutex<HistoryBuffer>,
    timeout: Duration,
    init: tokio::sync::Mutex<()>,
    turn: tokio::sync::Mutex<()>,
    continuation: AtomicBool,
}

/// Strip the line terminator only; the rest is echoed verbatim
fn strip_terminator(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

impl ReplController {
    pub fn new(engine: Arc<dyn EngineApi>, registry: Arc<SessionRegistry>, timeout: Duration) -> Self {
        Self {
            engine,
            registry,
            log: Arc::new(ReplLog::new()),
            history: Mutex::new(HistoryBuffer::new()),
            timeout,
            init: tokio::sync::Mutex::new(()),
            turn: tokio::sync::Mutex::new(()),
            continuation: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ReplState {
        if self.registry.repl().is_active() {
            ReplState::SessionActive
        } else {
            ReplState::NoSession
        }
    }

    pub fn session(&self) -> Option<SessionId> {
        self.registry.repl().current()
    }

    pub fn log(&self) -> &Arc<ReplLog> {
        &self.log
    }

    /// The engine is waiting for the rest of an open block
    pub fn awaiting_continuation(&self) -> bool {
        self.continuation.load(Ordering::SeqCst)
    }

    /// Return the live session, creating one if needed
    ///
    /// Concurrent callers share a single init request.
    pub async fn ensure_session(&self) -> Result<SessionId> {
        if let Some(session) = self.registry.repl().current() {
            return Ok(session);
        }

        let _init = self.init.lock().await;
        // Another caller may have finished creating it while we waited
        if let Some(session) = self.registry.repl().current() {
            return Ok(session);
        }

        let session = with_timeout(self.timeout, self.engine.repl_init()).await?;
        self.registry.repl().replace(Some(session.clone()));
        self.continuation.store(false, Ordering::SeqCst);
        tracing::info!(session = %session, "REPL session created");
        self.log
            .append(LogKind::Info, format!("REPL session: {}", session.short()));
        Ok(session)
    }

    /// Evaluate one line in the session
    ///
    /// Blank input is ignored without contacting the engine (`Ok(None)`).
    /// Failures are logged and also returned.
    #[tracing::instrument(skip(self, line))]
    pub async fn exec(&self, line: &str) -> Result<Option<ExecReply>> {
        let line = strip_terminator(line);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let _turn = self.turn.lock().await;

        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Could not create REPL session: {}", e);
                self.log
                    .append(LogKind::Error, format!("Could not create a REPL session: {}", e));
                return Err(e);
            }
        };

        self.log.append(LogKind::Command, line);

        match with_timeout(self.timeout, self.engine.repl_exec(&session, line)).await {
            Ok(reply) => {
                self.continuation.store(reply.more, Ordering::SeqCst);
                if !reply.output.is_empty() {
                    let kind = if reply.success {
                        LogKind::Output
                    } else {
                        LogKind::Error
                    };
                    self.log.append(kind, reply.output.as_str());
                }
                Ok(Some(reply))
            }
            Err(e) => {
                tracing::warn!(session = %session, "REPL exec failed: {}", e);
                self.log.append(LogKind::Error, NETWORK_ERROR);
                Err(e)
            }
        }
    }

    /// Console submit: record in history, then evaluate
    pub async fn submit(&self, line: &str) -> Result<Option<ExecReply>> {
        self.history.lock().push(strip_terminator(line));
        self.exec(line).await
    }

    /// Evaluate every non-blank line of `code` in order
    ///
    /// Stops at the first transport failure; engine-reported errors do not
    /// stop the block. Returns how many lines were sent.
    pub async fn submit_block(&self, code: &str) -> Result<usize> {
        let mut sent = 0;
        for line in code.lines().filter(|l| !l.trim().is_empty()) {
            self.exec(line).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Reset the session on the engine and forget it locally
    ///
    /// Returns `Ok(false)` when there was no session.
    pub async fn reset(&self) -> Result<bool> {
        let _turn = self.turn.lock().await;

        let Some(session) = self.registry.repl().current() else {
            return Ok(false);
        };

        match with_timeout(self.timeout, self.engine.repl_reset(&session)).await {
            Ok(()) => {
                self.registry.repl().clear_if(&session);
                self.continuation.store(false, Ordering::SeqCst);
                tracing::info!(session = %session, "REPL session reset");
                self.log.append(LogKind::Info, "Session reset");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(session = %session, "REPL reset failed: {}", e);
                self.log.append(LogKind::Error, format!("Reset failed: {}", e));
                Err(e)
            }
        }
    }

    pub fn clear_log(&self) {
        self.log.clear();
    }

    /// All log text, one entry per line
    pub fn transcript(&self) -> String {
        self.log.transcript()
    }

    pub fn history_previous(&self) -> Option<String> {
        self.history.lock().previous().map(str::to_string)
    }

    pub fn history_next(&self) -> Option<String> {
        self.history.lock().next().map(str::to_string)
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().entries().to_vec()
    }
}
