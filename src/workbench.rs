//! Top-level controller
//!
//! Owns the session registry, the editor buffer and the status line, and
//! wires the user-facing triggers to the controllers. Every engine-bound
//! trigger records a pending status first and reconciles it when the
//! exchange completes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::common::{config::Config, Result};
use crate::engine::{DebugState, EngineApi, ExecReply, HttpEngine};
use crate::session::{
    BreakpointDiff, BufferStore, DebugController, FileStore, MemoryStore, PersistenceAdapter,
    ReplController, RunExecutor, RunOutcome, SessionRegistry,
};

/// Buffer shown when nothing was saved yet
pub const SAMPLE: &str = "x = 10\ny = x + 5\nprint(y)\nif y > 10:\n    print(y)";

/// Status texts
pub mod status {
    pub const READY: &str = "Ready";
    pub const MODIFIED: &str = "Modified";
    pub const SAVED: &str = "Saved";
    pub const RUNNING: &str = "Running…";
    pub const DEBUG: &str = "Debug…";
    pub const STEP: &str = "Step…";
    pub const CONTINUE: &str = "Continue…";
    pub const DONE: &str = "Done";
    pub const ERROR: &str = "Error";
    pub const PAUSED: &str = "Paused";
    pub const FINISHED: &str = "Finished";
    pub const DEBUG_ERROR: &str = "Debug error";
    pub const STEP_ERROR: &str = "Step error";
    pub const CONTINUE_ERROR: &str = "Continue error";
    pub const STATE_ERROR: &str = "State error";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub error: bool,
    /// Waiting for the engine
    pub pending: bool,
}

impl StatusLine {
    fn pending(text: &str) -> Self {
        Self {
            text: text.to_string(),
            error: false,
            pending: true,
        }
    }

    fn done(text: &str) -> Self {
        Self {
            text: text.to_string(),
            error: false,
            pending: false,
        }
    }

    fn failed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            error: true,
            pending: false,
        }
    }

    /// Status describing an adopted debug snapshot
    fn for_state(state: &DebugState) -> Self {
        if state.paused {
            Self::done(status::PAUSED)
        } else if state.error.is_some() {
            Self::failed(status::ERROR)
        } else {
            Self::done(status::FINISHED)
        }
    }
}

pub struct Workbench {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn EngineApi>,
    runner: RunExecutor,
    repl: ReplController,
    debug: DebugController,
    persistence: PersistenceAdapter,
    buffer: Mutex<String>,
    status: watch::Sender<StatusLine>,
}

impl Workbench {
    /// Build against the configured HTTP engine and storage directory
    ///
    /// Falls back to in-memory storage when no data directory is available.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Arc::new(HttpEngine::from_config(config)?);
        let store: Arc<dyn BufferStore> = match FileStore::from_config(&config.editor) {
            Some(store) => Arc::new(store),
            None => {
                tracing::warn!("No storage directory available, editor buffer will not persist");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(config, engine, store))
    }

    pub fn new(config: &Config, engine: Arc<dyn EngineApi>, store: Arc<dyn BufferStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let request = config.timeouts.request();

        let persistence = PersistenceAdapter::new(store, config.editor.debounce());
        let buffer = persistence.restore(SAMPLE);
        let (status, _) = watch::channel(StatusLine::done(status::READY));

        Self {
            runner: RunExecutor::new(engine.clone(), config.timeouts.run()),
            repl: ReplController::new(engine.clone(), registry.clone(), request),
            debug: DebugController::new(
                engine.clone(),
                registry.clone(),
                request,
                config.timeouts.run(),
                config.debug.poll_interval(),
            ),
            registry,
            engine,
            persistence,
            buffer: Mutex::new(buffer),
            status,
        }
    }

    // === Accessors ===

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn EngineApi> {
        &self.engine
    }

    pub fn runner(&self) -> &RunExecutor {
        &self.runner
    }

    pub fn repl(&self) -> &ReplController {
        &self.repl
    }

    pub fn debug(&self) -> &DebugController {
        &self.debug
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    pub fn buffer(&self) -> String {
        self.buffer.lock().clone()
    }

    pub fn status(&self) -> StatusLine {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusLine> {
        self.status.subscribe()
    }

    fn set_status(&self, line: StatusLine) {
        self.status.send_replace(line);
    }

    // === Editor ===

    /// Replace the buffer contents and schedule a save
    pub fn edit<S: Into<String>>(&self, text: S) {
        let text = text.into();
        self.persistence.buffer_changed(text.as_str());
        *self.buffer.lock() = text;
        self.set_status(StatusLine::done(status::MODIFIED));
    }

    /// Expand tabs to four spaces
    pub fn format(&self) {
        let formatted = self.buffer().replace('\t', "    ");
        self.edit(formatted);
    }

    /// Open `text` in the editor without marking it modified or saving it
    pub fn load<S: Into<String>>(&self, text: S) {
        *self.buffer.lock() = text.into();
    }

    /// Write the buffer immediately
    pub fn save(&self) -> bool {
        let saved = self.persistence.save_now(&self.buffer());
        if saved {
            self.set_status(StatusLine::done(status::SAVED));
        }
        saved
    }

    // === Run ===

    pub async fn run(&self) -> RunOutcome {
        self.run_with_timeout(self.runner.timeout()).await
    }

    pub async fn run_with_timeout(&self, timeout: Duration) -> RunOutcome {
        self.set_status(StatusLine::pending(status::RUNNING));
        let outcome = self.runner.execute_with_timeout(&self.buffer(), timeout).await;
        self.set_status(if outcome.success() {
            StatusLine::done(status::DONE)
        } else {
            StatusLine::failed(status::ERROR)
        });
        outcome
    }

    /// Run and report output followed by the elapsed time
    pub async fn run_timed(&self) -> String {
        self.run().await.timed_report()
    }

    // === REPL ===

    pub async fn repl_submit(&self, line: &str) -> Result<Option<ExecReply>> {
        if line.trim().is_empty() {
            return self.repl.submit(line).await;
        }
        self.set_status(StatusLine::pending(status::RUNNING));
        let result = self.repl.submit(line).await;
        self.set_status(match &result {
            Ok(Some(reply)) if reply.success => StatusLine::done(status::DONE),
            Ok(None) => StatusLine::done(status::DONE),
            _ => StatusLine::failed(status::ERROR),
        });
        result
    }

    /// Send the editor buffer to the REPL line by line
    pub async fn repl_submit_block(&self) -> Result<usize> {
        self.set_status(StatusLine::pending(status::RUNNING));
        let result = self.repl.submit_block(&self.buffer()).await;
        self.set_status(match result {
            Ok(_) => StatusLine::done(status::DONE),
            Err(_) => StatusLine::failed(status::ERROR),
        });
        result
    }

    pub async fn repl_reset(&self) -> Result<bool> {
        let result = self.repl.reset().await;
        if result.is_err() {
            self.set_status(StatusLine::failed(status::ERROR));
        }
        result
    }

    // === Debug ===

    pub async fn toggle_breakpoint(&self, line: u32) -> Result<BreakpointDiff> {
        let result = self.debug.toggle_breakpoint(line).await;
        if result.is_err() {
            self.set_status(StatusLine::failed(status::DEBUG_ERROR));
        }
        result
    }

    /// Start debugging the buffer with the current breakpoints
    pub async fn debug_start(&self) -> Result<DebugState> {
        self.set_status(StatusLine::pending(status::DEBUG));
        let breakpoints = self.debug.breakpoints();
        let result = self.debug.start(&self.buffer(), &breakpoints).await;
        self.reconcile(&result, status::DEBUG_ERROR);
        result
    }

    pub async fn debug_step(&self) -> Result<DebugState> {
        self.set_status(StatusLine::pending(status::STEP));
        let result = self.debug.step().await;
        self.reconcile(&result, status::STEP_ERROR);
        result
    }

    pub async fn debug_continue(&self) -> Result<DebugState> {
        self.set_status(StatusLine::pending(status::CONTINUE));
        let result = self.debug.resume().await;
        self.reconcile(&result, status::CONTINUE_ERROR);
        result
    }

    pub async fn debug_refresh(&self) -> Result<DebugState> {
        let result = self.debug.refresh_state().await;
        self.reconcile(&result, status::STATE_ERROR);
        result
    }

    pub async fn debug_reset(&self) -> bool {
        let had_session = self.debug.reset().await;
        self.set_status(StatusLine::done(status::READY));
        had_session
    }

    fn reconcile(&self, result: &Result<DebugState>, error_text: &str) {
        self.set_status(match result {
            Ok(state) => StatusLine::for_state(state),
            Err(_) => StatusLine::failed(error_text),
        });
    }
}
