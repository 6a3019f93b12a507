//! Scripted in-process engine
//!
//! Implements [`EngineApi`] without a network: replies are queued per
//! endpoint (with sensible defaults when a queue runs dry), every call is
//! recorded, and each endpoint can be gated so a test decides exactly when
//! an outstanding request completes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::common::Result;
use crate::engine::{DebugStarted, DebugState, EngineApi, ExecReply, Frame, SessionId};

/// Engine operations, one per HTTP endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Run,
    ReplInit,
    ReplExec,
    ReplReset,
    DebugStart,
    SetBreakpoints,
    Step,
    Continue,
    State,
    Health,
}

/// A recorded call with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Run { code: String },
    ReplInit,
    ReplExec { session: SessionId, line: String },
    ReplReset { session: SessionId },
    DebugStart { code: String, breakpoints: Vec<u32> },
    SetBreakpoints { session: SessionId, breakpoints: Vec<u32> },
    Step { session: SessionId },
    Continue { session: SessionId },
    State { session: SessionId },
    Health,
}

impl EngineCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Run { .. } => Endpoint::Run,
            Self::ReplInit => Endpoint::ReplInit,
            Self::ReplExec { .. } => Endpoint::ReplExec,
            Self::ReplReset { .. } => Endpoint::ReplReset,
            Self::DebugStart { .. } => Endpoint::DebugStart,
            Self::SetBreakpoints { .. } => Endpoint::SetBreakpoints,
            Self::Step { .. } => Endpoint::Step,
            Self::Continue { .. } => Endpoint::Continue,
            Self::State { .. } => Endpoint::State,
            Self::Health => Endpoint::Health,
        }
    }
}

#[derive(Default)]
struct Script {
    run: VecDeque<Result<ExecReply>>,
    init: VecDeque<Result<SessionId>>,
    exec: VecDeque<Result<ExecReply>>,
    reset: VecDeque<Result<()>>,
    start: VecDeque<Result<DebugStarted>>,
    set_breakpoints: VecDeque<Result<Vec<u32>>>,
    step: VecDeque<Result<DebugState>>,
    cont: VecDeque<Result<DebugState>>,
    state: VecDeque<Result<DebugState>>,
}

#[derive(Default, Clone, Copy)]
struct Occupancy {
    current: usize,
    max: usize,
}

/// Scripted engine for tests and offline demos
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<Script>,
    calls: Mutex<Vec<EngineCall>>,
    gates: Mutex<HashMap<Endpoint, Arc<Semaphore>>>,
    occupancy: Mutex<HashMap<Endpoint, Occupancy>>,
    next_id: AtomicUsize,
}

/// Decrements the in-flight count when the request finishes or is dropped
struct InFlight<'a> {
    engine: &'a ScriptedEngine,
    endpoint: Endpoint,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut occupancy = self.engine.occupancy.lock();
        if let Some(entry) = occupancy.get_mut(&self.endpoint) {
            entry.current = entry.current.saturating_sub(1);
        }
    }
}

/// Snapshot paused before `line`
pub fn paused_at(line: u32) -> DebugState {
    DebugState {
        paused: true,
        callstack: vec![Frame {
            function: Some("<module>".to_string()),
            filename: Some("<stdin>".to_string()),
            line: Some(line),
        }],
        ..Default::default()
    }
}

/// Snapshot of a program that ran to completion
pub fn finished() -> DebugState {
    DebugState::default()
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Scripting ===

    pub fn push_run(&self, reply: Result<ExecReply>) {
        self.script.lock().run.push_back(reply);
    }

    pub fn push_init(&self, reply: Result<SessionId>) {
        self.script.lock().init.push_back(reply);
    }

    pub fn push_exec(&self, reply: Result<ExecReply>) {
        self.script.lock().exec.push_back(reply);
    }

    pub fn push_reset(&self, reply: Result<()>) {
        self.script.lock().reset.push_back(reply);
    }

    pub fn push_start(&self, reply: Result<DebugStarted>) {
        self.script.lock().start.push_back(reply);
    }

    pub fn push_set_breakpoints(&self, reply: Result<Vec<u32>>) {
        self.script.lock().set_breakpoints.push_back(reply);
    }

    pub fn push_step(&self, reply: Result<DebugState>) {
        self.script.lock().step.push_back(reply);
    }

    pub fn push_continue(&self, reply: Result<DebugState>) {
        self.script.lock().cont.push_back(reply);
    }

    pub fn push_state(&self, reply: Result<DebugState>) {
        self.script.lock().state.push_back(reply);
    }

    // === Gates ===

    /// Make requests to `endpoint` wait until released
    pub fn hold(&self, endpoint: Endpoint) {
        self.gates.lock().insert(endpoint, Arc::new(Semaphore::new(0)));
    }

    /// Let `count` waiting (or future) requests to `endpoint` through
    pub fn release(&self, endpoint: Endpoint, count: usize) {
        if let Some(gate) = self.gates.lock().get(&endpoint) {
            gate.add_permits(count);
        }
    }

    /// Remove the gate entirely, releasing everything that waits on it
    pub fn open(&self, endpoint: Endpoint) {
        if let Some(gate) = self.gates.lock().remove(&endpoint) {
            gate.close();
        }
    }

    // === Inspection ===

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<EngineCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .cloned()
            .collect()
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.calls_to(endpoint).len()
    }

    /// Highest number of simultaneously outstanding requests seen
    pub fn max_in_flight(&self, endpoint: Endpoint) -> usize {
        self.occupancy.lock().get(&endpoint).map_or(0, |o| o.max)
    }

    pub fn in_flight(&self, endpoint: Endpoint) -> usize {
        self.occupancy.lock().get(&endpoint).map_or(0, |o| o.current)
    }

    /// Wait until at least `count` calls reached `endpoint`
    ///
    /// Panics after two seconds so a broken test fails instead of hanging.
    pub async fn wait_for(&self, endpoint: Endpoint, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.count(endpoint) < count {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "expected {} call(s) to {:?}, saw {}",
                    count,
                    endpoint,
                    self.count(endpoint)
                );
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn enter(&self, call: EngineCall) -> InFlight<'_> {
        let endpoint = call.endpoint();
        self.calls.lock().push(call);
        {
            let mut occupancy = self.occupancy.lock();
            let entry = occupancy.entry(endpoint).or_default();
            entry.current += 1;
            entry.max = entry.max.max(entry.current);
        }
        let guard = InFlight {
            engine: self,
            endpoint,
        };

        let gate = self.gates.lock().get(&endpoint).cloned();
        if let Some(gate) = gate {
            // A closed gate means it was opened for good
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        guard
    }

    fn fresh_id(&self, prefix: &str) -> SessionId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        SessionId::new(format!("{}{:04x}-4d2e-8c1a-{:012x}", prefix, n, n))
    }
}

#[async_trait]
impl EngineApi for ScriptedEngine {
    async fn run(&self, code: &str) -> Result<ExecReply> {
        let _flight = self.enter(EngineCall::Run { code: code.to_string() }).await;
        let queued = self.script.lock().run.pop_front();
        queued.unwrap_or_else(|| Ok(ExecReply::ok("")))
    }

    async fn repl_init(&self) -> Result<SessionId> {
        let _flight = self.enter(EngineCall::ReplInit).await;
        let queued = self.script.lock().init.pop_front();
        queued.unwrap_or_else(|| Ok(self.fresh_id("5e55")))
    }

    async fn repl_exec(&self, session: &SessionId, line: &str) -> Result<ExecReply> {
        let _flight = self
            .enter(EngineCall::ReplExec {
                session: session.clone(),
                line: line.to_string(),
            })
            .await;
        let queued = self.script.lock().exec.pop_front();
        queued.unwrap_or_else(|| Ok(ExecReply::ok("")))
    }

    async fn repl_reset(&self, session: &SessionId) -> Result<()> {
        let _flight = self
            .enter(EngineCall::ReplReset {
                session: session.clone(),
            })
            .await;
        let queued = self.script.lock().reset.pop_front();
        queued.unwrap_or(Ok(()))
    }

    async fn debug_start(&self, code: &str, breakpoints: &[u32]) -> Result<DebugStarted> {
        let _flight = self
            .enter(EngineCall::DebugStart {
                code: code.to_string(),
                breakpoints: breakpoints.to_vec(),
            })
            .await;
        let queued = self.script.lock().start.pop_front();
        queued.unwrap_or_else(|| {
            Ok(DebugStarted {
                session: self.fresh_id("d3b9"),
                state: Some(paused_at(1)),
            })
        })
    }

    async fn debug_set_breakpoints(&self, session: &SessionId, breakpoints: &[u32]) -> Result<Vec<u32>> {
        let _flight = self
            .enter(EngineCall::SetBreakpoints {
                session: session.clone(),
                breakpoints: breakpoints.to_vec(),
            })
            .await;
        let queued = self.script.lock().set_breakpoints.pop_front();
        queued.unwrap_or_else(|| Ok(breakpoints.to_vec()))
    }

    async fn debug_step(&self, session: &SessionId) -> Result<DebugState> {
        let _flight = self
            .enter(EngineCall::Step {
                session: session.clone(),
            })
            .await;
        let queued = self.script.lock().step.pop_front();
        queued.unwrap_or_else(|| Ok(paused_at(1)))
    }

    async fn debug_continue(&self, session: &SessionId) -> Result<DebugState> {
        let _flight = self
            .enter(EngineCall::Continue {
                session: session.clone(),
            })
            .await;
        let queued = self.script.lock().cont.pop_front();
        queued.unwrap_or_else(|| Ok(paused_at(1)))
    }

    async fn debug_state(&self, session: &SessionId) -> Result<DebugState> {
        let _flight = self
            .enter(EngineCall::State {
                session: session.clone(),
            })
            .await;
        let queued = self.script.lock().state.pop_front();
        queued.unwrap_or_else(|| Ok(paused_at(1)))
    }

    async fn health(&self) -> Result<()> {
        let _flight = self.enter(EngineCall::Health).await;
        Ok(())
    }
}
