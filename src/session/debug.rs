//! Debug controller
//!
//! Drives one debug session at a time: start, step, continue, breakpoint
//! pushes and explicit refreshes, plus a periodic poll that observes
//! pauses the engine reaches on its own.
//!
//! Ordering works like this:
//! - User operations hold `ops` for their whole exchange, so they never
//!   overlap each other.
//! - Each operation start and each adopted snapshot bumps `epoch`. Each
//!   session change bumps `generation`.
//! - The poller skips a tick while `ops` is held. It drops its response if
//!   the epoch or generation moved while the request was outstanding, so a
//!   slow poll can't overwrite a step's snapshot or write into a newer
//!   session.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::common::{Error, Result};
use crate::engine::{with_timeout, DebugState, EngineApi, SessionId};

use super::breakpoints::{BreakpointDiff, BreakpointSet};
use super::registry::SessionRegistry;

/// Where the debug session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugPhase {
    Idle,
    Starting,
    Paused,
    Stepping,
    Continuing,
    Finished,
}

impl DebugPhase {
    /// A request is outstanding and the phase is not yet authoritative
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Starting | Self::Stepping | Self::Continuing)
    }
}

/// Published snapshot of the controller
#[derive(Debug, Clone, PartialEq)]
pub struct DebugView {
    pub phase: DebugPhase,
    pub session: Option<SessionId>,
    pub state: Option<DebugState>,
    pub breakpoints: Vec<u32>,
    /// Last failed operation, cleared by the next start or reset
    pub error: Option<String>,
}

impl DebugView {
    fn idle() -> Self {
        Self {
            phase: DebugPhase::Idle,
            session: None,
            state: None,
            breakpoints: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Advance {
    Step,
    Continue,
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    Continue,
    Stop,
}

struct Shared {
    phase: DebugPhase,
    state: Option<DebugState>,
    breakpoints: BreakpointSet,
    error: Option<String>,
    generation: u64,
    epoch: u64,
    poller: Option<JoinHandle<()>>,
}

impl Shared {
    /// Take a snapshot as the new authoritative state
    ///
    /// Returns whether the program is no longer executing.
    fn adopt(&mut self, state: DebugState) -> bool {
        let terminated = state.is_terminated();
        self.phase = if terminated {
            DebugPhase::Finished
        } else {
            DebugPhase::Paused
        };
        self.state = Some(state);
        self.epoch += 1;
        terminated
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

struct Inner {
    engine: Arc<dyn EngineApi>,
    registry: Arc<SessionRegistry>,
    timeout: Duration,
    /// Starting runs the program up to its first pause, so it gets longer
    start_timeout: Duration,
    poll_interval: Duration,
    ops: tokio::sync::Mutex<()>,
    shared: Mutex<Shared>,
    view: watch::Sender<DebugView>,
}

impl Inner {
    fn publish(&self, shared: &Shared) {
        self.view.send_replace(DebugView {
            phase: shared.phase,
            session: self.registry.debug().current(),
            state: shared.state.clone(),
            breakpoints: shared.breakpoints.lines(),
            error: shared.error.clone(),
        });
    }

    fn fail(&self, revert_to: Option<DebugPhase>, error: &Error) {
        let mut shared = self.shared.lock();
        if let Some(phase) = revert_to {
            shared.phase = phase;
        }
        shared.error = Some(error.to_string());
        self.publish(&shared);
    }

    /// Fetch and adopt the snapshot; caller holds `ops`
    async fn fetch_state(&self, session: &SessionId) -> Result<DebugState> {
        match with_timeout(self.timeout, self.engine.debug_state(session)).await {
            Ok(state) => {
                let mut shared = self.shared.lock();
                if shared.adopt(state.clone()) {
                    shared.stop_poller();
                }
                self.publish(&shared);
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(session = %session, "Debug state fetch failed: {}", e);
                self.fail(None, &e);
                Err(e)
            }
        }
    }

    async fn poll_once(&self, generation: u64) -> Tick {
        let Some(session) = self.registry.debug().current() else {
            return Tick::Stop;
        };

        let epoch = {
            let Ok(_ops) = self.ops.try_lock() else {
                tracing::trace!("operation in flight, skipping poll");
                return Tick::Continue;
            };
            let shared = self.shared.lock();
            if shared.generation != generation {
                return Tick::Stop;
            }
            shared.epoch
        };

        tracing::trace!(session = %session, "polling debug state");
        let state = match with_timeout(self.timeout, self.engine.debug_state(&session)).await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(session = %session, "Debug poll failed: {}", e);
                return Tick::Continue;
            }
        };

        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return Tick::Stop;
        }
        if shared.epoch != epoch {
            tracing::trace!(session = %session, "discarding stale poll");
            return Tick::Continue;
        }

        let terminated = shared.adopt(state);
        if terminated {
            // This task is the poller; detach instead of aborting itself
            shared.poller.take();
            tracing::info!(session = %session, "Debug session finished");
        }
        self.publish(&shared);

        if terminated {
            Tick::Stop
        } else {
            Tick::Continue
        }
    }
}

fn spawn_poller(inner: &Arc<Inner>, generation: u64) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let period = inner.poll_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if inner.poll_once(generation).await == Tick::Stop {
                break;
            }
        }
        tracing::trace!(generation, "debug poller stopped");
    })
}

/// Debug session state machine
///
/// State changes are published on a [`watch`] channel; see [`subscribe`].
///
/// [`subscribe`]: DebugController::subscribe
pub struct DebugController {
    inner: Arc<Inner>,
}

impl DebugController {
    pub fn new(
        engine: Arc<dyn EngineApi>,
        registry: Arc<SessionRegistry>,
        timeout: Duration,
        start_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let (view, _) = watch::channel(DebugView::idle());
        Self {
            inner: Arc::new(Inner {
                engine,
                registry,
                timeout,
                start_timeout,
                poll_interval,
                ops: tokio::sync::Mutex::new(()),
                shared: Mutex::new(Shared {
                    phase: DebugPhase::Idle,
                    state: None,
                    breakpoints: BreakpointSet::new(),
                    error: None,
                    generation: 0,
                    epoch: 0,
                    poller: None,
                }),
                view,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DebugView> {
        self.inner.view.subscribe()
    }

    pub fn view(&self) -> DebugView {
        self.inner.view.borrow().clone()
    }

    pub fn phase(&self) -> DebugPhase {
        self.inner.shared.lock().phase
    }

    pub fn session(&self) -> Option<SessionId> {
        self.inner.registry.debug().current()
    }

    pub fn breakpoints(&self) -> Vec<u32> {
        self.inner.shared.lock().breakpoints.lines()
    }

    /// Whether a poll task is scheduled
    pub fn is_polling(&self) -> bool {
        self.inner
            .shared
            .lock()
            .poller
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    /// Start a debug session for `code`
    ///
    /// Any previous session is dropped first. `breakpoints` becomes the
    /// controller's breakpoint set.
    #[tracing::instrument(skip(self, code, breakpoints), fields(bytes = code.len()))]
    pub async fn start(&self, code: &str, breakpoints: &[u32]) -> Result<DebugState> {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;

        let lines = {
            let mut shared = inner.shared.lock();
            shared.stop_poller();
            if let Some(previous) = inner.registry.debug().replace(None) {
                tracing::debug!(session = %previous, "superseding debug session");
            }
            shared.generation += 1;
            shared.epoch += 1;
            shared.breakpoints = BreakpointSet::from_lines(breakpoints.iter().copied());
            shared.state = None;
            shared.error = None;
            shared.phase = DebugPhase::Starting;
            inner.publish(&shared);
            shared.breakpoints.lines()
        };

        let started = match with_timeout(inner.start_timeout, inner.engine.debug_start(code, &lines)).await {
            Ok(started) => started,
            Err(e) => {
                tracing::warn!("Debug start failed: {}", e);
                inner.fail(Some(DebugPhase::Idle), &e);
                return Err(e);
            }
        };

        let session = started.session;
        inner.registry.debug().replace(Some(session.clone()));
        tracing::info!(session = %session, "Debug session started");

        let state = match started.state {
            Some(state) => {
                let mut shared = inner.shared.lock();
                shared.adopt(state.clone());
                inner.publish(&shared);
                Ok(state)
            }
            None => inner.fetch_state(&session).await,
        };

        if state.is_err() {
            // The session exists even if its first snapshot couldn't be read
            let mut shared = inner.shared.lock();
            shared.phase = DebugPhase::Paused;
            inner.publish(&shared);
        }

        self.ensure_poller();
        state
    }

    /// Execute one statement
    pub async fn step(&self) -> Result<DebugState> {
        self.advance(Advance::Step).await
    }

    /// Run until the next breakpoint or the end
    pub async fn resume(&self) -> Result<DebugState> {
        self.advance(Advance::Continue).await
    }

    #[tracing::instrument(skip(self))]
    async fn advance(&self, action: Advance) -> Result<DebugState> {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;
        let session = inner.registry.debug().require()?;

        let prior = {
            let mut shared = inner.shared.lock();
            let prior = shared.phase;
            shared.phase = match action {
                Advance::Step => DebugPhase::Stepping,
                Advance::Continue => DebugPhase::Continuing,
            };
            shared.epoch += 1;
            inner.publish(&shared);
            prior
        };

        let call = match action {
            Advance::Step => inner.engine.debug_step(&session),
            Advance::Continue => inner.engine.debug_continue(&session),
        };

        match with_timeout(inner.timeout, call).await {
            Ok(state) => {
                let mut shared = inner.shared.lock();
                shared.error = None;
                if shared.adopt(state.clone()) {
                    shared.stop_poller();
                    tracing::info!(session = %session, "Debug session finished");
                }
                inner.publish(&shared);
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(session = %session, "Debug {:?} failed: {}", action, e);
                inner.fail(Some(prior), &e);
                Err(e)
            }
        }
    }

    /// Replace the session's breakpoints, then refresh the state
    ///
    /// Sends the whole canonical set. The engine-confirmed set is adopted.
    #[tracing::instrument(skip(self))]
    pub async fn set_breakpoints(&self, lines: &[u32]) -> Result<Vec<u32>> {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;
        let session = inner.registry.debug().require()?;
        self.push_breakpoints(&session, BreakpointSet::from_lines(lines.iter().copied()))
            .await
    }

    /// Caller holds `ops`
    async fn push_breakpoints(&self, session: &SessionId, wanted: BreakpointSet) -> Result<Vec<u32>> {
        let inner = &self.inner;
        inner.shared.lock().epoch += 1;

        let confirmed = match with_timeout(
            inner.timeout,
            inner.engine.debug_set_breakpoints(session, &wanted.lines()),
        )
        .await
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::warn!(session = %session, "Setting breakpoints failed: {}", e);
                inner.fail(None, &e);
                return Err(e);
            }
        };

        let lines = {
            let mut shared = inner.shared.lock();
            shared.breakpoints.replace(confirmed);
            inner.publish(&shared);
            shared.breakpoints.lines()
        };
        tracing::debug!(session = %session, ?lines, "breakpoints set");

        inner.fetch_state(session).await?;
        Ok(lines)
    }

    /// Toggle a breakpoint, pushing the new set if a session is live
    ///
    /// The local toggle always happens. The returned diff is taken against
    /// the set before the toggle and covers any adjustment the engine made.
    /// If the push fails the local set is kept and the error returned.
    pub async fn toggle_breakpoint(&self, line: u32) -> Result<BreakpointDiff> {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;

        let (before, after) = {
            let mut shared = inner.shared.lock();
            let before = shared.breakpoints.clone();
            shared.breakpoints.toggle(line);
            inner.publish(&shared);
            (before, shared.breakpoints.clone())
        };

        if let Some(session) = inner.registry.debug().current() {
            self.push_breakpoints(&session, after).await?;
        }

        let shared = inner.shared.lock();
        Ok(BreakpointSet::diff(&before, &shared.breakpoints))
    }

    /// Fetch the current snapshot from the engine
    #[tracing::instrument(skip(self))]
    pub async fn refresh_state(&self) -> Result<DebugState> {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;
        let session = inner.registry.debug().require()?;
        inner.shared.lock().epoch += 1;
        inner.fetch_state(&session).await
    }

    /// Drop the session and go back to idle
    ///
    /// Breakpoints are kept. Returns whether a session was live.
    pub async fn reset(&self) -> bool {
        let inner = &self.inner;
        let _ops = inner.ops.lock().await;

        let mut shared = inner.shared.lock();
        shared.stop_poller();
        let previous = inner.registry.debug().replace(None);
        shared.generation += 1;
        shared.epoch += 1;
        shared.state = None;
        shared.error = None;
        shared.phase = DebugPhase::Idle;
        inner.publish(&shared);

        if let Some(session) = &previous {
            tracing::info!(session = %session, "Debug session reset");
        }
        previous.is_some()
    }

    fn ensure_poller(&self) {
        let inner = &self.inner;
        let mut shared = inner.shared.lock();
        let terminated = shared.state.as_ref().is_some_and(DebugState::is_terminated);
        if terminated || !inner.registry.debug().is_active() {
            return;
        }
        let generation = shared.generation;
        shared.stop_poller();
        shared.poller = Some(spawn_poller(inner, generation));
    }
}

impl Drop for DebugController {
    fn drop(&mut self) {
        self.inner.shared.lock().stop_poller();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DebugStarted, SessionKind};
    use crate::testing::{finished, paused_at, EngineCall, Endpoint, ScriptedEngine};

    fn controller(engine: &Arc<ScriptedEngine>, poll_ms: u64) -> DebugController {
        DebugController::new(
            engine.clone(),
            Arc::new(SessionRegistry::new()),
            Duration::from_millis(500),
            Duration::from_millis(1_500),
            Duration::from_millis(poll_ms),
        )
    }

    fn line(debug: &DebugController) -> Option<u32> {
        debug.view().state.and_then(|s| s.current_line())
    }

    #[tokio::test]
    async fn test_operations_require_a_session() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10_000);

        for result in [
            debug.step().await,
            debug.resume().await,
            debug.refresh_state().await,
        ] {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::SessionNotActive(SessionKind::Debug)));
            assert!(!err.is_network());
        }
        assert!(debug.set_breakpoints(&[1]).await.is_err());
        assert!(engine.calls().is_empty());
        assert_eq!(debug.phase(), DebugPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_then_step_and_continue() {
        let engine = ScriptedEngine::shared();
        engine.push_step(Ok(paused_at(2)));
        engine.push_continue(Ok(paused_at(5)));
        let debug = controller(&engine, 10_000);

        let state = debug.start("x = 1\ny = 2", &[5]).await.unwrap();
        assert!(state.paused);
        assert_eq!(debug.phase(), DebugPhase::Paused);
        assert!(debug.session().is_some());
        assert!(debug.is_polling());

        debug.step().await.unwrap();
        assert_eq!(line(&debug), Some(2));
        debug.resume().await.unwrap();
        assert_eq!(line(&debug), Some(5));
        assert_eq!(debug.phase(), DebugPhase::Paused);
    }

    #[tokio::test]
    async fn test_start_sends_canonical_breakpoints() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10_000);

        debug.start("pass", &[4, 2, 4, 0]).await.unwrap();
        assert_eq!(
            engine.calls_to(Endpoint::DebugStart),
            vec![EngineCall::DebugStart {
                code: "pass".into(),
                breakpoints: vec![2, 4],
            }]
        );
        assert_eq!(debug.breakpoints(), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_start_failure_stays_idle() {
        let engine = ScriptedEngine::shared();
        engine.push_start(Err(Error::engine("Erreur de syntaxe ligne 2")));
        let debug = controller(&engine, 10_000);

        assert!(debug.start("if", &[]).await.is_err());
        let view = debug.view();
        assert_eq!(view.phase, DebugPhase::Idle);
        assert_eq!(view.session, None);
        assert_eq!(view.error.as_deref(), Some("Erreur de syntaxe ligne 2"));
        assert!(!debug.is_polling());
    }

    #[tokio::test]
    async fn test_start_allows_longer_than_a_request() {
        let engine = ScriptedEngine::shared();
        engine.hold(Endpoint::DebugStart);
        let debug = controller(&engine, 10_000);

        // Past the 500ms request timeout, well inside the start timeout
        let (started, _) = tokio::join!(debug.start("x = 1", &[]), async {
            engine.wait_for(Endpoint::DebugStart, 1).await;
            tokio::time::sleep(Duration::from_millis(700)).await;
            engine.open(Endpoint::DebugStart);
        });
        assert!(started.unwrap().paused);
        assert_eq!(debug.phase(), DebugPhase::Paused);

        engine.hold(Endpoint::Step);
        let err = debug.step().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_start_fetches_missing_state() {
        let engine = ScriptedEngine::shared();
        engine.push_start(Ok(DebugStarted {
            session: SessionId::new("d3b9a1f0-0000"),
            state: None,
        }));
        engine.push_state(Ok(paused_at(3)));
        let debug = controller(&engine, 10_000);

        let state = debug.start("x = 1", &[3]).await.unwrap();
        assert_eq!(state.current_line(), Some(3));
        assert_eq!(
            engine.calls_to(Endpoint::State),
            vec![EngineCall::State {
                session: SessionId::new("d3b9a1f0-0000"),
            }]
        );
    }

    #[tokio::test]
    async fn test_program_finishing_at_start() {
        let engine = ScriptedEngine::shared();
        engine.push_start(Ok(DebugStarted {
            session: SessionId::new("d3b9"),
            state: Some(finished()),
        }));
        let debug = controller(&engine, 10);

        debug.start("print(1)", &[]).await.unwrap();
        assert_eq!(debug.phase(), DebugPhase::Finished);
        assert!(!debug.is_polling());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.count(Endpoint::State), 0);
    }

    #[tokio::test]
    async fn test_set_breakpoints_is_canonical_and_refreshes() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10_000);
        debug.start("x = 1", &[]).await.unwrap();

        let lines = debug.set_breakpoints(&[3, 1, 2]).await.unwrap();
        assert_eq!(lines, vec![1, 2, 3]);
        assert_eq!(debug.view().breakpoints, vec![1, 2, 3]);

        let session = debug.session().unwrap();
        assert_eq!(
            engine.calls_to(Endpoint::SetBreakpoints),
            vec![EngineCall::SetBreakpoints {
                session: session.clone(),
                breakpoints: vec![1, 2, 3],
            }]
        );
        assert_eq!(engine.count(Endpoint::State), 1);
    }

    #[tokio::test]
    async fn test_engine_confirmed_breakpoints_win() {
        let engine = ScriptedEngine::shared();
        engine.push_set_breakpoints(Ok(vec![2]));
        let debug = controller(&engine, 10_000);
        debug.start("x = 1", &[]).await.unwrap();

        debug.set_breakpoints(&[2, 40]).await.unwrap();
        assert_eq!(debug.breakpoints(), vec![2]);
    }

    #[tokio::test]
    async fn test_toggle_without_session_is_local() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10_000);

        let diff = debug.toggle_breakpoint(4).await.unwrap();
        assert_eq!(diff.added, vec![4]);
        let diff = debug.toggle_breakpoint(4).await.unwrap();
        assert_eq!(diff.removed, vec![4]);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_with_session_pushes_full_set() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10_000);
        debug.start("x = 1", &[2]).await.unwrap();

        let diff = debug.toggle_breakpoint(1).await.unwrap();
        assert_eq!(diff.added, vec![1]);
        match engine.calls_to(Endpoint::SetBreakpoints).as_slice() {
            [EngineCall::SetBreakpoints { breakpoints, .. }] => assert_eq!(breakpoints, &vec![1, 2]),
            other => panic!("unexpected calls {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_step_reverts_phase() {
        let engine = ScriptedEngine::shared();
        engine.push_step(Err(Error::Timeout(Duration::from_millis(500))));
        let debug = controller(&engine, 10_000);
        debug.start("x = 1", &[]).await.unwrap();

        assert!(debug.step().await.unwrap_err().is_network());
        let view = debug.view();
        assert_eq!(view.phase, DebugPhase::Paused);
        assert!(view.error.is_some());
        assert_eq!(view.state.and_then(|s| s.current_line()), Some(1));
        assert!(debug.session().is_some());
    }

    #[tokio::test]
    async fn test_pending_phase_is_published() {
        let engine = ScriptedEngine::shared();
        engine.hold(Endpoint::Step);
        let debug = Arc::new(controller(&engine, 10_000));
        debug.start("x = 1", &[]).await.unwrap();

        let task = tokio::spawn({
            let debug = debug.clone();
            async move { debug.step().await }
        });
        engine.wait_for(Endpoint::Step, 1).await;
        assert_eq!(debug.view().phase, DebugPhase::Stepping);

        engine.release(Endpoint::Step, 1);
        task.await.unwrap().unwrap();
        assert_eq!(debug.view().phase, DebugPhase::Paused);
    }

    #[tokio::test]
    async fn test_stale_poll_does_not_overwrite_step() {
        let engine = ScriptedEngine::shared();
        engine.hold(Endpoint::State);
        let debug = controller(&engine, 20);
        debug.start("x = 1\ny = 2\nz = 3", &[]).await.unwrap();

        // A poll goes out and stalls
        engine.wait_for(Endpoint::State, 1).await;

        engine.push_step(Ok(paused_at(3)));
        debug.step().await.unwrap();
        assert_eq!(line(&debug), Some(3));

        // The stalled poll now answers with the old position
        engine.push_state(Ok(paused_at(1)));
        engine.release(Endpoint::State, 1);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(line(&debug), Some(3));
        assert_eq!(debug.phase(), DebugPhase::Paused);
    }

    #[tokio::test]
    async fn test_poll_adopts_server_driven_pause() {
        let engine = ScriptedEngine::shared();
        engine.push_state(Ok(paused_at(7)));
        let debug = controller(&engine, 20);
        let mut views = debug.subscribe();
        debug.start("x = 1", &[7]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                views.changed().await.unwrap();
                if views.borrow().state.as_ref().and_then(|s| s.current_line()) == Some(7) {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_poller_stops_after_reset() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10);
        debug.start("x = 1", &[3]).await.unwrap();
        engine.wait_for(Endpoint::State, 1).await;

        assert!(debug.reset().await);
        let polls = engine.count(Endpoint::State);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(engine.count(Endpoint::State), polls);
        assert!(!debug.is_polling());
        let view = debug.view();
        assert_eq!(view.phase, DebugPhase::Idle);
        assert_eq!(view.session, None);
        assert_eq!(view.state, None);
        assert_eq!(view.breakpoints, vec![3]);

        assert!(!debug.reset().await);
    }

    #[tokio::test]
    async fn test_poller_stops_after_finish() {
        let engine = ScriptedEngine::shared();
        engine.push_state(Ok(finished()));
        let debug = controller(&engine, 10);
        debug.start("x = 1", &[]).await.unwrap();

        engine.wait_for(Endpoint::State, 1).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(engine.count(Endpoint::State), 1);
        assert_eq!(debug.phase(), DebugPhase::Finished);
        assert!(!debug.is_polling());
    }

    #[tokio::test]
    async fn test_new_start_supersedes_old_session() {
        let engine = ScriptedEngine::shared();
        let debug = controller(&engine, 10);

        debug.start("x = 1", &[]).await.unwrap();
        let first = debug.session().unwrap();
        debug.start("x = 2", &[]).await.unwrap();
        let second = debug.session().unwrap();
        assert_ne!(first, second);

        let seen = engine.calls().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        for call in engine.calls().into_iter().skip(seen) {
            assert_eq!(call, EngineCall::State { session: second.clone() });
        }
    }
}
