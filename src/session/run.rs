//! One-shot execution

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::{with_timeout, EngineApi};

/// Shown instead of an empty output
pub const NO_OUTPUT: &str = "(no output)";

/// Shown for every transport-level failure, timeouts included
pub const CONNECTION_FAILED: &str = "Connection to the engine failed.";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// The engine ran the code and reported failure
    Failed,
    /// Rejected, timed out or unreadable; the engine's verdict is unknown
    ConnectionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub output: String,
    /// Client-measured round trip
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Output as displayed, with the empty-output placeholder
    pub fn display_output(&self) -> &str {
        if self.output.is_empty() {
            NO_OUTPUT
        } else {
            &self.output
        }
    }

    /// Output followed by the elapsed time, for run-with-timing
    pub fn timed_report(&self) -> String {
        format!("{}\n\n⏱ {:.1} ms", self.display_output(), self.elapsed_ms())
    }
}

/// Sends whole programs to `/run`
pub struct RunExecutor {
    engine: Arc<dyn EngineApi>,
    timeout: Duration,
}

impl RunExecutor {
    pub fn new(engine: Arc<dyn EngineApi>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `code` with the configured timeout
    pub async fn execute(&self, code: &str) -> RunOutcome {
        self.execute_with_timeout(code, self.timeout).await
    }

    #[tracing::instrument(skip(self, code), fields(bytes = code.len()))]
    pub async fn execute_with_timeout(&self, code: &str, timeout: Duration) -> RunOutcome {
        let started = Instant::now();
        let result = with_timeout(timeout, self.engine.run(code)).await;
        let elapsed = started.elapsed();

        match result {
            Ok(reply) => {
                let status = if reply.success {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed
                };
                tracing::debug!(?status, elapsed_ms = elapsed.as_millis() as u64, "run finished");
                RunOutcome {
                    status,
                    output: reply.output,
                    elapsed,
                }
            }
            Err(e) => {
                tracing::warn!("Run failed: {}", e);
                RunOutcome {
                    status: RunStatus::ConnectionFailed,
                    output: CONNECTION_FAILED.to_string(),
                    elapsed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::engine::ExecReply;
    use crate::testing::{Endpoint, ScriptedEngine};

    fn executor(engine: &Arc<ScriptedEngine>, timeout_ms: u64) -> RunExecutor {
        RunExecutor::new(engine.clone(), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_successful_run_keeps_output_verbatim() {
        let engine = ScriptedEngine::shared();
        engine.push_run(Ok(ExecReply::ok("1\n")));

        let outcome = executor(&engine, 1000).execute("print(1)").await;
        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert!(outcome.success());
        assert_eq!(outcome.output, "1\n");
    }

    #[tokio::test]
    async fn test_engine_failure_is_not_a_connection_failure() {
        let engine = ScriptedEngine::shared();
        engine.push_run(Ok(ExecReply::failed("Erreur : nom inconnu 'z'")));

        let outcome = executor(&engine, 1000).execute("print(z)").await;
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.output, "Erreur : nom inconnu 'z'");
    }

    #[tokio::test]
    async fn test_transport_error_is_connection_failure() {
        let engine = ScriptedEngine::shared();
        engine.push_run(Err(Error::Connection("connection refused".into())));

        let outcome = executor(&engine, 1000).execute("print(1)").await;
        assert_eq!(outcome.status, RunStatus::ConnectionFailed);
        assert_eq!(outcome.output, CONNECTION_FAILED);
    }

    #[tokio::test]
    async fn test_timeout_aborts_the_call() {
        let engine = ScriptedEngine::shared();
        engine.hold(Endpoint::Run);

        let started = Instant::now();
        let outcome = executor(&engine, 50).execute("while True: pass").await;

        assert_eq!(outcome.status, RunStatus::ConnectionFailed);
        assert!(started.elapsed() < Duration::from_secs(2));
        // The dropped request no longer counts as outstanding
        assert_eq!(engine.in_flight(Endpoint::Run), 0);
    }

    #[test]
    fn test_timed_report() {
        let outcome = RunOutcome {
            status: RunStatus::Succeeded,
            output: String::new(),
            elapsed: Duration::from_micros(12_345),
        };
        assert_eq!(outcome.display_output(), NO_OUTPUT);
        assert_eq!(outcome.timed_report(), "(no output)\n\n⏱ 12.3 ms");
    }
}
