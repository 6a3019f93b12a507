//! HTTP client for the execution engine
//!
//! Non-2xx responses still carry a JSON body describing the failure, so
//! bodies are decoded regardless of status and the status only decides
//! between engine-reported failure and success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{config::Config, Error, Result};

use super::types::*;
use super::EngineApi;

/// Engine client over JSON/HTTP
#[derive(Clone)]
pub struct HttpEngine {
    http: reqwest::Client,
    base_url: String,
}

/// Decoded response body with the HTTP status it came with
struct Reply<T> {
    status: StatusCode,
    body: T,
}

impl<T> Reply<T> {
    fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

fn http_failure(status: StatusCode) -> Error {
    Error::engine(format!("Engine returned HTTP {}", status))
}

impl HttpEngine {
    /// Create a client for the engine at `base_url`
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("microscript/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.engine.base_url, config.timeouts.connect())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Reply<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(path, "engine request");
        let response = self.http.post(self.url(path)).json(body).send().await?;
        Self::decode(path, response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Reply<T>> {
        tracing::debug!(path, "engine request");
        let response = self.http.get(self.url(path)).query(query).send().await?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<Reply<T>> {
        let status = response.status();
        let text = response.text().await?;
        tracing::trace!(path, %status, body = %text, "engine response");

        // An empty body is an empty object; anything else must be JSON
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        let body = serde_json::from_str(text).map_err(|e| {
            Error::InvalidResponse(format!("{} (HTTP {}): {}", path, status, e))
        })?;

        Ok(Reply { status, body })
    }

    fn exec_reply(reply: Reply<ExecReply>) -> ExecReply {
        let ok = reply.is_success();
        let mut body = reply.body;
        body.success &= ok;
        body
    }

    fn state_from(reply: Reply<StateResponse>, action: &str) -> Result<DebugState> {
        if let Some(error) = reply.body.error {
            return Err(Error::Engine(error));
        }
        match reply.body.state {
            Some(state) if reply.status.is_success() => Ok(state),
            Some(_) => Err(http_failure(reply.status)),
            None if !reply.status.is_success() => Err(http_failure(reply.status)),
            None => Err(Error::InvalidResponse(format!("{} reply has no state", action))),
        }
    }
}

#[async_trait]
impl EngineApi for HttpEngine {
    async fn run(&self, code: &str) -> Result<ExecReply> {
        let reply = self.post("/run", &RunRequest { code }).await?;
        Ok(Self::exec_reply(reply))
    }

    async fn repl_init(&self) -> Result<SessionId> {
        let reply: Reply<InitResponse> = self.post("/repl/init", &serde_json::json!({})).await?;
        match reply.body.session_id {
            Some(id) if reply.status.is_success() => Ok(id),
            _ if !reply.status.is_success() => Err(http_failure(reply.status)),
            _ => Err(Error::InvalidResponse("repl/init reply has no session_id".into())),
        }
    }

    async fn repl_exec(&self, session: &SessionId, line: &str) -> Result<ExecReply> {
        let request = ReplExecRequest {
            session_id: session,
            line,
        };
        let reply = self.post("/repl/exec", &request).await?;
        Ok(Self::exec_reply(reply))
    }

    async fn repl_reset(&self, session: &SessionId) -> Result<()> {
        let reply: Reply<AckResponse> = self
            .post("/repl/reset", &SessionRequest { session_id: session })
            .await?;
        if let Some(error) = reply.body.error {
            return Err(Error::Engine(error));
        }
        if !reply.is_success() || reply.body.success == Some(false) {
            return Err(match reply.body.output {
                Some(output) if !output.is_empty() => Error::Engine(output),
                _ => http_failure(reply.status),
            });
        }
        Ok(())
    }

    async fn debug_start(&self, code: &str, breakpoints: &[u32]) -> Result<DebugStarted> {
        let reply: Reply<DebugStartResponse> = self
            .post("/debug/start", &DebugStartRequest { code, breakpoints })
            .await?;
        if let Some(error) = reply.body.error {
            return Err(Error::Engine(error));
        }
        if !reply.is_success() {
            return Err(http_failure(reply.status));
        }
        let session = reply
            .body
            .session_id
            .ok_or_else(|| Error::InvalidResponse("debug/start reply has no session_id".into()))?;
        Ok(DebugStarted {
            session,
            state: reply.body.state,
        })
    }

    async fn debug_set_breakpoints(&self, session: &SessionId, breakpoints: &[u32]) -> Result<Vec<u32>> {
        let request = SetBreakpointsRequest {
            session_id: session,
            breakpoints,
        };
        let reply: Reply<BreakpointsResponse> = self.post("/debug/set_breakpoints", &request).await?;
        if let Some(error) = reply.body.error {
            return Err(Error::Engine(error));
        }
        if !reply.is_success() {
            return Err(http_failure(reply.status));
        }
        if reply.body.ok == Some(false) {
            return Err(Error::Engine("Breakpoints were not accepted".to_string()));
        }
        // The engine runs debug programs under the default source name
        Ok(reply
            .body
            .breakpoints
            .and_then(|b| b.lines_in(DEFAULT_SOURCE))
            .unwrap_or_else(|| breakpoints.to_vec()))
    }

    async fn debug_step(&self, session: &SessionId) -> Result<DebugState> {
        let reply = self
            .post("/debug/step", &SessionRequest { session_id: session })
            .await?;
        Self::state_from(reply, "debug/step")
    }

    async fn debug_continue(&self, session: &SessionId) -> Result<DebugState> {
        let reply = self
            .post("/debug/continue", &SessionRequest { session_id: session })
            .await?;
        Self::state_from(reply, "debug/continue")
    }

    async fn debug_state(&self, session: &SessionId) -> Result<DebugState> {
        let reply = self
            .get("/debug/state", &[("session_id", session.as_str())])
            .await?;
        Self::state_from(reply, "debug/state")
    }

    async fn health(&self) -> Result<()> {
        let reply: Reply<serde_json::Value> = self.get("/health", &[]).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(http_failure(reply.status))
        }
    }
}
