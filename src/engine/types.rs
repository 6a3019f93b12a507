//! Engine wire types
//!
//! Every request and response is a single JSON object. Response fields are
//! defaulted aggressively: the engine omits fields freely and reports
//! failures in-band (`success: false` or an `error` field).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Sessions ===

/// Opaque server-assigned session identifier
///
/// Passed back to the engine verbatim; never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which controller a session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Repl,
    Debug,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repl => write!(f, "REPL"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

// === Requests ===

/// `POST /run`
#[derive(Debug, Serialize)]
pub struct RunRequest<'a> {
    pub code: &'a str,
}

/// `POST /repl/exec`
#[derive(Debug, Serialize)]
pub struct ReplExecRequest<'a> {
    pub session_id: &'a SessionId,
    pub line: &'a str,
}

/// Body of every request that only names a session
/// (`/repl/reset`, `/debug/step`, `/debug/continue`)
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    pub session_id: &'a SessionId,
}

/// `POST /debug/start`
#[derive(Debug, Serialize)]
pub struct DebugStartRequest<'a> {
    pub code: &'a str,
    pub breakpoints: &'a [u32],
}

/// `POST /debug/set_breakpoints`
#[derive(Debug, Serialize)]
pub struct SetBreakpointsRequest<'a> {
    pub session_id: &'a SessionId,
    pub breakpoints: &'a [u32],
}

// === Responses ===

/// Reply of `/run` and `/repl/exec`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub output: String,
    /// The engine buffered the line and waits for the rest of a block
    #[serde(default)]
    pub more: bool,
}

impl ExecReply {
    pub fn ok<S: Into<String>>(output: S) -> Self {
        Self {
            success: true,
            output: output.into(),
            more: false,
        }
    }

    pub fn failed<S: Into<String>>(output: S) -> Self {
        Self {
            success: false,
            output: output.into(),
            more: false,
        }
    }
}

/// Reply of `/repl/init`
#[derive(Debug, Deserialize)]
pub struct InitResponse {
    pub session_id: Option<SessionId>,
}

/// Reply of `/debug/start`
#[derive(Debug, Deserialize)]
pub struct DebugStartResponse {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub state: Option<DebugState>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of `/debug/set_breakpoints`
#[derive(Debug, Deserialize)]
pub struct BreakpointsResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub breakpoints: Option<EngineBreakpoints>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of `/debug/step`, `/debug/continue` and `/debug/state`
#[derive(Debug, Deserialize)]
pub struct StateResponse {
    #[serde(default)]
    pub state: Option<DebugState>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of a best-effort call whose payload we only check for errors
#[derive(Debug, Default, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Successful `/debug/start`
#[derive(Debug, Clone)]
pub struct DebugStarted {
    pub session: SessionId,
    /// Initial snapshot; some engines omit it and expect a state fetch
    pub state: Option<DebugState>,
}

// === Debug state ===

/// Snapshot of a debug session
///
/// Always replaced as a whole, never merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugState {
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub callstack: Vec<Frame>,
    #[serde(default)]
    pub error: Option<String>,
    /// Program output produced so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Engine-side view of the breakpoint set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<EngineBreakpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl DebugState {
    /// Ran to completion without error
    pub fn is_finished(&self) -> bool {
        !self.paused && self.error.is_none()
    }

    /// No longer executing: finished, or stopped by an error
    pub fn is_terminated(&self) -> bool {
        !self.paused
    }

    /// Line of the innermost frame, if known
    pub fn current_line(&self) -> Option<u32> {
        self.callstack.first().and_then(|f| f.line)
    }

    /// Breakpoint lines the engine holds for this program's source
    pub fn engine_breakpoints(&self) -> Option<Vec<u32>> {
        let source = self.filename.as_deref().unwrap_or(DEFAULT_SOURCE);
        self.breakpoints.as_ref()?.lines_in(source)
    }
}

/// Source name the engine gives a program submitted without one
pub const DEFAULT_SOURCE: &str = "<stdin>";

/// Breakpoints as reported by the engine
///
/// Engines key lines by source file; a bare list is accepted too. Any other
/// shape is kept as raw JSON so it never fails the surrounding snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineBreakpoints {
    Lines(Vec<u32>),
    PerFile(BTreeMap<String, Vec<u32>>),
    Other(Value),
}

impl EngineBreakpoints {
    /// Sorted lines set in `source`, or `None` if the shape says nothing usable
    ///
    /// The engine drops files whose last breakpoint was removed, so a file
    /// missing from the map has no breakpoints.
    pub fn lines_in(&self, source: &str) -> Option<Vec<u32>> {
        let mut lines = match self {
            Self::Lines(lines) => lines.clone(),
            Self::PerFile(files) => files.get(source).cloned().unwrap_or_default(),
            Self::Other(_) => return None,
        };
        lines.sort_unstable();
        lines.dedup();
        Some(lines)
    }
}

/// One call stack frame; the engine lists the innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function.as_deref().unwrap_or("(?)"))?;
        match (&self.filename, self.line) {
            (Some(file), Some(line)) => write!(f, " at {}:{}", file, line),
            (Some(file), None) => write!(f, " at {}", file),
            (None, Some(line)) => write!(f, " at line {}", line),
            (None, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_session_id() {
        let id = SessionId::new("0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(id.short(), "0f8fad5b");
        assert_eq!(SessionId::new("abc").short(), "abc");
        assert_eq!(SessionId::new("ééééééééé").short(), "éééééééé");
    }

    #[test]
    fn test_session_request_shape() {
        let id = SessionId::new("s-1");
        let body = serde_json::to_value(ReplExecRequest {
            session_id: &id,
            line: "x = 1",
        })
        .unwrap();
        assert_eq!(body, json!({"session_id": "s-1", "line": "x = 1"}));
    }

    #[test]
    fn test_exec_reply_defaults() {
        let reply: ExecReply = serde_json::from_value(json!({"output": "boom"})).unwrap();
        assert!(!reply.success);
        assert!(!reply.more);
        assert_eq!(reply.output, "boom");
    }

    #[test]
    fn test_state_as_sent_by_engine() {
        // `/debug/state` reply body, paused inside a call
        let state: DebugState = serde_json::from_value(json!({
            "paused": true,
            "output": "15\n",
            "variables": {"x": 10, "y": 15},
            "callstack": [
                {"function": "f", "filename": "<stdin>", "line": 7, "col": 5, "locals": {"n": 3}},
                {"function": "<module>", "filename": "<stdin>", "line": 2, "col": 1, "locals": {}}
            ],
            "breakpoints": {"<stdin>": [3, 7]},
            "filename": "<stdin>"
        }))
        .unwrap();
        assert!(state.paused);
        assert_eq!(state.variables["y"], json!(15));
        assert_eq!(state.current_line(), Some(7));
        assert_eq!(state.callstack[1].function.as_deref(), Some("<module>"));
        assert_eq!(state.engine_breakpoints(), Some(vec![3, 7]));
        assert!(!state.is_finished());
    }

    #[test]
    fn test_step_state_without_filename() {
        // Step and continue states carry no filename and may have a null error
        let state: DebugState = serde_json::from_value(json!({
            "paused": false,
            "output": "",
            "error": null,
            "breakpoints": {},
            "variables": {},
            "callstack": []
        }))
        .unwrap();
        assert!(state.is_finished());
        assert_eq!(state.current_line(), None);
        assert_eq!(state.engine_breakpoints(), Some(vec![]));
    }

    #[test]
    fn test_engine_breakpoint_shapes() {
        let per_file: EngineBreakpoints =
            serde_json::from_value(json!({"<stdin>": [4, 2], "lib.ms": [9]})).unwrap();
        assert_eq!(per_file.lines_in("<stdin>"), Some(vec![2, 4]));
        assert_eq!(per_file.lines_in("other.ms"), Some(vec![]));

        let bare: EngineBreakpoints = serde_json::from_value(json!([3, 1, 3])).unwrap();
        assert_eq!(bare.lines_in("<stdin>"), Some(vec![1, 3]));

        let odd: EngineBreakpoints = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(odd.lines_in("<stdin>"), None);

        let state: DebugState =
            serde_json::from_value(json!({"paused": true, "breakpoints": {"<stdin>": "x"}})).unwrap();
        assert!(state.paused);
        assert_eq!(state.engine_breakpoints(), None);
    }

    #[test]
    fn test_finished_vs_terminated() {
        let done = DebugState::default();
        assert!(done.is_finished());
        assert!(done.is_terminated());

        let crashed = DebugState {
            error: Some("NameError".into()),
            ..Default::default()
        };
        assert!(!crashed.is_finished());
        assert!(crashed.is_terminated());
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame {
            function: Some("f".into()),
            filename: Some("<stdin>".into()),
            line: Some(4),
        };
        assert_eq!(frame.to_string(), "f at <stdin>:4");
        assert_eq!(Frame::default().to_string(), "(?)");
    }
}
