//! Client-side session state and the controllers that drive the engine

pub mod breakpoints;
pub mod debug;
pub mod history;
pub mod log;
pub mod persistence;
pub mod registry;
pub mod repl;
pub mod run;

pub use breakpoints::{BreakpointDiff, BreakpointSet};
pub use debug::{DebugController, DebugPhase, DebugView};
pub use history::HistoryBuffer;
pub use log::{LogEntry, LogEvent, LogKind, ReplLog};
pub use persistence::{BufferStore, FileStore, MemoryStore, PersistenceAdapter, BUFFER_KEY};
pub use registry::{SessionRegistry, SessionSlot};
pub use repl::{ReplController, ReplState};
pub use run::{RunExecutor, RunOutcome, RunStatus};
