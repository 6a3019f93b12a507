//! Append-only REPL log stream
//!
//! The controller appends; presentation layers read the entries or
//! subscribe to a broadcast of changes. Entries are never reordered or
//! removed except by an explicit clear.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of the change broadcast; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 256;

/// Kind of log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Echo of a submitted line
    Command,
    Output,
    Error,
    Info,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Output => write!(f, "output"),
            Self::Error => write!(f, "error"),
            Self::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub text: String,
    pub kind: LogKind,
}

/// Change notification sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Appended(LogEntry),
    Cleared,
}

#[derive(Debug)]
pub struct ReplLog {
    entries: Mutex<Vec<LogEntry>>,
    events: broadcast::Sender<LogEvent>,
}

impl Default for ReplLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplLog {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn append<S: Into<String>>(&self, kind: LogKind, text: S) {
        let entry = LogEntry {
            text: text.into(),
            kind,
        };
        self.entries.lock().push(entry.clone());
        // No subscribers is fine
        let _ = self.events.send(LogEvent::Appended(entry));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        let _ = self.events.send(LogEvent::Cleared);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries appended after the first `offset` ones
    pub fn since(&self, offset: usize) -> Vec<LogEntry> {
        self.entries.lock().iter().skip(offset).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// Plain-text copy of the whole log
    pub fn transcript(&self) -> String {
        self.entries
            .lock()
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let log = ReplLog::new();
        log.append(LogKind::Command, "x = 1");
        log.append(LogKind::Output, "1");
        log.append(LogKind::Error, "boom");

        let kinds: Vec<_> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LogKind::Command, LogKind::Output, LogKind::Error]);
        assert_eq!(log.transcript(), "x = 1\n1\nboom");
        assert_eq!(log.since(2).len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_appends_and_clear() {
        let log = ReplLog::new();
        let mut rx = log.subscribe();

        log.append(LogKind::Info, "REPL session: 0f8fad5b");
        log.clear();

        assert_eq!(
            rx.recv().await.unwrap(),
            LogEvent::Appended(LogEntry {
                text: "REPL session: 0f8fad5b".into(),
                kind: LogKind::Info,
            })
        );
        assert_eq!(rx.recv().await.unwrap(), LogEvent::Cleared);
        assert!(log.is_empty());
    }
}
