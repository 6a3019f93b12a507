//! REPL input history

/// Submitted lines plus a navigation cursor in `0..=len`
///
/// `cursor == len` is the "new empty line" position.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    entries: Vec<String>,
    cursor: usize,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted line; blank lines are ignored
    ///
    /// Returns whether the line was recorded. Recording moves the cursor
    /// back to the empty line; a blank line leaves it where it was.
    pub fn push(&mut self, line: &str) -> bool {
        let recorded = !line.trim().is_empty();
        if recorded {
            self.entries.push(line.to_string());
            self.cursor = self.entries.len();
        }
        recorded
    }

    /// Step toward older entries, stopping at the oldest
    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = self.cursor.saturating_sub(1);
        Some(self.current())
    }

    /// Step toward newer entries, ending on the empty line
    pub fn next(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1).min(self.entries.len());
        Some(self.current())
    }

    /// Entry under the cursor (empty at the end)
    pub fn current(&self) -> &str {
        self.entries.get(self.cursor).map_or("", String::as_str)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
