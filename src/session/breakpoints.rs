//! Breakpoint set
//!
//! Lines are 1-based. The set is always materialized as a deduplicated,
//! strictly ascending sequence, and every mutation reports the marker diff
//! so a gutter can be updated without a full redraw.

use std::collections::BTreeSet;

/// Lines whose gutter markers must change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointDiff {
    pub added: Vec<u32>,
    pub removed: Vec<u32>,
}

impl BreakpointDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Canonical ordered set of breakpoint lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    lines: BTreeSet<u32>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary input; duplicates and line 0 are dropped
    pub fn from_lines<I: IntoIterator<Item = u32>>(lines: I) -> Self {
        Self {
            lines: lines.into_iter().filter(|&l| l > 0).collect(),
        }
    }

    /// Add `line` if absent, remove it if present
    pub fn toggle(&mut self, line: u32) -> BreakpointDiff {
        if line == 0 {
            return BreakpointDiff::default();
        }
        if self.lines.remove(&line) {
            BreakpointDiff {
                added: Vec::new(),
                removed: vec![line],
            }
        } else {
            self.lines.insert(line);
            BreakpointDiff {
                added: vec![line],
                removed: Vec::new(),
            }
        }
    }

    /// Replace the whole set, returning what changed
    pub fn replace<I: IntoIterator<Item = u32>>(&mut self, lines: I) -> BreakpointDiff {
        let next = Self::from_lines(lines);
        let diff = Self::diff(self, &next);
        *self = next;
        diff
    }

    /// Marker changes needed to go from `prev` to `next`
    pub fn diff(prev: &BreakpointSet, next: &BreakpointSet) -> BreakpointDiff {
        BreakpointDiff {
            added: next.lines.difference(&prev.lines).copied().collect(),
            removed: prev.lines.difference(&next.lines).copied().collect(),
        }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.lines.contains(&line)
    }

    /// Ascending sequence for transmission
    pub fn lines(&self) -> Vec<u32> {
        self.lines.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) -> BreakpointDiff {
        self.replace(std::iter::empty())
    }
}
