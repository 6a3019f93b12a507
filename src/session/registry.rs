//! Live session identities
//!
//! The registry holds at most one REPL session id and one debug session id.
//! It is owned by the top-level [`Workbench`](crate::workbench::Workbench)
//! and shared with the controllers; only the owning controller writes a slot.

use parking_lot::RwLock;

use crate::common::{Error, Result};
use crate::engine::{SessionId, SessionKind};

/// One session slot
#[derive(Debug)]
pub struct SessionSlot {
    kind: SessionKind,
    current: RwLock<Option<SessionId>>,
}

impl SessionSlot {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            current: RwLock::new(None),
        }
    }

    pub fn current(&self) -> Option<SessionId> {
        self.current.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    /// The live session, or the local "no active session" error
    pub fn require(&self) -> Result<SessionId> {
        self.current().ok_or(Error::SessionNotActive(self.kind))
    }

    /// Install (or clear) the session, returning the previous one
    pub(crate) fn replace(&self, session: Option<SessionId>) -> Option<SessionId> {
        std::mem::replace(&mut *self.current.write(), session)
    }

    /// Clear the slot only if it still holds `session`
    pub(crate) fn clear_if(&self, session: &SessionId) -> bool {
        let mut current = self.current.write();
        if current.as_ref() == Some(session) {
            *current = None;
            true
        } else {
            false
        }
    }
}

/// Session ids for both interaction modes
#[derive(Debug)]
pub struct SessionRegistry {
    repl: SessionSlot,
    debug: SessionSlot,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            repl: SessionSlot::new(SessionKind::Repl),
            debug: SessionSlot::new(SessionKind::Debug),
        }
    }

    pub fn repl(&self) -> &SessionSlot {
        &self.repl
    }

    pub fn debug(&self) -> &SessionSlot {
        &self.debug
    }
}
