//! Error types for the MicroScript client core
//!
//! Every failure a controller can observe falls into one of three runtime
//! categories (network, engine, protocol) plus the local errors of the
//! front end. Controllers turn all of them into a visible log entry or
//! status line; nothing here terminates a session.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::engine::SessionKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client core
#[derive(Error, Debug)]
pub enum Error {
    // === Network Errors ===
    #[error("Could not reach the engine: {0}")]
    Connection(String),

    #[error("Engine request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Engine sent an unreadable response: {0}")]
    InvalidResponse(String),

    // === Engine Errors ===
    #[error("{0}")]
    Engine(String),

    // === Protocol Errors ===
    #[error("No active {0} session")]
    SessionNotActive(SessionKind),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

/// Coarse classification used by the controllers and the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request rejected, timed out or undecodable
    Network,
    /// The engine answered but reported a logical failure
    Engine,
    /// Operation needs a session that does not exist; never hit the network
    Protocol,
    /// Configuration or file problems on our side
    Local,
}

impl Error {
    /// Create an engine error from a message reported by the engine
    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::Engine(message.into())
    }

    /// Create a file read error for `path`
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connection(_) | Error::Timeout(_) | Error::InvalidResponse(_) => {
                ErrorCategory::Network
            }
            Error::Engine(_) => ErrorCategory::Engine,
            Error::SessionNotActive(_) => ErrorCategory::Protocol,
            _ => ErrorCategory::Local,
        }
    }

    /// True for every failure that is reported to the user as a connection problem
    pub fn is_network(&self) -> bool {
        self.category() == ErrorCategory::Network
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Timeout(_) => "TIMEOUT",
            Error::Connection(_) | Error::InvalidResponse(_) => "NETWORK_ERROR",
            Error::Engine(_) => "ENGINE_ERROR",
            Error::SessionNotActive(_) => "SESSION_NOT_ACTIVE",
            Error::Config(_) | Error::ConfigParse(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::InvalidResponse(e.to_string())
        } else {
            Error::Connection(e.to_string())
        }
    }
}
