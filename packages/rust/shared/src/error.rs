//! Error types for Prospector.
//!
//! Library crates use [`ProspectorError`] via `thiserror`.
//! Capability ports report [`PortError`], which the pipeline never lets
//! escape a stage: it is folded into a failure [`Event`](crate::Event).
//! The CLI wraps everything with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level error type for all Prospector operations.
#[derive(Debug, thiserror::Error)]
pub enum ProspectorError {
    /// Configuration loading or validation error (including run parameters).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of a port call (e.g. client construction).
    #[error("network error: {0}")]
    Network(String),

    /// Parsing error (TOML, JSON, stored rows).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid identity key, bad bundle owner, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A capability port failed outside of a stage.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProspectorError>;

impl ProspectorError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// PortError
// ---------------------------------------------------------------------------

/// Failure of a single capability port call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    /// The external call itself failed (network, auth, rate limit, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The port answered, but the payload failed validation.
    #[error("schema error: {0}")]
    Schema(String),

    /// The call did not finish within the configured port timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl PortError {
    /// Create a transport error from any displayable message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Classification carried on failure events.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Schema(_) => FailureKind::Schema,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Why a record (or batch) failed, as recorded on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Schema,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Schema => "schema",
            Self::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for FailureKind {
    type Err = ProspectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transport" => Ok(Self::Transport),
            "schema" => Ok(Self::Schema),
            "timeout" => Ok(Self::Timeout),
            other => Err(ProspectorError::parse(format!("unknown failure kind '{other}'"))),
        }
    }
}
