//! Error types for the taleweave compiler and engine
//!
//! Domain errors use thiserror. Most story-level faults are recoverable and
//! only logged; the enums here cover what callers can actually observe.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing or evaluating expressions and statements
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Source text could not be parsed
    #[error("syntax error: {message} at byte {offset}")]
    Syntax {
        /// Description of the problem
        message: String,
        /// Byte offset into the source
        offset: usize,
    },

    /// Call to a function that does not exist
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Function called with the wrong number of arguments
    #[error("function '{name}' expects {expected} argument(s), received {received}")]
    Arity {
        /// Function name
        name: String,
        /// Human readable expectation (e.g. "2" or "1..3")
        expected: String,
        /// Number of arguments supplied
        received: usize,
    },

    /// Operand or argument had an unusable type
    #[error("type error: {0}")]
    Type(String),

    /// Assignment to something that is not a path
    #[error("invalid assignment target: {0}")]
    InvalidTarget(String),
}

/// Convenience result alias for evaluator operations
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors that abort compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// No documents were supplied
    #[error("no documents to compile")]
    Empty,

    /// A document could not be read from disk
    #[error("failed to read document {path}: {source}")]
    Io {
        /// Path that failed to load
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
}

/// Convenience result alias for compiler operations
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Config file was not valid JSON for the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment override could not be parsed
    #[error("invalid value '{value}' for {key}")]
    InvalidEnv {
        /// Environment variable name
        key: String,
        /// Offending value
        value: String,
    },
}

/// Convenience result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Session manipulation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Requested checkpoint index does not exist
    #[error("checkpoint {index} not found ({available} available)")]
    CheckpointNotFound {
        /// Requested index
        index: usize,
        /// Number of checkpoints held by the session
        available: usize,
    },

    /// Session holds no checkpoints at all
    #[error("session has no checkpoints")]
    NoCheckpoints,

    /// Session could not be encoded or decoded
    #[error("session encoding failed: {0}")]
    Encoding(String),
}

/// Convenience result alias for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Reasons an `advance` call ended with the ERROR seam
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum AdvanceError {
    /// The session points at an address the tree no longer contains
    #[error("node not found at address {0}")]
    NodeNotFound(String),

    /// The story emitted an explicit story-error operation
    #[error("story error: {0}")]
    Story(String),

    /// The loop guard stopped execution
    #[error("loop detected: {0}")]
    LoopDetected(String),
}
