//! Taleweave – compiler and turn-by-turn engine for interactive audio fiction
//!
//! Authors write lenient markup describing narrative flow, variables and calls
//! to generative services. This crate provides:
//! - A compiler that merges documents into one addressed node tree, expands
//!   includes and macros, and extracts pronunciations, voices and metadata
//! - An expression and template language with a seeded random library
//! - An execution engine that steps a serializable session through the tree
//!   one turn at a time, emitting ordered playback operations
//! - Checkpoints with revert, and a loop guard against runaway stories
//!
//! Generative capabilities (text, speech, images, sounds) sit behind the
//! [`provider::Provider`] trait; the crate never talks to a service directly.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Engine and compiler configuration
pub mod config;

/// Error types
pub mod error;

/// Addressed node tree and traversal
pub mod tree;

/// Markup parser
pub mod markup;

/// Expressions, statements and templates
pub mod eval;

/// Macro and include rewriting
pub mod rewrite;

/// Document compilation
pub mod compiler;

/// Generative provider boundary
pub mod provider;

/// Story execution
pub mod engine;

pub use compiler::{Document, Story, compile};
pub use config::{CompileConfig, EngineConfig, GuardConfig};
pub use engine::{Advance, Engine, Operation, Seam, Session, StoryEvent};
pub use error::{AdvanceError, CompileError, SessionError};
pub use provider::{NullProvider, Provider, ScriptedProvider};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
