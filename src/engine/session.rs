//! Caller-owned session state
//!
//! A session is plain data: everything the engine needs between calls lives
//! here and round-trips through JSON. The engine never keeps state of its own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::checkpoint::Checkpoint;
use super::guard::LoopGuard;
use super::ops::StoryEvent;
use crate::compiler::{Story, VoiceMap};
use crate::error::{SessionError, SessionResult};
use crate::eval::VariationState;

const DEFAULT_CHECKPOINT_LIMIT: usize = 50;

/// Construct that pushed a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A block entered by a jump
    Block,
    /// A `<scope>` with its own variables
    Scope,
    /// A block entered through `<yield>`
    Yield,
    /// The intro, played on the first turn
    Intro,
    /// The resume preamble, played when a saved session is reopened
    Resume,
    /// The outro, played once before the end
    Outro,
}

/// Stack entry for a scope-like construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Construct type
    pub kind: FrameKind,
    /// Address of the container the frame covers
    pub container: String,
    /// Where execution continues once the frame is left
    pub return_address: Option<String>,
    /// Writable variables; `None` for read-only frames
    pub scope: Option<Map<String, Value>>,
    /// Read-only parameters
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl Frame {
    /// Read-only frame without parameters
    pub fn entry(kind: FrameKind, container: impl Into<String>, return_address: Option<String>) -> Self {
        Self {
            kind,
            container: container.into(),
            return_address,
            scope: None,
            params: Map::new(),
        }
    }

    /// Frame with an empty writable bag
    pub fn scope(container: impl Into<String>, return_address: Option<String>) -> Self {
        Self {
            scope: Some(Map::new()),
            ..Self::entry(FrameKind::Scope, container, return_address)
        }
    }

    /// Yield frame carrying block parameters
    pub fn yielding(container: impl Into<String>, return_address: Option<String>, params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Self::entry(FrameKind::Yield, container, return_address)
        }
    }
}

/// Two-phase input state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum InputState {
    /// Nothing requested
    #[default]
    Idle,
    /// The input node at `addr` asked for input
    Awaiting {
        /// Address of the requesting node
        addr: String,
    },
    /// Input was supplied for the node at `addr`
    Fulfilled {
        /// Address of the requesting node
        addr: String,
        /// Raw player text
        text: String,
    },
}

/// Everything that persists between `advance` calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identity
    pub id: Uuid,

    /// Seed for every random draw
    pub seed: String,

    /// Next node to execute
    pub address: Option<String>,

    /// Consumed player inputs
    pub turn: u64,

    /// Advance calls
    pub cycle: u64,

    /// Story clock in epoch milliseconds
    pub time: i64,

    /// Author variables
    pub state: Map<String, Value>,

    /// Story metadata visible to expressions
    pub meta: Map<String, Value>,

    /// Frame stack, innermost last
    pub stack: Vec<Frame>,

    /// Checkpoints, oldest first
    pub checkpoints: Vec<Checkpoint>,

    /// Maximum checkpoints kept
    #[serde(default = "default_checkpoint_limit")]
    pub checkpoint_limit: usize,

    /// Pending input
    #[serde(default)]
    pub input: InputState,

    /// Set by the host when a saved session is reopened
    #[serde(default)]
    pub resume: bool,

    /// Whether the outro played (or was skipped by `<exit>`)
    #[serde(default)]
    pub outroed: bool,

    /// Story restarts used
    #[serde(default)]
    pub loops: u32,

    /// Whether the first turn ran
    #[serde(default)]
    pub started: bool,

    /// Whether the story finished
    #[serde(default)]
    pub ended: bool,

    /// Word to spoken form
    #[serde(default)]
    pub pronunciations: BTreeMap<String, String>,

    /// Voice catalog for speech
    #[serde(default)]
    pub voices: VoiceMap,

    /// Text variation call-site state
    #[serde(default)]
    pub variations: VariationState,

    /// Loop guard history
    #[serde(default)]
    pub guard: LoopGuard,

    /// Events not yet committed to a checkpoint
    #[serde(default)]
    pub pending: Vec<StoryEvent>,
}

fn default_checkpoint_limit() -> usize {
    DEFAULT_CHECKPOINT_LIMIT
}

impl Session {
    /// Fresh session for a story
    pub fn new(story: &Story, seed: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seed: seed.into(),
            address: None,
            turn: 0,
            cycle: 0,
            time: 0,
            state: Map::new(),
            meta: story.meta.clone(),
            stack: Vec::new(),
            checkpoints: Vec::new(),
            checkpoint_limit: DEFAULT_CHECKPOINT_LIMIT,
            input: InputState::Idle,
            resume: false,
            outroed: false,
            loops: 0,
            started: false,
            ended: false,
            pronunciations: story.pronunciations.clone(),
            voices: story.voices.clone(),
            variations: VariationState::new(),
            guard: LoopGuard::default(),
            pending: Vec::new(),
        }
    }

    /// Supply the player's reply to the pending input request
    pub fn provide_input(&mut self, text: impl Into<String>) {
        let addr = match &self.input {
            InputState::Awaiting { addr } | InputState::Fulfilled { addr, .. } => addr.clone(),
            InputState::Idle => self.address.clone().unwrap_or_default(),
        };
        self.input = InputState::Fulfilled {
            addr,
            text: text.into(),
        };
    }

    /// Whether the story is waiting for the player
    pub fn awaiting_input(&self) -> bool {
        matches!(self.input, InputState::Awaiting { .. })
    }

    /// Mark a reloaded session so the next call plays the resume preamble
    pub fn mark_resumed(&mut self) {
        self.resume = true;
    }

    /// Record an event for the next commit
    pub fn record(&mut self, event: StoryEvent) {
        self.pending.push(event);
    }

    /// Append pending events to the newest checkpoint
    pub fn commit_events(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        if self.checkpoints.is_empty() {
            self.checkpoints.push(Checkpoint::capture(self));
        }
        let pending = std::mem::take(&mut self.pending);
        if let Some(latest) = self.checkpoints.last_mut() {
            latest.events.extend(pending);
        }
    }

    /// Take a checkpoint of the current position
    pub fn checkpoint_here(&mut self) {
        self.commit_events();
        self.checkpoints.push(Checkpoint::capture(self));
        let limit = self.checkpoint_limit.max(1);
        if self.checkpoints.len() > limit {
            let excess = self.checkpoints.len() - limit;
            self.checkpoints.drain(..excess);
        }
    }

    /// Restore checkpoint `index` and drop everything after it
    pub fn revert(&mut self, index: usize) -> SessionResult<()> {
        let available = self.checkpoints.len();
        if available == 0 {
            return Err(SessionError::NoCheckpoints);
        }
        let checkpoint = self
            .checkpoints
            .get(index)
            .cloned()
            .ok_or(SessionError::CheckpointNotFound { index, available })?;
        checkpoint.restore_into(self);
        self.checkpoints.truncate(index + 1);
        if let Some(latest) = self.checkpoints.last_mut() {
            latest.events.clear();
        }
        self.pending.clear();
        self.input = InputState::Idle;
        self.ended = false;
        self.guard = LoopGuard::default();
        tracing::debug!("reverted session {} to checkpoint {}", self.id, index);
        Ok(())
    }

    /// Undo to the checkpoint before the newest one (or the only one)
    pub fn revert_last(&mut self) -> SessionResult<()> {
        match self.checkpoints.len() {
            0 => Err(SessionError::NoCheckpoints),
            1 => self.revert(0),
            len => self.revert(len - 2),
        }
    }

    /// Every committed and pending event, oldest first
    pub fn transcript(&self) -> Vec<StoryEvent> {
        self.checkpoints
            .iter()
            .flat_map(|checkpoint| checkpoint.events.iter())
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    /// Encode as JSON
    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string(self).map_err(|error| SessionError::Encoding(error.to_string()))
    }

    /// Decode from JSON
    pub fn from_json(data: &str) -> SessionResult<Self> {
        serde_json::from_str(data).map_err(|error| SessionError::Encoding(error.to_string()))
    }
}
