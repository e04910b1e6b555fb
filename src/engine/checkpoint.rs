//! Session checkpoints
//!
//! A checkpoint is an immutable copy of everything revert needs to restore.
//! Events are the only part that grows after capture: they are appended to
//! the newest checkpoint as calls pause, so a checkpoint's events are the
//! ones that happened after it was taken.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ops::StoryEvent;
use super::session::{Frame, Session};

/// Snapshot of the live session fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Address execution resumes from
    pub addr: Option<String>,

    /// Inputs consumed so far
    pub turn: u64,

    /// Advance calls so far
    pub cycle: u64,

    /// Story clock
    pub time: i64,

    /// Author variables
    pub state: Map<String, Value>,

    /// Session metadata
    pub meta: Map<String, Value>,

    /// Frame stack
    pub stack: Vec<Frame>,

    /// Whether the outro already played
    pub outroed: bool,

    /// Story restarts used
    #[serde(default)]
    pub loops: u32,

    /// Events recorded after capture
    #[serde(default)]
    pub events: Vec<StoryEvent>,

    /// Wall-clock capture time (debug only)
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Checkpoint {
    /// Capture the live fields of a session
    pub fn capture(session: &Session) -> Self {
        Self {
            addr: session.address.clone(),
            turn: session.turn,
            cycle: session.cycle,
            time: session.time,
            state: session.state.clone(),
            meta: session.meta.clone(),
            stack: session.stack.clone(),
            outroed: session.outroed,
            loops: session.loops,
            events: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Write the captured fields back into a session
    pub(crate) fn restore_into(&self, session: &mut Session) {
        session.address = self.addr.clone();
        session.turn = self.turn;
        session.cycle = self.cycle;
        session.time = self.time;
        session.state = self.state.clone();
        session.meta = self.meta.clone();
        session.stack = self.stack.clone();
        session.outroed = self.outroed;
        session.loops = self.loops;
    }
}
