//! Turn-by-turn story execution
//!
//! [`Engine::advance`] moves a [`Session`] through a compiled [`Story`] until
//! the story needs something from the outside world: player input, media
//! playback, more budget, or nothing at all because it finished. Each call
//! returns the ordered operations produced on the way and the [`Seam`] it
//! stopped at.
//!
//! The engine owns position resolution. Handlers only say where they would
//! like to go next ([`Next`]); the engine reconciles that with the frame
//! stack, pops frames whose container was left, and falls back to returns,
//! story restarts and the outro once the tree is exhausted.

pub mod checkpoint;
pub mod guard;
pub mod handlers;
pub mod ops;
pub mod scope;
pub mod session;

pub use checkpoint::Checkpoint;
pub use guard::{GuardDecision, LoopGuard};
pub use handlers::{HandlerKind, HandlerOutput, Next, StepContext};
pub use ops::{NodeInfo, Operation, StoryEvent};
pub use scope::LayeredScope;
pub use session::{Frame, FrameKind, InputState, Session};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::compiler::Story;
use crate::config::EngineConfig;
use crate::error::AdvanceError;
use crate::eval::{self, Prng};
use crate::provider::Provider;
use crate::tree::{NodeId, ROOT_ADDRESS, is_within, next_node, parent_of};

/// Return address of the outro frame; reaching it ends the story
pub const OUTRO_RETURN: &str = "@outro";

/// Root children of these kinds run once before the first turn and are
/// skipped afterwards
const INITIALIZER_KINDS: &[&str] = &["var", "set", "code", "script", "data"];

/// Why an `advance` call returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Seam {
    /// Waiting for player input
    Input,
    /// Media must play before the story continues
    Media,
    /// Budget used up; call again to continue
    Grant,
    /// The story is over
    Finish,
    /// The story failed
    Error,
}

/// Result of one `advance` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advance {
    /// Operations in emission order
    pub ops: Vec<Operation>,
    /// Where execution stopped
    pub seam: Seam,
    /// Cause of an ERROR seam
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AdvanceError>,
}

impl Advance {
    /// Spoken text bodies in this batch
    pub fn lines(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(Operation::event)
            .map(|event| event.body.as_str())
            .collect()
    }
}

/// Story executor
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the session until the next seam
    pub async fn advance(&self, story: &mut Story, session: &mut Session, provider: &dyn Provider) -> Advance {
        session.cycle += 1;
        session.time = self
            .config
            .clock
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        session.checkpoint_limit = self.config.max_checkpoints;

        if session.ended {
            return Advance {
                ops: vec![Operation::StoryEnd],
                seam: Seam::Finish,
                error: None,
            };
        }

        let rng = Prng::from_seed(&session.seed, session.cycle);
        let mut turn = Turn {
            config: &self.config,
            story,
            session,
            provider,
            rng,
            ops: Vec::new(),
        };
        let (mut seam, mut error) = turn.run().await;
        let Turn { session, mut ops, .. } = turn;

        session.commit_events();
        let position = session.address.clone().unwrap_or_default();
        if let GuardDecision::Stop(reason) = session.guard.observe(&self.config.guard, seam, &position) {
            warn!("session {} stopped by loop guard: {}", session.id, reason);
            ops.push(Operation::StoryError {
                reason: reason.clone(),
            });
            seam = Seam::Error;
            error = Some(AdvanceError::LoopDetected(reason));
        }
        if seam == Seam::Finish {
            session.ended = true;
        }
        debug!(
            "session {} cycle {} stopped at {:?} with {} op(s)",
            session.id,
            session.cycle,
            seam,
            ops.len()
        );
        Advance { ops, seam, error }
    }
}

/// Where resolution put the session
enum Landing {
    At(String),
    Finished,
}

/// One `advance` call in progress
struct Turn<'a> {
    config: &'a EngineConfig,
    story: &'a mut Story,
    session: &'a mut Session,
    provider: &'a dyn Provider,
    rng: Prng,
    ops: Vec<Operation>,
}

impl Turn<'_> {
    async fn run(&mut self) -> (Seam, Option<AdvanceError>) {
        if !self.session.started {
            self.first_turn().await;
        } else if self.session.resume {
            self.reopen();
        }
        if self.session.address.is_none() {
            self.session.address = Some(ROOT_ADDRESS.to_string());
        }

        let mut iterations = 0usize;
        loop {
            let addr = self.session.address.clone().unwrap_or_else(|| ROOT_ADDRESS.to_string());
            if addr == OUTRO_RETURN {
                self.session.stack.clear();
                self.ops.push(Operation::StoryEnd);
                return (Seam::Finish, None);
            }
            let Some(node) = self.story.tree.find(&addr) else {
                warn!("no node at address {}", addr);
                return (Seam::Error, Some(AdvanceError::NodeNotFound(addr)));
            };
            if iterations >= self.config.max_iterations {
                debug!("iteration budget spent at {}", addr);
                return (Seam::Grant, None);
            }
            iterations += 1;

            let output = if self.is_initializer(node) {
                HandlerOutput::next(Next::Skip)
            } else {
                self.execute(node).await
            };
            let emitted = output.ops.len();
            let last = output.ops.last().cloned();
            self.ops.extend(output.ops);

            if let Some(Operation::StoryError { reason }) = &last {
                warn!("story error at {}: {}", addr, reason);
                return (Seam::Error, Some(AdvanceError::Story(reason.clone())));
            }
            if let Some(frame) = output.push {
                self.session.stack.push(frame);
            }

            match self.land(node, output.next) {
                Landing::At(target) => {
                    let stalled = emitted == 0 && target == addr;
                    self.session.address = Some(target);
                    if stalled {
                        debug!("no progress at {}", addr);
                        return (Seam::Grant, None);
                    }
                }
                Landing::Finished => {
                    self.ops.push(Operation::StoryEnd);
                    return (Seam::Finish, None);
                }
            }

            match last {
                Some(Operation::GetInput { .. }) => return (Seam::Input, None),
                Some(Operation::StoryEnd) => return (Seam::Finish, None),
                Some(op) if op.is_media() => return (Seam::Media, None),
                _ => {}
            }
        }
    }

    /// Module scripts, then top-level initializers, then the start position
    async fn first_turn(&mut self) {
        self.session.started = true;

        let modules: Vec<(String, String)> = self
            .story
            .modules
            .iter()
            .map(|(namespace, source)| (namespace.clone(), source.clone()))
            .collect();
        for (namespace, source) in modules {
            let extras = self.extras();
            let mut scope = LayeredScope::new(
                &mut self.session.stack,
                &mut self.session.state,
                &self.session.meta,
                &extras,
            );
            if let Err(error) = eval::execute(&source, &mut scope, &mut self.rng) {
                warn!("module {} failed: {}", namespace, error);
            }
        }

        let root = self.story.tree.root();
        let initializers: Vec<NodeId> = self
            .story
            .tree
            .get(root)
            .children
            .iter()
            .copied()
            .filter(|child| self.is_initializer(*child))
            .collect();
        for node in initializers {
            let output = self.execute(node).await;
            if !output.ops.is_empty() {
                debug!("initializer at {} emitted {} op(s); dropped", self.story.tree.addr(node), output.ops.len());
            }
        }

        let tree = &self.story.tree;
        let origin = self
            .story
            .first_of_kind("origin")
            .map(|id| tree.addr(id).to_string());
        let start = match self.story.first_of_kind("intro") {
            Some(intro) => {
                let intro_addr = tree.addr(intro).to_string();
                let back = origin.unwrap_or_else(|| ROOT_ADDRESS.to_string());
                self.session
                    .stack
                    .push(Frame::entry(FrameKind::Intro, intro_addr.clone(), Some(back)));
                intro_addr
            }
            None => origin.unwrap_or_else(|| ROOT_ADDRESS.to_string()),
        };
        info!("session {} starting at {}", self.session.id, start);
        self.session.address = Some(start);
        if self.session.checkpoints.is_empty() {
            self.session.checkpoint_here();
        }
    }

    /// Play the resume preamble for a reopened session
    fn reopen(&mut self) {
        self.session.resume = false;
        let (Some(current), Some(resume)) = (self.session.address.clone(), self.story.first_of_kind("resume")) else {
            return;
        };
        let resume_addr = self.story.tree.addr(resume).to_string();
        debug!("session {} resuming via {}", self.session.id, resume_addr);
        self.session
            .stack
            .push(Frame::entry(FrameKind::Resume, resume_addr.clone(), Some(current)));
        self.session.address = Some(resume_addr);
    }

    fn is_initializer(&self, node: NodeId) -> bool {
        let tree = &self.story.tree;
        INITIALIZER_KINDS.contains(&tree.get(node).kind.as_str()) && parent_of(tree, node) == Some(tree.root())
    }

    fn extras(&self) -> Map<String, Value> {
        let mut extras = Map::new();
        extras.insert("turn".into(), json!(self.session.turn));
        extras.insert("cycle".into(), json!(self.session.cycle));
        extras.insert("time".into(), json!(self.session.time));
        extras
    }

    /// Check the node's syntax contract and run its handler
    async fn execute(&mut self, node: NodeId) -> HandlerOutput {
        let kind = self.story.tree.get(node).kind.clone();
        let entry = handlers::lookup(&kind);
        if let Some(attr) = entry.syntax.missing(&self.story.tree, node) {
            return HandlerOutput::error(format!("<{}> requires attribute '{}'", kind, attr));
        }
        debug!("dispatch {:?} at {}", entry.kind, self.story.tree.addr(node));
        let extras = self.extras();
        let mut ctx = StepContext {
            story: &mut *self.story,
            session: &mut *self.session,
            provider: self.provider,
            config: self.config,
            rng: &mut self.rng,
            node,
            extras,
            syntax: &entry.syntax,
        };
        handlers::dispatch(entry.kind, &mut ctx).await
    }

    /// Turn a handler's wish into the next address
    fn land(&mut self, node: NodeId, next: Next) -> Landing {
        let tree = &self.story.tree;
        let candidate = match next {
            Next::Stay => return Landing::At(tree.addr(node).to_string()),
            Next::Flow(Some(target)) => {
                let addr = tree.addr(target).to_string();
                while self
                    .session
                    .stack
                    .last()
                    .is_some_and(|frame| frame.kind != FrameKind::Yield && !is_within(&addr, &frame.container))
                {
                    self.session.stack.pop();
                }
                return Landing::At(addr);
            }
            Next::Flow(None) => return self.settle(None, false),
            Next::End => {
                self.session.stack.clear();
                self.session.loops = self.config.max_loops;
                return self.settle(None, false);
            }
            Next::Descend => next_node(tree, node, true),
            Next::Skip => next_node(tree, node, false),
            Next::Goto(target) | Next::Jump(target) => Some(target),
        };
        let target = candidate.map(|id| tree.addr(id).to_string());
        self.settle(target, matches!(next, Next::Jump(_)))
    }

    /// Pop frames the target escapes, unwinding to returns when the tree runs out
    fn settle(&mut self, mut target: Option<String>, jumping: bool) -> Landing {
        loop {
            while let (Some(addr), Some(frame)) = (target.as_deref(), self.session.stack.last()) {
                if addr == OUTRO_RETURN || frame.kind == FrameKind::Yield || is_within(addr, &frame.container) {
                    break;
                }
                let escape_preamble = jumping && matches!(frame.kind, FrameKind::Intro | FrameKind::Resume);
                if let Some(frame) = self.session.stack.pop() {
                    if !escape_preamble {
                        target = frame.return_address;
                    }
                }
            }
            if let Some(addr) = target {
                return Landing::At(addr);
            }
            match self.unwind() {
                Some(addr) => target = Some(addr),
                None => return self.finale(),
            }
        }
    }

    /// Pop frames until one has somewhere to return to
    fn unwind(&mut self) -> Option<String> {
        while let Some(frame) = self.session.stack.pop() {
            let Some(ret) = frame.return_address else {
                continue;
            };
            if frame.kind == FrameKind::Yield {
                while self
                    .session
                    .stack
                    .last()
                    .is_some_and(|below| below.kind == FrameKind::Yield && below.return_address.as_deref() == Some(ret.as_str()))
                {
                    self.session.stack.pop();
                }
            }
            return Some(ret);
        }
        None
    }

    /// Restart, play the outro, or finish
    fn finale(&mut self) -> Landing {
        if self.session.loops < self.config.max_loops {
            self.session.loops += 1;
            info!("session {} restarting story ({} of {})", self.session.id, self.session.loops, self.config.max_loops);
            return Landing::At(ROOT_ADDRESS.to_string());
        }
        if !self.session.outroed {
            if let Some(outro) = self.story.first_of_kind("outro") {
                self.session.outroed = true;
                let outro_addr = self.story.tree.addr(outro).to_string();
                self.session.stack.push(Frame::entry(
                    FrameKind::Outro,
                    outro_addr.clone(),
                    Some(OUTRO_RETURN.to_string()),
                ));
                return Landing::At(outro_addr);
            }
        }
        Landing::Finished
    }
}
