//! Shared helpers for integration tests

#![allow(dead_code)]

use taleweave::config::{EngineConfig, GuardConfig};
use taleweave::engine::{Advance, Engine, Operation, Seam, Session};
use taleweave::error::AdvanceError;
use taleweave::provider::Provider;
use taleweave::Story;

/// Fixed story clock used by every test engine
pub const CLOCK: i64 = 1_700_000_000_000;

/// Everything produced until the story blocked on something other than
/// media playback or budget
#[derive(Debug)]
pub struct Blocked {
    pub lines: Vec<String>,
    pub ops: Vec<Operation>,
    pub seam: Seam,
    pub error: Option<AdvanceError>,
    pub calls: usize,
}

/// Engine with a fixed clock and no loop guard
pub fn engine() -> Engine {
    Engine::new(EngineConfig {
        clock: Some(CLOCK),
        guard: GuardConfig::disabled(),
        ..EngineConfig::default()
    })
}

/// Advance until INPUT, FINISH or ERROR (bounded)
pub async fn run_until_blocked(
    engine: &Engine,
    story: &mut Story,
    session: &mut Session,
    provider: &dyn Provider,
) -> Blocked {
    let mut ops = Vec::new();
    let mut calls = 0;
    loop {
        let Advance { ops: batch, seam, error } = engine.advance(story, session, provider).await;
        calls += 1;
        ops.extend(batch);
        let blocked = !matches!(seam, Seam::Media | Seam::Grant);
        if blocked || calls >= 200 {
            let lines = ops
                .iter()
                .filter_map(Operation::event)
                .map(|event| event.body.clone())
                .collect();
            return Blocked {
                lines,
                ops,
                seam,
                error,
                calls,
            };
        }
    }
}

/// Compile a markup source and play it to the first block
pub async fn play(source: &str, provider: &dyn Provider) -> (Story, Session, Blocked) {
    let mut story = Story::from_markup(source);
    let mut session = Session::new(&story, "test-seed");
    let blocked = run_until_blocked(&engine(), &mut story, &mut session, provider).await;
    (story, session, blocked)
}
