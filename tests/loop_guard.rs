//! Loop guard tests
//!
//! Tests that runaway stories are stopped with a loop-detected error while
//! stories that keep asking the player for input run indefinitely.

mod common;

use common::{CLOCK, run_until_blocked};
use taleweave::config::{EngineConfig, GuardConfig, WindowRule};
use taleweave::engine::Operation;
use taleweave::error::AdvanceError;
use taleweave::provider::NullProvider;
use taleweave::{Engine, Seam, Session, Story};

fn guarded(guard: GuardConfig) -> Engine {
    Engine::new(EngineConfig {
        clock: Some(CLOCK),
        guard,
        ..EngineConfig::default()
    })
}

#[tokio::test]
async fn test_repeating_address_is_stopped() {
    let mut story = Story::from_markup(r#"<while cond="true"><p>again</p></while>"#);
    let mut session = Session::new(&story, "seed");

    let blocked = run_until_blocked(&guarded(GuardConfig::default()), &mut story, &mut session, &NullProvider).await;

    assert_eq!(blocked.seam, Seam::Error);
    assert_eq!(blocked.lines, vec!["again"; 4]);
    assert!(matches!(blocked.error, Some(AdvanceError::LoopDetected(_))));
    assert!(matches!(blocked.ops.last(), Some(Operation::StoryError { .. })));
}

#[tokio::test]
async fn test_input_keeps_a_loop_alive() {
    let engine = guarded(GuardConfig::default());
    let mut story = Story::from_markup(r#"<while cond="true"><p>again</p><input key="x"/></while>"#);
    let mut session = Session::new(&story, "seed");

    for round in 0..8 {
        let blocked = run_until_blocked(&engine, &mut story, &mut session, &NullProvider).await;
        assert_eq!(blocked.seam, Seam::Input, "round {}", round);
        assert_eq!(blocked.lines, vec!["again"]);
        session.provide_input(round.to_string());
    }
    assert_eq!(session.turn, 7);
}

#[tokio::test]
async fn test_long_rule_counts_distinct_addresses() {
    let engine = guarded(GuardConfig {
        short: None,
        long: Some(WindowRule { window: 10, limit: 5 }),
    });
    let source: String = (0..8).map(|line| format!("<p>line {}</p>", line)).collect();
    let mut story = Story::from_markup(&source);
    let mut session = Session::new(&story, "seed");

    let blocked = run_until_blocked(&engine, &mut story, &mut session, &NullProvider).await;
    assert_eq!(blocked.seam, Seam::Error);
    assert_eq!(blocked.calls, 5);
    assert_eq!(blocked.lines.len(), 5);
}

#[tokio::test]
async fn test_silent_loop_yields_on_budget_then_stops() {
    let config = EngineConfig {
        clock: Some(CLOCK),
        max_iterations: 50,
        ..EngineConfig::default()
    };
    let mut story = Story::from_markup(r#"<while cond="true"><set name="x" value="1"/></while>"#);
    let mut session = Session::new(&story, "seed");

    let engine = Engine::new(EngineConfig {
        guard: GuardConfig::disabled(),
        ..config.clone()
    });
    let first = engine.advance(&mut story, &mut session, &NullProvider).await;
    assert_eq!(first.seam, Seam::Grant);
    assert!(first.ops.is_empty());

    let blocked = run_until_blocked(&Engine::new(config), &mut story, &mut session, &NullProvider).await;
    assert_eq!(blocked.seam, Seam::Error);
    assert!(blocked.calls <= 8);
    assert!(matches!(blocked.error, Some(AdvanceError::LoopDetected(_))));
}

#[tokio::test]
async fn test_error_resets_history() {
    let mut story = Story::from_markup(r#"<while cond="true"><p>again</p></while>"#);
    let mut session = Session::new(&story, "seed");
    let engine = guarded(GuardConfig::default());

    run_until_blocked(&engine, &mut story, &mut session, &NullProvider).await;
    assert!(session.guard.is_empty());

    let resumed = engine.advance(&mut story, &mut session, &NullProvider).await;
    assert_eq!(resumed.seam, Seam::Media);
}
