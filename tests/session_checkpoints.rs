//! Session persistence tests
//!
//! Tests checkpoint creation by sections, inputs and `<checkpoint>` tags,
//! revert semantics, the retention cap, and JSON round trips of a paused
//! session.

mod common;

use serde_json::json;

use common::{CLOCK, engine, play, run_until_blocked};
use taleweave::config::{EngineConfig, GuardConfig};
use taleweave::error::SessionError;
use taleweave::provider::NullProvider;
use taleweave::{Engine, Seam, Session, Story};

fn bodies(session: &Session) -> Vec<String> {
    session.transcript().into_iter().map(|event| event.body).collect()
}

#[tokio::test]
async fn test_sections_checkpoint_and_replay_after_revert() {
    let (mut story, mut session, blocked) =
        play("<section><p>one</p></section><section><p>two</p></section>", &NullProvider).await;
    assert_eq!(blocked.lines, vec!["one", "two"]);
    assert_eq!(blocked.seam, Seam::Finish);

    let addresses: Vec<Option<String>> = session.checkpoints.iter().map(|c| c.addr.clone()).collect();
    assert_eq!(
        addresses,
        vec![Some("0".to_string()), Some("0.0".to_string()), Some("0.1".to_string())]
    );

    session.revert(2).unwrap();
    assert!(!session.ended);
    let again = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(again.lines, vec!["two"]);
    assert_eq!(bodies(&session), vec!["one", "two"]);
}

#[tokio::test]
async fn test_revert_last_undoes_the_latest_input() {
    let source = r#"<set name="n" value="0"/><p>a</p><input key="x"/><script>n = n + 1</script><p>b {{x}}</p><input key="y"/>"#;
    let (mut story, mut session, _) = play(source, &NullProvider).await;

    session.provide_input("first");
    let blocked = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(blocked.lines, vec!["b first"]);
    assert_eq!(session.state["n"], json!(1));

    session.revert_last().unwrap();
    assert_eq!(session.state["n"], json!(0));
    assert!(!session.state.contains_key("x"));
    assert_eq!(session.turn, 0);
    assert_eq!(bodies(&session), vec!["a"]);

    let asked = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(asked.seam, Seam::Input);
    assert!(asked.lines.is_empty());

    session.provide_input("second");
    let replayed = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(replayed.lines, vec!["b second"]);
    assert_eq!(session.state["n"], json!(1));
    assert_eq!(bodies(&session), vec!["a", "second", "b second"]);
}

#[tokio::test]
async fn test_checkpoint_retention_is_capped() {
    let engine = Engine::new(EngineConfig {
        clock: Some(CLOCK),
        max_checkpoints: 3,
        guard: GuardConfig::disabled(),
        ..EngineConfig::default()
    });
    let source = (0..6)
        .map(|step| format!("<checkpoint/><p>step {}</p>", step))
        .collect::<String>();
    let mut story = Story::from_markup(&source);
    let mut session = Session::new(&story, "seed");

    let blocked = run_until_blocked(&engine, &mut story, &mut session, &NullProvider).await;
    assert_eq!(blocked.lines.len(), 6);
    assert_eq!(session.checkpoints.len(), 3);
    assert_eq!(session.checkpoints[0].addr.as_deref(), Some("0.6"));
    assert!(session.checkpoints.iter().all(|checkpoint| checkpoint.time == CLOCK));
}

#[tokio::test]
async fn test_revert_rejects_unknown_checkpoints() {
    let story = Story::from_markup("<p>x</p>");
    let mut session = Session::new(&story, "seed");
    assert_eq!(session.revert(0), Err(SessionError::NoCheckpoints));

    let (_, mut session, _) = play("<p>x</p>", &NullProvider).await;
    assert_eq!(
        session.revert(9),
        Err(SessionError::CheckpointNotFound { index: 9, available: 1 })
    );
}

#[tokio::test]
async fn test_paused_session_survives_json_round_trip() {
    let source = r#"<p>Name?</p><input key="name"/><p>Hello {{name}}</p>"#;
    let (mut story, mut live, _) = play(source, &NullProvider).await;

    let mut restored = Session::from_json(&live.to_json().unwrap()).unwrap();
    assert_eq!(restored, live);

    live.provide_input("Ada");
    restored.provide_input("Ada");
    let from_live = run_until_blocked(&engine(), &mut story, &mut live, &NullProvider).await;
    let from_restored = run_until_blocked(&engine(), &mut story, &mut restored, &NullProvider).await;
    assert_eq!(from_live.lines, vec!["Hello Ada"]);
    assert_eq!(from_restored.lines, from_live.lines);
    assert_eq!(restored.state, live.state);
    assert_eq!(bodies(&restored), bodies(&live));
}

#[tokio::test]
async fn test_identical_seeds_replay_identically() {
    let source = r#"<set name="roll" value="0"/><script>roll = random_int(1, 1000)</script><p>{{roll}} [~a|b|c|d]</p>"#;
    let (_, _, first) = play(source, &NullProvider).await;
    let (_, _, second) = play(source, &NullProvider).await;
    assert_eq!(first.lines, second.lines);
}
