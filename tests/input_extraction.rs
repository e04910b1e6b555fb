//! Player input tests
//!
//! Tests the two-phase input protocol and how replies become variables:
//! local parsing for plain fields, structured generation for described or
//! multi-field inputs, and the fallbacks in between.

mod common;

use serde_json::json;

use common::{engine, play, run_until_blocked};
use taleweave::engine::{InputState, Operation};
use taleweave::provider::{NullProvider, Provider, ProviderCall, ScriptedProvider};
use taleweave::{Seam, Session, Story};

async fn reply(story: &mut Story, session: &mut Session, provider: &dyn Provider, text: &str) -> common::Blocked {
    session.provide_input(text);
    run_until_blocked(&engine(), story, session, provider).await
}

fn json_calls(provider: &ScriptedProvider) -> usize {
    provider.count(|call| matches!(call, ProviderCall::Json(_)))
}

#[tokio::test]
async fn test_plain_field_stores_trimmed_text() {
    let provider = ScriptedProvider::new();
    let (mut story, mut session, blocked) = play(r#"<input key="name"/><p>Hi {{name}}</p>"#, &provider).await;
    assert_eq!(blocked.seam, Seam::Input);
    assert!(session.awaiting_input());

    let after = reply(&mut story, &mut session, &provider, "  Ada  ").await;
    assert_eq!(after.lines, vec!["Hi Ada"]);
    assert_eq!(session.state["name"], json!("Ada"));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_get_input_carries_rendered_attributes() {
    let (_, session, blocked) = play(
        r#"<set name="who" value="stranger"/><input key="name" prompt="Your name, {{who}}?"/>"#,
        &NullProvider,
    )
    .await;
    let Some(Operation::GetInput { attributes }) = blocked.ops.last() else {
        panic!("expected get-input, got {:?}", blocked.ops);
    };
    assert_eq!(attributes["prompt"], "Your name, stranger?");
    assert_eq!(attributes["key"], "name");
    assert_eq!(session.input, InputState::Awaiting { addr: "0.1".into() });
}

#[tokio::test]
async fn test_typed_and_enum_fields_cast_locally() {
    let (mut story, mut session, _) = play(
        r#"<input key="age" type="integer"/><input key="mood" options="calm|angry"/><p>{{age}} {{mood}}</p>"#,
        &NullProvider,
    )
    .await;
    reply(&mut story, &mut session, &NullProvider, "42.9").await;
    let after = reply(&mut story, &mut session, &NullProvider, "I am so ANGRY").await;

    assert_eq!(session.state["age"], json!(42));
    assert_eq!(session.state["mood"], json!("angry"));
    assert_eq!(after.lines, vec!["42 angry"]);
    assert_eq!(session.turn, 2);
}

#[tokio::test]
async fn test_pattern_failure_falls_back_to_default() {
    let source = r#"<input key="room" pattern="room ([0-9]+)" default="lobby"/><p>{{room}}</p>"#;

    let (mut story, mut session, _) = play(source, &NullProvider).await;
    let matched = reply(&mut story, &mut session, &NullProvider, "take me to room 512 please").await;
    assert_eq!(matched.lines, vec!["512"]);

    let (mut story, mut session, _) = play(source, &NullProvider).await;
    let missed = reply(&mut story, &mut session, &NullProvider, "anywhere").await;
    assert_eq!(missed.lines, vec!["lobby"]);
}

#[tokio::test]
async fn test_described_field_uses_structured_generation() {
    let provider = ScriptedProvider::new().with_json(json!({"mood": "wistful"}));
    let (mut story, mut session, _) = play(
        r#"<input key="mood" description="How the player feels"/><p>You feel {{mood}}.</p>"#,
        &provider,
    )
    .await;
    let after = reply(&mut story, &mut session, &provider, "kind of sad, remembering home").await;

    assert_eq!(after.lines, vec!["You feel wistful."]);
    assert_eq!(json_calls(&provider), 1);
    let Some(ProviderCall::Json(request)) = provider.calls().into_iter().next() else {
        panic!("expected a json call");
    };
    assert_eq!(request.schema["required"], json!(["mood"]));
    assert_eq!(request.schema["properties"]["mood"]["description"], json!("How the player feels"));
}

#[tokio::test]
async fn test_multiple_fields_store_object_and_members() {
    let provider = ScriptedProvider::new().with_json(json!({"name": "Ada", "age": "36"}));
    let (mut story, mut session, _) = play(
        r#"<input key="profile" name.type="string" age.type="integer"/><p>{{profile.name}} is {{age}}</p>"#,
        &provider,
    )
    .await;
    let after = reply(&mut story, &mut session, &provider, "I'm Ada and I'm thirty six").await;

    assert_eq!(session.state["profile"], json!({"name": "Ada", "age": 36}));
    assert_eq!(session.state["name"], json!("Ada"));
    assert_eq!(after.lines, vec!["Ada is 36"]);
}

#[tokio::test]
async fn test_failed_generation_uses_field_defaults() {
    let provider = ScriptedProvider::new().with_json_failure("offline");
    let (mut story, mut session, _) = play(
        r#"<input key="order" dish.default="soup" count.type="integer"/><p>done</p>"#,
        &provider,
    )
    .await;
    let after = reply(&mut story, &mut session, &provider, "two burgers").await;

    assert_eq!(after.lines, vec!["done"]);
    assert_eq!(session.state["order"], json!({"dish": "soup", "count": null}));
    assert_eq!(json_calls(&provider), 1);
}

#[tokio::test]
async fn test_json_reply_passes_through() {
    let provider = ScriptedProvider::new();
    let (mut story, mut session, _) = play(
        r#"<input key="pick" description="A choice"/><p>{{pick.door}}</p>"#,
        &provider,
    )
    .await;
    let after = reply(&mut story, &mut session, &provider, r#"{"door": "left"}"#).await;

    assert_eq!(after.lines, vec!["left"]);
    assert_eq!(json_calls(&provider), 0);
}

#[tokio::test]
async fn test_global_scope_escapes_local_frames() {
    let (mut story, mut session, _) = play(
        r#"<scope><input key="kept" scope="global"/><input key="lost"/></scope><p>{{kept}}/{{lost}}</p>"#,
        &NullProvider,
    )
    .await;
    reply(&mut story, &mut session, &NullProvider, "yes").await;
    let after = reply(&mut story, &mut session, &NullProvider, "no").await;

    assert_eq!(after.lines, vec!["yes/"]);
    assert_eq!(session.state["kept"], json!("yes"));
    assert!(!session.state.contains_key("lost"));
}

#[tokio::test]
async fn test_reply_is_recorded_as_player_event() {
    let (mut story, mut session, _) = play(r#"<p>Who goes there?</p><input key="answer"/>"#, &NullProvider).await;
    reply(&mut story, &mut session, &NullProvider, "a friend").await;

    let transcript = session.transcript();
    let spoken: Vec<(&str, &str)> = transcript
        .iter()
        .map(|event| (event.from.as_str(), event.body.as_str()))
        .collect();
    assert_eq!(spoken, vec![("narrator", "Who goes there?"), ("player", "a friend")]);
}

#[tokio::test]
async fn test_repeated_visit_without_reply_asks_again() {
    let (mut story, mut session, first) = play(r#"<input key="x"/>"#, &NullProvider).await;
    let checkpoints = session.checkpoints.len();

    let again = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(first.seam, Seam::Input);
    assert_eq!(again.seam, Seam::Input);
    assert!(matches!(again.ops.as_slice(), [Operation::GetInput { .. }]));
    assert_eq!(session.checkpoints.len(), checkpoints);
}
