//! Integration tests for control flow: scopes, blocks, loops and jumps

mod common;

use common::{engine, play, run_until_blocked};
use taleweave::engine::{Seam, Session};
use taleweave::tree::Attributes;
use taleweave::{NullProvider, Story};

#[tokio::test]
async fn test_scope_isolation() {
    let source = r#"<set name="x" value="outer"/>
<scope><set name="x" value="inner"/><set name="temp" value="1"/><p>in {{x}}</p></scope>
<p>out {{x}} temp={{temp}}.</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["in inner", "out outer temp=."]);
    assert_eq!(session.state.get("x"), Some(&serde_json::json!("outer")));
    assert!(session.state.get("temp").is_none());
}

#[tokio::test]
async fn test_yield_parameters_vanish_after_return() {
    let source = r#"<block id="greet"><p>Hello {{name}}</p></block><yield to="greet" name="Ada"/><p>after {{name}}</p>"#;
    let (_, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["Hello Ada", "after"]);
}

#[tokio::test]
async fn test_nested_yields_sharing_a_return_collapse() {
    let source = r#"<block id="inner"><p>I</p></block>
<block id="outer"><p>O</p><yield to="inner"/></block>
<yield to="outer"/><p>T</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["O", "I", "T"]);
    assert_eq!(played.seam, Seam::Finish);
    assert!(session.stack.is_empty());
}

#[tokio::test]
async fn test_yield_with_explicit_return() {
    let source = r#"<block id="b"><p>B</p></block><yield to="b" return="tail"/><p>skipped</p><p id="tail">tail</p>"#;
    let (_, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["B", "tail"]);
}

#[tokio::test]
async fn test_blocks_are_skipped_unless_called() {
    let (_, _, played) = play(r#"<block id="b"><p>hidden</p></block><p>shown</p>"#, &NullProvider).await;
    assert_eq!(played.lines, vec!["shown"]);
}

#[tokio::test]
async fn test_jump_into_block_returns_after_it() {
    let source = r#"<jump to="b"/><p>skipped</p><block id="b"><p>inside</p></block><p>after</p>"#;
    let (_, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["inside", "after"]);
}

#[tokio::test]
async fn test_break_and_continue() {
    let source = r#"<set name="n" value="0"/>
<while cond="n < 5">
  <script>n = n + 1</script>
  <if cond="n == 2"><continue/></if>
  <if cond="n == 4"><break/></if>
  <p>n{{n}}</p>
</while>
<p>done</p>"#;
    let (_, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["n1", "n3", "done"]);
}

#[tokio::test]
async fn test_while_false_never_runs_body() {
    let (_, _, played) = play(r#"<while cond="false"><p>never</p></while><p>after</p>"#, &NullProvider).await;
    assert_eq!(played.lines, vec!["after"]);
}

#[tokio::test]
async fn test_break_pops_scopes_inside_the_loop() {
    let source = r#"<while cond="true"><scope><set name="x" value="1"/><break/></scope></while><p>x={{x}}.</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["x=."]);
    assert!(session.stack.is_empty());
}

#[tokio::test]
async fn test_break_out_of_loop_ending_a_scope() {
    let source = r#"<scope><while cond="true"><set name="x" value="1"/><p>A</p><break/></while></scope><p>X</p><p>Y {{x}}.</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["A", "X", "Y ."]);
    assert_eq!(played.seam, Seam::Finish);
    assert!(session.stack.is_empty());
    assert!(session.state.get("x").is_none());
}

#[tokio::test]
async fn test_continue_inside_a_scope_keeps_its_frame() {
    let source = r#"<scope><set name="n" value="0"/><while cond="n < 3"><script>n = n + 1</script><if cond="n == 2"><continue/></if><p>n{{n}}</p></while></scope><p>done {{n}}.</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["n1", "n3", "done ."]);
    assert!(session.stack.is_empty());
}

#[tokio::test]
async fn test_break_out_of_loop_ending_a_yielded_block() {
    let source = r#"<block id="b"><while cond="true"><p>L</p><break/></while></block><yield to="b"/><p>after</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["L", "after"]);
    assert_eq!(played.seam, Seam::Finish);
    assert!(session.stack.is_empty());
}

#[tokio::test]
async fn test_break_out_of_loop_ending_the_intro() {
    let source = r#"<intro><while cond="true"><p>hi</p><break/></while></intro><p>story</p>"#;
    let (_, session, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["hi", "story"]);
    assert!(session.stack.is_empty());
}

#[tokio::test]
async fn test_if_else_branches() {
    let source = |x: u32| {
        format!(r#"<set name="x" value="{}"/><if cond="x > 2"><p>big</p><else><p>small</p></else></if><p>end</p>"#, x)
    };
    let (_, _, big) = play(&source(3), &NullProvider).await;
    assert_eq!(big.lines, vec!["big", "end"]);
    let (_, _, small) = play(&source(1), &NullProvider).await;
    assert_eq!(small.lines, vec!["small", "end"]);
}

#[tokio::test]
async fn test_jump_forward_and_self_jump() {
    let source = r#"<p>one</p><jump to="end"/><p>skipped</p><jump id="loop" to="loop"/><p id="end">two</p>"#;
    let (_, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["one", "two"]);

    let (_, _, selfish) = play(r#"<jump id="me" to="me"/><p>next</p>"#, &NullProvider).await;
    assert_eq!(selfish.lines, vec!["next"]);
}

#[tokio::test]
async fn test_runtime_macro_rewrites_live_tree() {
    let source = r#"<p>one</p><div><macro match="npc"><rename to="p"/></macro></div><npc>two</npc>"#;
    let (story, _, played) = play(source, &NullProvider).await;
    assert_eq!(played.lines, vec!["one", "two"]);
    let tree = &story.tree;
    assert!(tree.walk(tree.root()).iter().all(|id| tree.get(*id).kind != "macro"));
}

#[tokio::test]
async fn test_runtime_include_expands_in_place() {
    let mut story = Story::from_markup(r#"<block id="lib"><p>shared</p></block><p>a</p><div></div><p>b</p>"#);
    let div = story.tree.find("0.2").unwrap();
    let include = story.tree.alloc(
        "include",
        [("id".to_string(), "lib".to_string())].into_iter().collect::<Attributes>(),
        "",
    );
    story.tree.append_child(div, include);
    story.tree.readdress();

    let mut session = Session::new(&story, "include");
    let played = run_until_blocked(&engine(), &mut story, &mut session, &NullProvider).await;
    assert_eq!(played.lines, vec!["a", "shared", "b"]);
    assert_eq!(story.tree.get(story.tree.find("0.2.0").unwrap()).kind, "p");
}

#[tokio::test]
async fn test_unknown_tags_are_inert() {
    let (_, _, played) = play(r#"<marquee><p>hidden</p></marquee><p>shown</p>"#, &NullProvider).await;
    assert_eq!(played.lines, vec!["shown"]);
    assert_eq!(played.seam, Seam::Finish);
}
