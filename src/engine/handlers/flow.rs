//! Control flow: branches, loops, jumps, blocks, scopes and runtime rewrites

use serde_json::Map;

use super::{FrameAnchors, HandlerKind, HandlerOutput, Next, StepContext, infer_value};
use crate::engine::session::{Frame, FrameKind};
use crate::rewrite::{Macro, expand_include};
use crate::tree::{NodeId, is_within, nearest_ancestor_of_type, next_node, parent_of, search_for_node};

/// `<if cond>`: then-branch, else-branch or skip
pub(super) fn branch(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let cond = ctx.attr("cond").unwrap_or_default();
    let holds = ctx.condition(&cond);
    let tree = &ctx.story.tree;
    let children = &tree.get(ctx.node).children;
    let target = if holds {
        children.iter().copied().find(|child| tree.get(*child).kind != "else")
    } else {
        children
            .iter()
            .copied()
            .find(|child| tree.get(*child).kind == "else")
            .and_then(|branch| tree.get(branch).children.first().copied())
    };
    match target {
        Some(id) => HandlerOutput::next(Next::Goto(id)),
        None => HandlerOutput::next(Next::Skip),
    }
}

/// `<while cond>`: enter the body while the condition holds
pub(super) fn repeat(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let cond = ctx.attr("cond").unwrap_or_default();
    let holds = ctx.condition(&cond);
    if holds && !ctx.story.tree.get(ctx.node).children.is_empty() {
        HandlerOutput::next(Next::Descend)
    } else {
        HandlerOutput::next(Next::Skip)
    }
}

/// `<break>` / `<continue>`: pop frames opened inside the nearest loop and
/// retarget to the loop (continue) or past it (break)
pub(super) fn loop_control(ctx: &mut StepContext<'_>, restart: bool) -> HandlerOutput {
    let tree = &ctx.story.tree;
    let Some(target) = nearest_ancestor_of_type(tree, ctx.node, &["while"]) else {
        tracing::warn!(
            "<{}> at {} is not inside a while; ignored",
            if restart { "continue" } else { "break" },
            tree.addr(ctx.node)
        );
        return HandlerOutput::next(Next::Skip);
    };
    let loop_addr = tree.addr(target).to_string();
    while let Some(frame) = ctx.session.stack.last() {
        if frame.container != loop_addr && is_within(&frame.container, &loop_addr) {
            ctx.session.stack.pop();
        } else {
            break;
        }
    }
    if restart {
        return HandlerOutput::next(Next::Flow(Some(target)));
    }
    // leaving the loop may also leave the frames around it
    match next_node(tree, target, false) {
        Some(after) => HandlerOutput::next(Next::Goto(after)),
        None => HandlerOutput::next(Next::Flow(None)),
    }
}

fn resolve_reference(ctx: &mut StepContext<'_>, name: &str) -> Option<(String, Option<NodeId>)> {
    let reference = ctx.rendered_attr(name)?;
    let reference = reference.trim().trim_start_matches('#').to_string();
    let tree = &ctx.story.tree;
    let found = search_for_node(tree, tree.root(), &reference);
    Some((reference, found))
}

/// `<jump to>`
pub(super) fn jump(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some((reference, found)) = resolve_reference(ctx, "to") else {
        return HandlerOutput::next(Next::Skip);
    };
    let tree = &ctx.story.tree;
    match found {
        None => {
            tracing::warn!("jump target '{}' not found", reference);
            HandlerOutput::next(Next::Skip)
        }
        Some(target) if target == ctx.node => {
            tracing::warn!("jump at {} targets itself; ignored", tree.addr(target));
            HandlerOutput::next(Next::Skip)
        }
        Some(target) if tree.get(target).kind == "block" => {
            let after = next_node(tree, target, false).map(|id| tree.addr(id).to_string());
            HandlerOutput::next(Next::Jump(target)).pushing(Frame::entry(
                FrameKind::Block,
                tree.addr(target),
                after,
            ))
        }
        Some(target) => HandlerOutput::next(Next::Jump(target)),
    }
}

/// `<yield to [return]>`: call a block with read-only parameters
pub(super) fn yield_to(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some((reference, found)) = resolve_reference(ctx, "to") else {
        return HandlerOutput::next(Next::Skip);
    };
    let Some(target) = found.filter(|id| ctx.story.tree.get(*id).kind == "block") else {
        tracing::warn!("yield target '{}' is not a block", reference);
        return HandlerOutput::next(Next::Skip);
    };

    let explicit_return = match resolve_reference(ctx, "return") {
        Some((name, None)) => {
            tracing::warn!("yield return '{}' not found; using the next node", name);
            None
        }
        Some((_, found)) => found,
        None => None,
    };
    let tree = &ctx.story.tree;
    let return_address = explicit_return
        .or_else(|| next_node(tree, ctx.node, false))
        .map(|id| tree.addr(id).to_string())
        .or_else(|| {
            ctx.session
                .stack
                .last()
                .and_then(|frame| frame.return_address.clone())
        });

    let names: Vec<String> = tree
        .get(ctx.node)
        .attrs
        .iter()
        .map(|(name, _)| name.to_string())
        .filter(|name| name != "to" && name != "return")
        .collect();
    let mut params = Map::new();
    for name in names {
        if let Some(value) = ctx.rendered_attr(&name) {
            params.insert(name, infer_value(&value));
        }
    }

    let container = ctx.story.tree.addr(target).to_string();
    HandlerOutput::next(Next::Goto(target)).pushing(Frame::yielding(container, return_address, params))
}

/// `<block>`: skipped unless entered through its own yield or jump frame
pub(super) fn block(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let addr = ctx.addr();
    let entered = ctx
        .session
        .stack
        .last()
        .is_some_and(|frame| matches!(frame.kind, FrameKind::Yield | FrameKind::Block) && frame.container == addr);
    if !entered {
        return HandlerOutput::next(Next::Skip);
    }
    if !ctx.story.tree.get(ctx.node).children.is_empty() {
        return HandlerOutput::next(Next::Descend);
    }
    // empty block: return straight away
    let tree = &ctx.story.tree;
    let target = ctx
        .session
        .stack
        .pop()
        .and_then(|frame| frame.return_address)
        .and_then(|addr| tree.find(&addr));
    HandlerOutput::next(Next::Flow(target))
}

/// `<scope>`: private variables for the subtree
pub(super) fn scope(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let tree = &ctx.story.tree;
    let after = next_node(tree, ctx.node, false).map(|id| tree.addr(id).to_string());
    HandlerOutput::next(Next::Descend).pushing(Frame::scope(ctx.addr(), after))
}

/// `<intro>`, `<resume>`, `<outro>`: only played inside the frame the engine opened for them
pub(super) fn preamble(ctx: &mut StepContext<'_>, kind: HandlerKind) -> HandlerOutput {
    let wanted = match kind {
        HandlerKind::Intro => FrameKind::Intro,
        HandlerKind::Resume => FrameKind::Resume,
        _ => FrameKind::Outro,
    };
    let addr = ctx.addr();
    let active = ctx
        .session
        .stack
        .last()
        .is_some_and(|frame| frame.kind == wanted && frame.container == addr);
    if active {
        HandlerOutput::next(Next::Descend)
    } else {
        HandlerOutput::next(Next::Skip)
    }
}

/// `<macro>` reached during play: splice it out and rewrite the live tree
pub(super) fn runtime_macro(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let node = ctx.node;
    let tree = &mut ctx.story.tree;
    let Some(parent) = parent_of(tree, node) else {
        return HandlerOutput::next(Next::Skip);
    };
    let position = tree
        .get(parent)
        .children
        .iter()
        .position(|child| *child == node)
        .unwrap_or(0);
    let following = next_node(tree, node, false);
    let anchors = FrameAnchors::capture(tree, &ctx.session.stack);

    let rule = Macro::from_node(tree, node);
    tree.detach(parent, node);
    match rule {
        Some(rule) => {
            let rewritten = rule.apply(tree);
            tracing::debug!("runtime macro rewrote {} node(s)", rewritten);
        }
        None => tracing::warn!("macro without selectors removed"),
    }
    tree.readdress();
    anchors.restore(tree, &mut ctx.session.stack);

    let next = following
        .filter(|id| tree.is_attached(*id))
        .or_else(|| {
            if tree.is_attached(parent) {
                tree.get(parent)
                    .children
                    .get(position)
                    .copied()
                    .or_else(|| next_node(tree, parent, false))
            } else {
                None
            }
        });
    match next {
        Some(id) => HandlerOutput::next(Next::Goto(id)),
        None => HandlerOutput::next(Next::Flow(None)),
    }
}

/// `<include>` reached during play: expand in place
pub(super) fn runtime_include(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let node = ctx.node;
    let tree = &mut ctx.story.tree;
    let Some(parent) = parent_of(tree, node) else {
        return HandlerOutput::next(Next::Skip);
    };
    let following = next_node(tree, node, false);
    let anchors = FrameAnchors::capture(tree, &ctx.session.stack);
    let placed = expand_include(tree, parent, node);
    tree.readdress();
    anchors.restore(tree, &mut ctx.session.stack);

    match placed.first().copied().or_else(|| following.filter(|id| tree.is_attached(*id))) {
        Some(id) => HandlerOutput::next(Next::Goto(id)),
        None => HandlerOutput::next(Next::Flow(None)),
    }
}
