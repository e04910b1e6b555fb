//! Two-phase `<input>`
//!
//! The first visit checkpoints, emits `get-input` and parks the session on
//! the node. Once the host supplies text for that node, the second visit
//! records the reply, extracts the declared fields and moves on.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::fields::{self, Field};
use super::{HandlerOutput, Next, StepContext};
use crate::engine::ops::Operation;
use crate::engine::session::InputState;
use crate::provider::JsonRequest;

const PLAYER: &str = "player";

/// `<input [key] [scope] [type] [description] [pattern] [default]>`
pub(super) async fn input(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let addr = ctx.addr();
    match ctx.session.input.clone() {
        InputState::Fulfilled { addr: requested, text } if requested == addr => consume(ctx, text).await,
        InputState::Awaiting { addr: requested } if requested == addr => request(ctx, addr, false),
        _ => request(ctx, addr, true),
    }
}

fn request(ctx: &mut StepContext<'_>, addr: String, fresh: bool) -> HandlerOutput {
    if fresh {
        ctx.checkpoint();
    }
    let names: Vec<String> = ctx
        .story
        .tree
        .get(ctx.node)
        .attrs
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();
    let mut attributes = BTreeMap::new();
    for name in names {
        if let Some(value) = ctx.rendered_attr(&name) {
            attributes.insert(name, value);
        }
    }
    ctx.session.input = InputState::Awaiting { addr };
    HandlerOutput::with_ops(vec![Operation::GetInput { attributes }], Next::Stay)
}

async fn consume(ctx: &mut StepContext<'_>, raw: String) -> HandlerOutput {
    let key = ctx.rendered_attr("key").unwrap_or_else(|| "input".to_string());
    let event = ctx.event(raw.clone(), PLAYER.to_string(), Vec::new(), Vec::new());
    ctx.session.record(event);

    let attrs = ctx.story.tree.get(ctx.node).attrs.clone();
    let declared = fields::collect(&attrs, &key);
    let scalar = declared.len() == 1 && declared[0].name == key;
    let value = extract(ctx, &declared, scalar, &raw).await;

    if let (false, Value::Object(object)) = (scalar, &value) {
        for field in &declared {
            if let Some(extracted) = object.get(&field.name) {
                ctx.store(&field.name, extracted.clone());
            }
        }
    }
    ctx.store(&key, value);
    ctx.session.input = InputState::Idle;
    ctx.session.turn += 1;
    HandlerOutput::next(Next::Skip)
}

async fn extract(ctx: &mut StepContext<'_>, declared: &[Field], scalar: bool, raw: &str) -> Value {
    if let Ok(object @ Value::Object(_)) = serde_json::from_str::<Value>(raw.trim()) {
        return object;
    }
    if !fields::needs_generation(declared) {
        return match scalar {
            true => declared[0].parse_local(raw),
            false => Value::Object(local_object(declared, raw)),
        };
    }

    let request = JsonRequest {
        prompt: format!(
            "Extract the requested fields from the player's reply. Use null for anything the reply does not say.\n\nReply: {}",
            raw.trim()
        ),
        schema: fields::schema(declared),
        models: ctx.models(),
    };
    let generated = match ctx.provider.generate_json(&request).await {
        Ok(generated) if generated.is_object() => Some(fields::conform(declared, &generated)),
        Ok(other) => {
            tracing::warn!("input extraction returned a non-object: {}", other);
            None
        }
        Err(failure) => {
            tracing::warn!("input extraction failed: {}", failure);
            None
        }
    };
    match (generated, scalar) {
        (Some(mut object), true) => object.remove(&declared[0].name).unwrap_or(Value::Null),
        (Some(object), false) => Value::Object(object),
        (None, true) => declared[0].parse_local(raw),
        (None, false) => Value::Object(declared.iter().map(|field| (field.name.clone(), field.fallback())).collect()),
    }
}

fn local_object(declared: &[Field], raw: &str) -> Map<String, Value> {
    declared
        .iter()
        .map(|field| (field.name.clone(), field.parse_local(raw)))
        .collect()
}
