//! Variables, scripts, data loading and sleeps

use serde_json::Value;

use super::{HandlerOutput, Next, StepContext, infer_value};
use crate::compiler::{parse_payload, parse_typed_payload};
use crate::engine::ops::Operation;
use crate::eval::{self, cast};
use crate::tree::inner_text;

/// `<var name [value] [type] [options]>content</var>`
pub(super) fn var(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(name) = ctx.rendered_attr("name") else {
        return HandlerOutput::next(Next::Skip);
    };
    let content = inner_text(&ctx.story.tree, ctx.node);
    let raw = if content.trim().is_empty() {
        ctx.rendered_attr("value").unwrap_or_default()
    } else {
        ctx.render(content.trim())
    };
    let value = match ctx.attr("type") {
        Some(kind) => {
            let options = cast::enum_options(&ctx.attr("options").unwrap_or_default());
            cast::cast(Value::String(raw), Some(&kind), &options)
        }
        None => infer_value(&raw),
    };
    ctx.store(&name, value);
    HandlerOutput::next(Next::Skip)
}

/// `<script>` / `<code>`: statements against the layered scope; no output
pub(super) fn script(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let source = inner_text(&ctx.story.tree, ctx.node);
    if source.trim().is_empty() {
        return HandlerOutput::next(Next::Skip);
    }
    let addr = ctx.addr();
    let result = ctx.with_scope(|scope, rng| {
        let source = eval::interpolate(&source, &*scope);
        eval::execute(&source, scope, rng)
    });
    if let Err(error) = result {
        tracing::warn!("script at {} failed: {}", addr, error);
    }
    HandlerOutput::next(Next::Skip)
}

/// `<data key [src] [type]>`: JSON or YAML from a URL or inline content
pub(super) async fn data(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = ctx.rendered_attr("key") else {
        return HandlerOutput::next(Next::Skip);
    };
    let declared = ctx.attr("type");
    let value = match ctx.rendered_attr("src") {
        Some(url) => match ctx.provider.fetch_url(&url).await {
            Ok(fetched) => {
                let content_type = declared.unwrap_or(fetched.content_type);
                parse_typed_payload(&fetched.body, &content_type)
            }
            Err(failure) => {
                tracing::warn!("data fetch from {} failed: {}", url, failure);
                None
            }
        },
        None => {
            let content = inner_text(&ctx.story.tree, ctx.node);
            let content = ctx.with_scope(|scope, _| eval::interpolate(&content, &*scope));
            match declared {
                Some(content_type) => parse_typed_payload(&content, &content_type),
                None => parse_payload(&content),
            }
        }
    };
    if value.is_none() {
        tracing::warn!("data '{}' could not be parsed; stored null", key);
    }
    ctx.store(&key, value.unwrap_or(Value::Null));
    HandlerOutput::next(Next::Skip)
}

/// `<sleep duration>`: `1500`, `1500ms` or `1.5s`
pub(super) fn sleep(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let raw = ctx.rendered_attr("duration").unwrap_or_default();
    let Some(duration_ms) = parse_duration_ms(&raw) else {
        tracing::warn!("unusable sleep duration '{}'", raw);
        return HandlerOutput::next(Next::Skip);
    };
    ctx.session.time += i64::try_from(duration_ms).unwrap_or(i64::MAX);
    HandlerOutput::with_ops(vec![Operation::Sleep { duration_ms }], Next::Skip)
}

fn parse_duration_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_ascii_lowercase();
    let (number, scale) = if let Some(ms) = raw.strip_suffix("ms") {
        (ms, 1.0)
    } else if let Some(seconds) = raw.strip_suffix('s') {
        (seconds, 1000.0)
    } else {
        (raw.as_str(), 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| (value * scale).round() as u64)
}
