//! Sound, music and images

use serde_json::Value;

use super::{HandlerKind, HandlerOutput, Next, StepContext};
use crate::engine::ops::Operation;
use crate::provider::MediaRequest;

/// `<sound>`, `<audio>`, `<music>`, `<image>`
pub(super) async fn media(ctx: &mut StepContext<'_>, kind: HandlerKind) -> HandlerOutput {
    let direct = ctx.rendered_attr("src").filter(|src| !src.trim().is_empty());
    let url = match direct {
        Some(src) => Some(src.trim().to_string()),
        None => generate(ctx, kind).await,
    };
    let Some(url) = url else {
        return HandlerOutput::next(Next::Skip);
    };
    if let Some(key) = ctx.rendered_attr("key") {
        ctx.store(&key, Value::String(url.clone()));
    }

    let op = match kind {
        HandlerKind::Image => Operation::ShowMedia { media: url },
        _ => Operation::PlayMedia {
            media: url,
            volume: number(ctx, "volume"),
            fade_in_ms: number(ctx, "fade-in").map(|ms| ms.round() as u64),
            fade_duration_ms: number(ctx, "fade").map(|ms| ms.round() as u64),
            background: match ctx.rendered_attr("background") {
                Some(flag) => !matches!(flag.trim(), "false" | "no" | "0"),
                None => kind == HandlerKind::Music,
            },
            event: None,
        },
    };
    HandlerOutput::with_ops(vec![op], Next::Skip)
}

fn number(ctx: &mut StepContext<'_>, name: &str) -> Option<f64> {
    let raw = ctx.rendered_attr(name)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        _ => {
            tracing::warn!("ignoring {}='{}' on media at {}", name, raw, ctx.addr());
            None
        }
    }
}

async fn generate(ctx: &mut StepContext<'_>, kind: HandlerKind) -> Option<String> {
    let prompt = match ctx.rendered_attr("prompt") {
        Some(prompt) => prompt,
        None => {
            let content = ctx.marshall();
            ctx.render(&content)
        }
    };
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        return None;
    }
    let enabled = match kind {
        HandlerKind::Image => ctx.config.generate_images,
        _ => ctx.config.generate_sounds,
    };
    if !enabled {
        tracing::debug!("media generation disabled; skipping {}", ctx.addr());
        return None;
    }

    let request = MediaRequest {
        prompt,
        duration_ms: number(ctx, "duration").map(|ms| ms.round() as u64),
        models: ctx.models(),
    };
    let result = match kind {
        HandlerKind::Image => ctx.provider.generate_image(&request).await,
        _ => ctx.provider.generate_sound(&request).await,
    };
    match result {
        Ok(url) if !url.trim().is_empty() => Some(url),
        Ok(_) => None,
        Err(failure) => {
            tracing::warn!("media generation at {} failed: {}", ctx.addr(), failure);
            None
        }
    }
}
