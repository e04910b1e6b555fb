//! Generative handlers (`llm:*`)
//!
//! Every handler stores its result under `key`. A provider failure is logged
//! and stores an empty string (text handlers) or null (structured handlers),
//! so the story keeps going with degraded content.

use serde_json::{Value, json};

use super::fields::{self, Field};
use super::{HandlerOutput, Next, StepContext, list};
use crate::engine::ops::StoryEvent;
use crate::eval::cast;
use crate::eval::value::{as_number, number};
use crate::provider::{JsonRequest, TextRequest};

fn done() -> HandlerOutput {
    HandlerOutput::next(Next::Skip)
}

fn output_key(ctx: &mut StepContext<'_>) -> Option<String> {
    ctx.rendered_attr("key").filter(|key| !key.trim().is_empty())
}

/// Rendered inner content (all four template passes)
async fn content(ctx: &mut StepContext<'_>) -> String {
    let raw = ctx.marshall();
    ctx.render_full(&raw).await.trim().to_string()
}

/// The text a classifier looks at: the `text` attribute, else the content
async fn subject(ctx: &mut StepContext<'_>) -> String {
    match ctx.rendered_attr("text") {
        Some(text) => text.trim().to_string(),
        None => content(ctx).await,
    }
}

async fn structured(ctx: &mut StepContext<'_>, prompt: String, schema: Value) -> Option<Value> {
    let request = JsonRequest {
        prompt,
        schema,
        models: ctx.models(),
    };
    match ctx.provider.generate_json(&request).await {
        Ok(value) => Some(value),
        Err(failure) => {
            tracing::warn!("structured generation at {} failed: {}", ctx.addr(), failure);
            None
        }
    }
}

/// `<llm:text key [system]>prompt</llm:text>`
pub(super) async fn text(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let prompt = content(ctx).await;
    let request = TextRequest {
        prompt,
        system: ctx.rendered_attr("system"),
        models: ctx.models(),
    };
    let generated = match ctx.provider.generate_text(&request).await {
        Ok(text) => text.trim().to_string(),
        Err(failure) => {
            tracing::warn!("text generation at {} failed: {}", ctx.addr(), failure);
            String::new()
        }
    };
    ctx.store(&key, Value::String(generated));
    done()
}

/// `<llm:tag key options [text]>`: the subset of `options` that applies
pub(super) async fn tag(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let options = cast::enum_options(&ctx.rendered_attr("options").unwrap_or_default());
    let text = subject(ctx).await;
    let prompt = format!(
        "Choose every label that applies to the text. Labels: {}.\n\nText: {}",
        options.join(", "),
        text
    );
    let schema = json!({
        "type": "object",
        "properties": {
            "tags": {"type": "array", "items": {"type": "string", "enum": options}}
        },
        "required": ["tags"],
    });
    let value = structured(ctx, prompt, schema).await.map(|generated| {
        let chosen = generated
            .get("tags")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut tags: Vec<Value> = Vec::new();
        for label in chosen {
            let matched = cast::to_enum(&label, &options);
            if !matched.is_null() && !tags.contains(&matched) {
                tags.push(matched);
            }
        }
        Value::Array(tags)
    });
    ctx.store(&key, value.unwrap_or(Value::Null));
    done()
}

/// `<llm:score key [min] [max] [text]>`: a number clamped into range
pub(super) async fn score(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let bound = |raw: Option<String>, fallback: f64| {
        raw.and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(fallback)
    };
    let min = bound(ctx.rendered_attr("min"), 0.0);
    let max = bound(ctx.rendered_attr("max"), 10.0).max(min);
    let text = subject(ctx).await;
    let prompt = format!("Score the text from {} to {}.\n\nText: {}", min, max, text);
    let schema = json!({
        "type": "object",
        "properties": {"score": {"type": "number", "minimum": min, "maximum": max}},
        "required": ["score"],
    });
    let value = structured(ctx, prompt, schema)
        .await
        .and_then(|generated| generated.get("score").and_then(as_number))
        .map(|score| number(score.clamp(min, max)));
    ctx.store(&key, value.unwrap_or(Value::Null));
    done()
}

/// `<llm:moderate key [text]>`: `{flagged, categories}`
pub(super) async fn moderate(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let text = subject(ctx).await;
    let value = match ctx.provider.moderate(&text).await {
        Ok(verdict) => json!({"flagged": verdict.flagged, "categories": verdict.categories}),
        Err(failure) => {
            tracing::warn!("moderation at {} failed: {}", ctx.addr(), failure);
            Value::Null
        }
    };
    ctx.store(&key, value);
    done()
}

fn declared_fields(ctx: &StepContext<'_>, key: &str) -> (Vec<Field>, bool) {
    let attrs = &ctx.story.tree.get(ctx.node).attrs;
    let declared = fields::collect(attrs, key);
    let scalar = declared.len() == 1 && declared[0].name == key;
    (declared, scalar)
}

fn shape(declared: &[Field], scalar: bool, generated: Option<Value>) -> Value {
    let Some(generated) = generated else {
        return Value::Null;
    };
    let object = match generated {
        Value::Object(_) => fields::conform(declared, &generated),
        other if scalar => return other,
        other => {
            tracing::warn!("structured generation returned a non-object: {}", other);
            return Value::Null;
        }
    };
    match scalar {
        true => object.get(&declared[0].name).cloned().unwrap_or(Value::Null),
        false => Value::Object(object),
    }
}

/// `<llm:parse key [text] field.type=… field.description=…>`
pub(super) async fn parse(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let (declared, scalar) = declared_fields(ctx, &key);
    let text = subject(ctx).await;
    let prompt = format!(
        "Extract the requested fields from the text. Use null for anything it does not say.\n\nText: {}",
        text
    );
    let generated = structured(ctx, prompt, fields::schema(&declared)).await;
    let value = shape(&declared, scalar, generated);
    ctx.store(&key, value);
    done()
}

/// `<llm:generate key field.type=…>prompt</llm:generate>`
pub(super) async fn generate(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let (declared, scalar) = declared_fields(ctx, &key);
    let prompt = content(ctx).await;
    let generated = structured(ctx, prompt, fields::schema(&declared)).await;
    let value = shape(&declared, scalar, generated);
    ctx.store(&key, value);
    done()
}

/// `<llm:line key speaker [with] [limit]>direction</llm:line>`
///
/// The prompt carries the most recent exchanges between the speaker and
/// the listed peers, oldest first.
pub(super) async fn line(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let Some(key) = output_key(ctx) else {
        return done();
    };
    let speaker = ctx.rendered_attr("speaker").unwrap_or_default().trim().to_string();
    let peers = list(ctx.rendered_attr("with"));
    let limit = ctx
        .rendered_attr("limit")
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(12);
    let direction = content(ctx).await;

    let history = recent_exchanges(&ctx.session.transcript(), &speaker, &peers, limit);
    let mut prompt = String::new();
    if !direction.is_empty() {
        prompt.push_str(&direction);
        prompt.push_str("\n\n");
    }
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for event in &history {
            prompt.push_str(&format!("{}: {}\n", event.from, event.body));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Write {}'s next line of dialogue only.", speaker));

    let request = TextRequest {
        prompt,
        system: ctx.rendered_attr("system"),
        models: ctx.models(),
    };
    let generated = match ctx.provider.generate_text(&request).await {
        Ok(text) => strip_speaker(&text, &speaker),
        Err(failure) => {
            tracing::warn!("dialogue for {} failed: {}", speaker, failure);
            String::new()
        }
    };
    ctx.store(&key, Value::String(generated));
    done()
}

/// Events between `speaker` and `peers`, newest `limit` kept, oldest first
fn recent_exchanges(transcript: &[StoryEvent], speaker: &str, peers: &[String], limit: usize) -> Vec<StoryEvent> {
    let involved = |name: &str| name.eq_ignore_ascii_case(speaker) || peers.iter().any(|peer| peer.eq_ignore_ascii_case(name));
    let mut recent: Vec<StoryEvent> = transcript
        .iter()
        .rev()
        .filter(|event| {
            involved(&event.from) || event.to.iter().any(|listener| listener.eq_ignore_ascii_case(speaker))
        })
        .take(limit)
        .cloned()
        .collect();
    recent.reverse();
    recent
}

fn strip_speaker(text: &str, speaker: &str) -> String {
    let trimmed = text.trim();
    let prefix_len = speaker.len() + 1;
    let echoed = !speaker.is_empty()
        && trimmed.len() >= prefix_len
        && trimmed.is_char_boundary(prefix_len)
        && trimmed[..speaker.len()].eq_ignore_ascii_case(speaker)
        && trimmed[speaker.len()..].starts_with(':');
    let line = if echoed { &trimmed[prefix_len..] } else { trimmed };
    line.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn said(from: &str, body: &str) -> StoryEvent {
        StoryEvent {
            from: from.into(),
            body: body.into(),
            ..StoryEvent::default()
        }
    }

    #[test]
    fn test_echoed_speaker_prefix_is_removed() {
        assert_eq!(strip_speaker("Mira: \"Stay close.\"", "mira"), "Stay close.");
        assert_eq!(strip_speaker("Stay close.", "Mira"), "Stay close.");
        assert_eq!(strip_speaker("Mirabel: hi", "Mira"), "Mirabel: hi");
    }

    #[test]
    fn test_exchanges_are_capped_newest_first_then_ordered() {
        let transcript = vec![
            said("Mira", "one"),
            said("narrator", "aside"),
            said("player", "two"),
            said("Mira", "three"),
        ];
        let recent = recent_exchanges(&transcript, "Mira", &["player".to_string()], 2);
        let bodies: Vec<&str> = recent.iter().map(|event| event.body.as_str()).collect();
        assert_eq!(bodies, vec!["two", "three"]);
    }
}
