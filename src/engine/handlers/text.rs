//! Spoken text, long-form reading and developer logs

use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::{HandlerOutput, Next, StepContext, list};
use crate::engine::ops::Operation;
use crate::markup::{Element, parse_document};
use crate::provider::SpeechRequest;
use crate::tree::inner_text;

const NARRATOR: &str = "narrator";

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("blank line pattern is valid"));

/// Paragraphs, headings and bare text
pub(super) async fn speak(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let raw = ctx.marshall();
    let body = ctx.render_full(&raw).await.trim().to_string();
    if body.is_empty() {
        return HandlerOutput::next(Next::Skip);
    }
    let from = ctx.rendered_attr("from").unwrap_or_else(|| NARRATOR.to_string());
    let to = list(ctx.rendered_attr("to"));
    let obs = list(ctx.rendered_attr("obs"));
    let voice = ctx.rendered_attr("voice");

    let media = speech(ctx, &body, &from, voice).await;
    let event = ctx.event(body, from, to, obs);
    ctx.session.record(event.clone());
    HandlerOutput::with_ops(vec![Operation::line(media, event)], Next::Skip)
}

/// `<read [src] [from]>`: one line per readable unit
pub(super) async fn read(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let units = match ctx.rendered_attr("src") {
        Some(url) => match ctx.provider.fetch_url(&url).await {
            Ok(fetched) => {
                let markup = fetched.content_type.contains("html") || fetched.body.trim_start().starts_with('<');
                match markup {
                    true => markup_units(&fetched.body),
                    false => paragraphs(&fetched.body),
                }
            }
            Err(failure) => {
                tracing::warn!("read could not fetch {}: {}", url, failure);
                Vec::new()
            }
        },
        None => inline_units(ctx),
    };

    let from = ctx.rendered_attr("from").unwrap_or_else(|| NARRATOR.to_string());
    let voice = ctx.rendered_attr("voice");
    let mut ops = Vec::new();
    for unit in units {
        let body = ctx.render(&unit).trim().to_string();
        if body.is_empty() {
            continue;
        }
        let media = speech(ctx, &body, &from, voice.clone()).await;
        let event = ctx.event(body, from.clone(), Vec::new(), Vec::new());
        ctx.session.record(event.clone());
        ops.push(Operation::line(media, event));
    }
    HandlerOutput::with_ops(ops, Next::Skip)
}

/// `<log>`: rendered text to the developer log only
pub(super) fn log(ctx: &mut StepContext<'_>) -> HandlerOutput {
    let raw = inner_text(&ctx.story.tree, ctx.node);
    let message = ctx.render(raw.trim());
    tracing::info!(addr = %ctx.addr(), "{}", message);
    HandlerOutput::next(Next::Skip)
}

async fn speech(ctx: &mut StepContext<'_>, body: &str, from: &str, voice: Option<String>) -> String {
    if !ctx.config.generate_speech {
        return String::new();
    }
    let request = SpeechRequest {
        text: pronounce(body, &ctx.session.pronunciations),
        speaker: Some(from.to_string()),
        voice,
        models: ctx.models(),
    };
    match ctx.provider.generate_speech(&request, &ctx.session.voices).await {
        Ok(url) => url,
        Err(failure) => {
            tracing::warn!("speech for {} failed: {}", from, failure);
            String::new()
        }
    }
}

/// Replace whole words with their spoken forms, ignoring case
pub(crate) fn pronounce(text: &str, pronunciations: &BTreeMap<String, String>) -> String {
    let mut spoken = text.to_string();
    for (word, replacement) in pronunciations {
        if word.trim().is_empty() {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
        match Regex::new(&pattern) {
            Ok(regex) => spoken = regex.replace_all(&spoken, NoExpand(replacement)).into_owned(),
            Err(error) => tracing::warn!("pronunciation for '{}' skipped: {}", word, error),
        }
    }
    spoken
}

fn paragraphs(text: &str) -> Vec<String> {
    BLANK_LINE
        .split(text)
        .map(|unit| unit.trim().to_string())
        .filter(|unit| !unit.is_empty())
        .collect()
}

fn markup_units(source: &str) -> Vec<String> {
    parse_document(source)
        .iter()
        .filter(|element| !matches!(element.kind.as_str(), "script" | "style" | "head"))
        .flat_map(|element| match element.is_text() {
            true => paragraphs(&element.text),
            false => vec![element_text(element)],
        })
        .collect()
}

fn element_text(element: &Element) -> String {
    if element.is_text() {
        return element.text.clone();
    }
    element.children.iter().map(element_text).collect()
}

fn inline_units(ctx: &mut StepContext<'_>) -> Vec<String> {
    let children = ctx.story.tree.get(ctx.node).children.clone();
    let mut units = Vec::new();
    for child in children {
        if ctx.story.tree.get(child).is_text() {
            units.extend(paragraphs(&ctx.story.tree.get(child).text));
        } else {
            units.push(ctx.marshall_node(child));
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pronunciations_replace_whole_words_only() {
        let table: BTreeMap<String, String> = [("Gwen".to_string(), "Gwenn".to_string())].into_iter().collect();
        assert_eq!(pronounce("gwen met Gwendolyn", &table), "Gwenn met Gwendolyn");
    }

    #[test]
    fn test_plain_text_splits_on_blank_lines() {
        assert_eq!(paragraphs("one\n\n  \ntwo\nstill two\n"), vec!["one", "two\nstill two"]);
    }

    #[test]
    fn test_markup_splits_on_block_elements() {
        let units = markup_units("<h1>Title</h1><p>First <b>bold</b></p><script>x()</script>");
        assert_eq!(units, vec!["Title", "First bold"]);
    }
}
