//! Four-pass text renderer
//!
//! Passes run in a fixed order and each is skipped when its delimiter is
//! absent:
//!
//! 1. `{{path}}` variable interpolation
//! 2. `{% expr %}` inline expressions
//! 3. `[a|b|c]` / `[~a|b|c]` text variation
//! 4. `{@ prompt @}` inline generated text
//!
//! The first three are synchronous; the last goes through the provider.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::interp::{Interpreter, Scope};
use super::parser::parse_program;
use super::random::Prng;
use super::value::stringify;
use crate::provider::{Provider, TextRequest};

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("variable pattern is valid"));
static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{%\s*(.*?)\s*%\}").expect("expression pattern is valid"));
static VARIATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(~?)([^\[\]]*\|[^\[\]]*)\](\()?").expect("variation pattern is valid")
});
static GENERATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{@\s*(.*?)\s*@\}").expect("generated pattern is valid"));

/// Persistent state of one variation call site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationSite {
    /// Number of times the site has rendered (cyclic mode)
    pub counter: usize,
    /// Remaining option indices (shuffle mode)
    pub bag: Vec<usize>,
}

/// Variation state for every call site, keyed by site digest
pub type VariationState = BTreeMap<String, VariationSite>;

/// Everything the synchronous passes need
pub struct RenderContext<'a> {
    /// Variable scope
    pub scope: &'a mut dyn Scope,
    /// Seeded random source
    pub rng: &'a mut Prng,
    /// Call-site variation state
    pub variations: &'a mut VariationState,
    /// Address of the node being rendered
    pub site: &'a str,
}

/// Run passes 1–3
pub fn render(template: &str, ctx: &mut RenderContext<'_>) -> String {
    let mut text = template.to_string();
    if text.contains("{{") {
        text = interpolate(&text, &*ctx.scope);
    }
    if text.contains("{%") {
        text = evaluate_inline(&text, ctx);
    }
    if text.contains('[') && text.contains('|') {
        text = vary(&text, ctx);
    }
    text
}

/// Run pass 4 over already rendered text
pub async fn expand_generated(text: &str, provider: &dyn Provider, models: &[String]) -> String {
    if !text.contains("{@") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for captures in GENERATED.captures_iter(text) {
        let (Some(whole), Some(prompt)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let request = TextRequest {
            prompt: prompt.as_str().to_string(),
            system: None,
            models: models.to_vec(),
        };
        match provider.generate_text(&request).await {
            Ok(generated) => out.push_str(generated.trim()),
            Err(failure) => tracing::warn!("inline generation failed: {}", failure),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Pass 1 only, against any scope
pub fn interpolate(text: &str, scope: &dyn Scope) -> String {
    VARIABLE
        .replace_all(text, |captures: &Captures<'_>| {
            stringify(&scope.lookup(&captures[1]))
        })
        .into_owned()
}

fn evaluate_inline(text: &str, ctx: &mut RenderContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for captures in EXPRESSION.captures_iter(text) {
        let (Some(whole), Some(source)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let rendered = parse_program(source.as_str()).and_then(|program| {
            Interpreter::new(&mut *ctx.scope, &mut *ctx.rng).execute(&program)
        });
        match rendered {
            Ok(value) => out.push_str(&stringify(&value)),
            Err(error) => tracing::warn!("inline expression '{}' failed: {}", source.as_str(), error),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

fn vary(text: &str, ctx: &mut RenderContext<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut occurrence = 0usize;
    for captures in VARIATION.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        // `[label](url)` is a link, not a variation
        if captures.get(3).is_some() {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        let shuffle = !captures[1].is_empty();
        let options: Vec<&str> = captures[2].split('|').collect();
        let key = site_key(ctx.site, text, occurrence);
        occurrence += 1;

        let site = ctx.variations.entry(key).or_default();
        let chosen = if shuffle {
            if site.bag.is_empty() || site.bag.iter().any(|index| *index >= options.len()) {
                let mut bag: Vec<usize> = (0..options.len()).collect();
                ctx.rng.shuffle(&mut bag);
                site.bag = bag;
            }
            site.bag.pop().unwrap_or(0)
        } else {
            let index = site.counter % options.len();
            site.counter += 1;
            index
        };
        out.push_str(options.get(chosen).copied().unwrap_or(""));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

fn site_key(site: &str, template: &str, occurrence: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(site.as_bytes());
    hasher.update(&[0]);
    hasher.update(template.as_bytes());
    hasher.update(&occurrence.to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::interp::MapScope;
    use crate::provider::{NullProvider, ScriptedProvider};
    use serde_json::json;

    fn render_with(template: &str, scope: &mut MapScope, variations: &mut VariationState) -> String {
        let mut rng = Prng::from_seed("template", 0);
        let mut ctx = RenderContext {
            scope,
            rng: &mut rng,
            variations,
            site: "0.1",
        };
        render(template, &mut ctx)
    }

    #[test]
    fn test_variables_and_expressions() {
        let mut scope = MapScope::default();
        scope.assign("player.name", json!("Ada"));
        scope.assign("coins", json!(3));
        let mut variations = VariationState::new();
        let text = render_with(
            "Hi {{ player.name }}, {{missing}}you have {% coins * 2 %} coins.",
            &mut scope,
            &mut variations,
        );
        assert_eq!(text, "Hi Ada, you have 6 coins.");
    }

    #[test]
    fn test_cyclic_variation_advances_per_render() {
        let mut scope = MapScope::default();
        let mut variations = VariationState::new();
        let template = "The wind [howls|moans|sighs].";
        let rendered: Vec<String> = (0..4)
            .map(|_| render_with(template, &mut scope, &mut variations))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "The wind howls.",
                "The wind moans.",
                "The wind sighs.",
                "The wind howls."
            ]
        );
    }

    #[test]
    fn test_shuffle_variation_uses_every_option_once_per_bag() {
        let mut scope = MapScope::default();
        let mut variations = VariationState::new();
        let mut seen: Vec<String> = (0..3)
            .map(|_| render_with("[~a|b|c]", &mut scope, &mut variations))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_links_and_plain_brackets_are_untouched() {
        let mut scope = MapScope::default();
        let mut variations = VariationState::new();
        let text = render_with("See [the map|atlas](/map) and [note]", &mut scope, &mut variations);
        assert_eq!(text, "See [the map|atlas](/map) and [note]");
        assert!(variations.is_empty());
    }

    #[tokio::test]
    async fn test_generated_text_and_failures() {
        let provider = ScriptedProvider::new().with_text("  a raven  ");
        let text = expand_generated("You see {@ describe a bird @}.", &provider, &[]).await;
        assert_eq!(text, "You see a raven.");
        let failed = expand_generated("[{@ anything @}]", &NullProvider, &[]).await;
        assert_eq!(failed, "[]");
    }
}
