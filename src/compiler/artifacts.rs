//! Auxiliary artifacts pulled from structured-data documents

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::voices::{VoiceMap, VoiceRequest, VoiceSpec};
use crate::eval::{MapScope, interpolate, stringify};

/// Everything structured-data documents contribute to a story
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    /// Word to spoken form
    pub pronunciations: BTreeMap<String, String>,
    /// Voices with an id
    pub voices: VoiceMap,
    /// Voices still needing an id
    pub pending: Vec<VoiceRequest>,
    /// Story metadata
    pub meta: Map<String, Value>,
    /// Tag rule sources in declaration order
    pub tags: Vec<(String, String)>,
}

/// Parse a JSON or YAML payload; JSON is tried first
pub fn parse_payload(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    serde_yaml::from_str::<Value>(trimmed).ok()
}

/// Parse a payload using a content type hint (`application/json`, `text/yaml`, …)
pub fn parse_typed_payload(text: &str, content_type: &str) -> Option<Value> {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("json") {
        return serde_json::from_str(text.trim()).ok();
    }
    if content_type.contains("yaml") || content_type.contains("yml") {
        return serde_yaml::from_str(text.trim()).ok();
    }
    parse_payload(text)
}

impl Artifacts {
    /// Merge a parsed data document
    pub fn absorb(&mut self, document: Value) {
        let Value::Object(map) = document else {
            tracing::warn!("data document is not an object; ignored");
            return;
        };
        for (key, value) in map {
            match key.as_str() {
                "pronunciations" => self.absorb_pronunciations(value),
                "voices" => self.absorb_voices(value),
                "meta" | "metadata" => match value {
                    Value::Object(meta) => self.meta.extend(meta),
                    _ => tracing::warn!("metadata must be an object; ignored"),
                },
                "tags" => match value {
                    Value::Object(rules) => self
                        .tags
                        .extend(rules.into_iter().map(|(name, rule)| (name, stringify(&rule)))),
                    _ => tracing::warn!("tags must be an object of rules; ignored"),
                },
                _ => {
                    self.meta.insert(key, value);
                }
            }
        }
    }

    fn absorb_pronunciations(&mut self, value: Value) {
        match value {
            Value::Object(words) => {
                for (word, spoken) in words {
                    self.pronunciations.insert(word, stringify(&spoken));
                }
            }
            _ => tracing::warn!("pronunciations must be an object; ignored"),
        }
    }

    fn absorb_voices(&mut self, value: Value) {
        let Value::Object(voices) = value else {
            tracing::warn!("voices must be an object; ignored");
            return;
        };
        for (name, spec) in voices {
            match spec {
                Value::String(id) => {
                    self.voices.insert(
                        name.clone(),
                        VoiceSpec {
                            id,
                            name,
                            tags: Vec::new(),
                            description: String::new(),
                        },
                    );
                }
                Value::Object(fields) => {
                    let text = |key: &str| fields.get(key).map(stringify).unwrap_or_default();
                    let tags: Vec<String> = match fields.get("tags") {
                        Some(Value::Array(items)) => items.iter().map(stringify).collect(),
                        Some(Value::String(list)) => list
                            .split(',')
                            .map(|tag| tag.trim().to_string())
                            .filter(|tag| !tag.is_empty())
                            .collect(),
                        _ => Vec::new(),
                    };
                    let description = match text("description") {
                        description if description.is_empty() => text("prompt"),
                        description => description,
                    };
                    match fields.get("id").map(stringify).filter(|id| !id.is_empty()) {
                        Some(id) => {
                            self.voices.insert(
                                name.clone(),
                                VoiceSpec {
                                    id,
                                    name,
                                    tags,
                                    description,
                                },
                            );
                        }
                        None => self.pending.push(VoiceRequest {
                            name,
                            prompt: description,
                            tags,
                        }),
                    }
                }
                _ => tracing::warn!("voice '{}' has an unusable spec; ignored", name),
            }
        }
    }
}

/// Interpolate string metadata against the metadata itself.
///
/// A few passes let chained references settle; unresolved references render
/// empty like any other missing variable.
pub fn interpolate_metadata(meta: &mut Map<String, Value>) {
    for _ in 0..3 {
        let scope = MapScope::new(meta.clone());
        let mut changed = false;
        for value in meta.values_mut() {
            if let Value::String(text) = value {
                if text.contains("{{") {
                    let rendered = interpolate(text, &scope);
                    if rendered != *text {
                        *text = rendered;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Dotted module namespace for a script path (`lib/util.script` → `lib.util`)
pub fn module_namespace(path: &str) -> String {
    let without_extension = path.strip_suffix(".script").unwrap_or(path);
    without_extension
        .trim_start_matches("./")
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_yaml_and_json_payloads() {
        assert_eq!(parse_payload(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(parse_payload("a: 1\nb: [x, y]"), Some(json!({"a": 1, "b": ["x", "y"]})));
        assert_eq!(parse_payload("   "), None);
        assert_eq!(parse_typed_payload("a: 2", "text/yaml"), Some(json!({"a": 2})));
        assert_eq!(parse_typed_payload("a: 2", "application/json"), None);
    }

    #[test]
    fn test_absorbs_every_section() {
        let mut artifacts = Artifacts::default();
        artifacts.absorb(json!({
            "pronunciations": {"Xiao": "shyow"},
            "voices": {
                "Guard": {"id": "v-1"},
                "Elder": {"prompt": "old and wise", "tags": ["old"]},
                "Narrator": "v-2"
            },
            "meta": {"title": "Night Watch"},
            "tags": {"armed": "weapon != null"},
            "author": "Someone"
        }));
        assert_eq!(artifacts.pronunciations["Xiao"], "shyow");
        assert_eq!(artifacts.voices["Guard"].id, "v-1");
        assert_eq!(artifacts.voices["Narrator"].id, "v-2");
        assert_eq!(artifacts.pending.len(), 1);
        assert_eq!(artifacts.pending[0].prompt, "old and wise");
        assert_eq!(artifacts.meta["title"], json!("Night Watch"));
        assert_eq!(artifacts.meta["author"], json!("Someone"));
        assert_eq!(artifacts.tags, vec![("armed".to_string(), "weapon != null".to_string())]);
    }

    #[test]
    fn test_metadata_references_resolve() {
        let mut meta = json!({
            "title": "The Mill",
            "subtitle": "Part one of {{title}}",
            "summary": "{{subtitle}}: a ghost story"
        })
        .as_object()
        .cloned()
        .unwrap();
        interpolate_metadata(&mut meta);
        assert_eq!(meta["summary"], json!("Part one of The Mill: a ghost story"));
    }

    #[test]
    fn test_namespaces_mirror_paths() {
        assert_eq!(module_namespace("lib/util.script"), "lib.util");
        assert_eq!(module_namespace("./a\\b.script"), "a.b");
    }
}
