//! Field declarations for input extraction and structured generation
//!
//! Fields are declared with dotted attributes (`name.type="integer"`,
//! `mood.options="calm|angry"`, `reason.description="…"`). A node without
//! dotted attributes declares a single field named after its output key,
//! configured by the plain `type`/`description`/`pattern`/`options`/`default`
//! attributes.

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::eval::cast;
use crate::tree::Attributes;

const PROPERTIES: &[&str] = &["type", "description", "pattern", "options", "enum", "default"];

/// One field to extract or generate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    /// Output name
    pub name: String,
    /// Declared type
    pub kind: Option<String>,
    /// Natural-language description
    pub description: Option<String>,
    /// Validation pattern; group 1 (or the whole match) is kept
    pub pattern: Option<String>,
    /// Allowed values
    pub options: Vec<String>,
    /// Fallback when nothing usable was extracted
    pub default: Option<String>,
}

impl Field {
    fn set(&mut self, property: &str, value: &str) {
        match property {
            "type" => self.kind = Some(value.to_string()),
            "description" => self.description = Some(value.to_string()),
            "pattern" => self.pattern = Some(value.to_string()),
            "options" | "enum" => self.options = cast::enum_options(value),
            "default" => self.default = Some(value.to_string()),
            _ => {}
        }
    }

    /// Object, array and JSON fields need structured generation
    pub fn is_complex(&self) -> bool {
        matches!(
            self.kind.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("object" | "array" | "json" | "list")
        )
    }

    fn cast_kind(&self) -> Option<&str> {
        match self.kind.as_deref() {
            None if !self.options.is_empty() => Some("enum"),
            kind => kind,
        }
    }

    /// JSON schema fragment
    pub fn schema(&self) -> Value {
        let json_type = match self.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("number" | "float") => "number",
            Some("integer" | "int") => "integer",
            Some("boolean" | "bool") => "boolean",
            Some("array" | "list") => "array",
            Some("object" | "json") => "object",
            _ => "string",
        };
        let mut schema = Map::new();
        schema.insert("type".into(), json!(json_type));
        if let Some(description) = &self.description {
            schema.insert("description".into(), json!(description));
        }
        if !self.options.is_empty() {
            schema.insert("enum".into(), json!(self.options));
        }
        Value::Object(schema)
    }

    /// Local extraction: pattern, then cast, then default
    pub fn parse_local(&self, raw: &str) -> Value {
        let text = raw.trim();
        let mut candidate = (!text.is_empty()).then(|| text.to_string());
        if let (Some(pattern), Some(current)) = (&self.pattern, candidate.clone()) {
            candidate = match Regex::new(pattern) {
                Ok(regex) => regex.captures(&current).and_then(|captures| {
                    captures
                        .get(1)
                        .or_else(|| captures.get(0))
                        .map(|found| found.as_str().to_string())
                }),
                Err(error) => {
                    tracing::warn!("invalid pattern for field {}: {}", self.name, error);
                    Some(current)
                }
            };
        }
        let value = candidate
            .map(|text| cast::cast(Value::String(text), self.cast_kind(), &self.options))
            .unwrap_or(Value::Null);
        if value.is_null() {
            self.fallback()
        } else {
            value
        }
    }

    /// Declared default, cast like an extracted value
    pub fn fallback(&self) -> Value {
        match &self.default {
            Some(default) => cast::cast(Value::String(default.clone()), self.cast_kind(), &self.options),
            None => Value::Null,
        }
    }
}

/// Fields declared on a node
pub fn collect(attrs: &Attributes, key: &str) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();
    for (name, value) in attrs.iter() {
        let Some((field, property)) = name.rsplit_once('.') else {
            continue;
        };
        if field.is_empty() || !PROPERTIES.contains(&property) {
            continue;
        }
        let index = match fields.iter().position(|existing| existing.name == field) {
            Some(index) => index,
            None => {
                fields.push(Field {
                    name: field.to_string(),
                    ..Field::default()
                });
                fields.len() - 1
            }
        };
        fields[index].set(property, value);
    }
    if fields.is_empty() {
        let mut single = Field {
            name: key.to_string(),
            ..Field::default()
        };
        for property in PROPERTIES {
            if let Some(value) = attrs.get(property) {
                single.set(property, value);
            }
        }
        fields.push(single);
    }
    fields
}

/// Whether extraction needs the provider
pub fn needs_generation(fields: &[Field]) -> bool {
    fields.len() > 1
        || fields
            .iter()
            .any(|field| field.description.is_some() || field.is_complex())
}

/// Object schema over all fields
pub fn schema(fields: &[Field]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|field| (field.name.clone(), field.schema()))
        .collect();
    let required: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Cast a generated object field by field, filling defaults for gaps
pub fn conform(fields: &[Field], generated: &Value) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            let value = match generated.get(&field.name) {
                Some(Value::Null) | None => field.fallback(),
                Some(Value::String(text)) if field.kind.is_some() || !field.options.is_empty() => {
                    field.parse_local(text)
                }
                Some(other) => other.clone(),
            };
            (field.name.clone(), value)
        })
        .collect()
}
