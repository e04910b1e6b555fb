//! Fixed casting rules used by `var`, `input` fields and the `to_*` builtins

use serde_json::Value;

use super::value::{number, stringify, truthy};

/// Boolean cast: strings are true only for `true`, `yes` or `1`
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        other => truthy(other),
    }
}

/// Numeric cast; unparseable input is null
pub fn to_number(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::Bool(flag) => number(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map(number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Integer cast (truncating)
pub fn to_integer(value: &Value) -> Value {
    match to_number(value) {
        Value::Number(num) => num
            .as_f64()
            .map(|float| number(float.trunc()))
            .unwrap_or(Value::Null),
        other => other,
    }
}

/// Enum cast: exact case-insensitive match, then substring containment either
/// way, else null
pub fn to_enum(value: &Value, options: &[String]) -> Value {
    let text = stringify(value);
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return Value::Null;
    }
    if let Some(exact) = options.iter().find(|option| option.to_lowercase() == needle) {
        return Value::String(exact.clone());
    }
    options
        .iter()
        .find(|option| {
            let candidate = option.to_lowercase();
            !candidate.is_empty() && (needle.contains(&candidate) || candidate.contains(&needle))
        })
        .map(|option| Value::String(option.clone()))
        .unwrap_or(Value::Null)
}

/// Split an enum option list written as `a|b|c` or `a, b, c`
pub fn enum_options(spec: &str) -> Vec<String> {
    let separator = if spec.contains('|') { '|' } else { ',' };
    spec.split(separator)
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty())
        .collect()
}

/// Cast by declared type name.
///
/// Unknown types and `string` keep text as-is; `json` parses text and falls
/// back to the original string.
pub fn cast(value: Value, kind: Option<&str>, options: &[String]) -> Value {
    match kind.map(|kind| kind.trim().to_ascii_lowercase()).as_deref() {
        Some("boolean" | "bool") => Value::Bool(to_boolean(&value)),
        Some("number" | "float") => to_number(&value),
        Some("integer" | "int") => to_integer(&value),
        Some("enum") => to_enum(&value, options),
        Some("json" | "object" | "array") => match &value {
            Value::String(text) => serde_json::from_str(text).unwrap_or(value),
            _ => value,
        },
        Some("string" | "text") => Value::String(stringify(&value)),
        _ => value,
    }
}
