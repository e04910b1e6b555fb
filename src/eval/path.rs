//! Dotted-path access into JSON values (`player.items.0.name`)

use serde_json::{Map, Value};

/// Split a dotted path into its non-empty segments
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').map(str::trim).filter(|segment| !segment.is_empty())
}

/// Root segment of a path
pub fn root(path: &str) -> &str {
    segments(path).next().unwrap_or("")
}

/// Read a path below a value
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments(path) {
        current = child(current, segment)?;
    }
    Some(current)
}

/// Read a path from a map
pub fn get_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = segments(path);
    let first = map.get(parts.next()?)?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return Some(first);
    }
    get(first, &rest.join("."))
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Write a path into a map, creating intermediate objects as needed.
///
/// Existing arrays accept numeric segments; scalars in the way are replaced
/// by objects.
pub fn set_in(map: &mut Map<String, Value>, path: &str, value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    if parents.is_empty() {
        map.insert((*last).to_string(), value);
        return;
    }
    let entry = map
        .entry(parents[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let mut current = entry;
    for segment in &parents[1..] {
        current = descend(current, segment);
    }
    assign(current, last, value);
}

fn descend<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match value {
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .filter(|index| *index < items.len()),
        _ => None,
    };
    if index.is_none() && !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Array(items) => &mut items[index.unwrap_or_default()],
        Value::Object(map) => map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new())),
        other => other,
    }
}

fn assign(target: &mut Value, segment: &str, value: Value) {
    if let Value::Array(items) = target {
        if let Ok(index) = segment.parse::<usize>() {
            if index < items.len() {
                items[index] = value;
            } else if index == items.len() {
                items.push(value);
            }
            return;
        }
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        map.insert(segment.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_nested_objects_and_arrays() {
        let value = json!({"player": {"items": [{"name": "lamp"}]}});
        assert_eq!(get(&value, "player.items.0.name"), Some(&json!("lamp")));
        assert_eq!(get(&value, "player.missing"), None);
    }

    #[test]
    fn test_writes_create_intermediates() {
        let mut map = Map::new();
        set_in(&mut map, "a.b.c", json!(1));
        set_in(&mut map, "list", json!([1, 2]));
        set_in(&mut map, "list.1", json!(5));
        set_in(&mut map, "list.2", json!(6));
        assert_eq!(Value::Object(map), json!({"a": {"b": {"c": 1}}, "list": [1, 5, 6]}));
    }

    #[test]
    fn test_scalar_in_the_way_is_replaced() {
        let mut map = Map::new();
        set_in(&mut map, "x", json!(3));
        set_in(&mut map, "x.y", json!("z"));
        assert_eq!(get_in(&map, "x.y"), Some(&json!("z")));
        assert_eq!(root("x.y.z"), "x");
    }
}
