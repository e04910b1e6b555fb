//! Builtin function library
//!
//! Everything here is pure apart from the random family, which draws from the
//! caller's [`Prng`]. Scope accessors (`get`/`set`) live in the interpreter.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::cast::{enum_options, to_boolean, to_enum, to_number};
use super::random::Prng;
use super::value::{as_number, loose_eq, number, stringify, type_name};
use crate::error::{EvalError, EvalResult};

const MAX_RANGE: usize = 10_000;

/// Call a builtin by name
pub fn call(name: &str, args: &[Value], rng: &mut Prng) -> EvalResult<Value> {
    match name {
        // arrays
        "first" => {
            arity(name, args, 1, 1)?;
            Ok(match &args[0] {
                Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
                Value::String(text) => text.chars().next().map(|ch| Value::String(ch.to_string())).unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        "last" => {
            arity(name, args, 1, 1)?;
            Ok(match &args[0] {
                Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
                Value::String(text) => text.chars().last().map(|ch| Value::String(ch.to_string())).unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        "nth" => {
            arity(name, args, 2, 2)?;
            let items = array(name, args, 0)?;
            let index = integer(name, args, 1)?;
            let position = if index < 0 { items.len() as i64 + index } else { index };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|position| items.get(position).cloned())
                .unwrap_or(Value::Null))
        }
        "slice" => {
            arity(name, args, 2, 3)?;
            let end = args.get(2).and_then(as_number).map(|end| end as i64);
            let start = integer(name, args, 1)?;
            Ok(match &args[0] {
                Value::String(text) => {
                    let chars: Vec<char> = text.chars().collect();
                    let (from, to) = bounds(chars.len(), start, end);
                    Value::String(chars[from..to].iter().collect())
                }
                Value::Array(items) => {
                    let (from, to) = bounds(items.len(), start, end);
                    Value::Array(items[from..to].to_vec())
                }
                _ => Value::Null,
            })
        }
        "sort" => {
            arity(name, args, 1, 1)?;
            let mut items = array(name, args, 0)?.clone();
            items.sort_by(compare_values);
            Ok(Value::Array(items))
        }
        "reverse" => {
            arity(name, args, 1, 1)?;
            Ok(match &args[0] {
                Value::String(text) => Value::String(text.chars().rev().collect()),
                Value::Array(items) => Value::Array(items.iter().rev().cloned().collect()),
                _ => Value::Null,
            })
        }
        "unique" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Array(unique(array(name, args, 0)?)))
        }
        "flatten" => {
            arity(name, args, 1, 1)?;
            let mut out = Vec::new();
            for item in array(name, args, 0)? {
                match item {
                    Value::Array(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(out))
        }
        "union" => {
            arity(name, args, 2, 2)?;
            let mut joined = array(name, args, 0)?.clone();
            joined.extend(array(name, args, 1)?.iter().cloned());
            Ok(Value::Array(unique(&joined)))
        }
        "intersection" => {
            arity(name, args, 2, 2)?;
            let right = array(name, args, 1)?;
            let kept: Vec<Value> = array(name, args, 0)?
                .iter()
                .filter(|item| right.iter().any(|other| loose_eq(item, other)))
                .cloned()
                .collect();
            Ok(Value::Array(unique(&kept)))
        }
        "difference" => {
            arity(name, args, 2, 2)?;
            let right = array(name, args, 1)?;
            let kept: Vec<Value> = array(name, args, 0)?
                .iter()
                .filter(|item| !right.iter().any(|other| loose_eq(item, other)))
                .cloned()
                .collect();
            Ok(Value::Array(kept))
        }
        "sum" => Ok(number(numbers(name, args)?.iter().sum())),
        "mean" => {
            let values = numbers(name, args)?;
            Ok(mean(&values).map(number).unwrap_or(Value::Null))
        }
        "median" => {
            let mut values = numbers(name, args)?;
            if values.is_empty() {
                return Ok(Value::Null);
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let middle = values.len() / 2;
            Ok(number(if values.len() % 2 == 0 {
                (values[middle - 1] + values[middle]) / 2.0
            } else {
                values[middle]
            }))
        }
        "mode" => {
            let items = flatten_args(args);
            let mut best: Option<(&Value, usize)> = None;
            for item in &items {
                let count = items.iter().filter(|other| loose_eq(item, other)).count();
                if best.is_none_or(|(_, best_count)| count > best_count) {
                    best = Some((item, count));
                }
            }
            Ok(best.map(|(item, _)| item.clone()).unwrap_or(Value::Null))
        }
        "min" | "max" => {
            let values = numbers(name, args)?;
            let folded = values.into_iter().reduce(|a, b| {
                if (name == "min") == (b < a) { b } else { a }
            });
            Ok(folded.map(number).unwrap_or(Value::Null))
        }
        "stdev" => {
            let values = numbers(name, args)?;
            let Some(average) = mean(&values) else {
                return Ok(Value::Null);
            };
            let variance = values.iter().map(|value| (value - average).powi(2)).sum::<f64>() / values.len() as f64;
            Ok(number(variance.sqrt()))
        }
        "range" => {
            arity(name, args, 1, 3)?;
            let (start, end) = if args.len() == 1 {
                (0.0, float(name, args, 0)?)
            } else {
                (float(name, args, 0)?, float(name, args, 1)?)
            };
            let step = if args.len() == 3 { float(name, args, 2)? } else { 1.0 };
            if step == 0.0 {
                return Err(EvalError::Type("range step cannot be zero".into()));
            }
            let mut out = Vec::new();
            let mut current = start;
            while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
                out.push(number(current));
                if out.len() >= MAX_RANGE {
                    break;
                }
                current += step;
            }
            Ok(Value::Array(out))
        }

        // strings
        "upper" => string_map(name, args, |text| text.to_uppercase()),
        "lower" => string_map(name, args, |text| text.to_lowercase()),
        "trim" => string_map(name, args, |text| text.trim().to_string()),
        "capitalize" => string_map(name, args, capitalize),
        "title" => string_map(name, args, |text| {
            text.split(' ').map(capitalize).collect::<Vec<_>>().join(" ")
        }),
        "pad_start" | "pad_end" => {
            arity(name, args, 2, 3)?;
            let text = stringify(&args[0]);
            let width = integer(name, args, 1)?.clamp(0, MAX_RANGE as i64) as usize;
            let fill = args.get(2).map(stringify).unwrap_or_else(|| " ".to_string());
            let length = text.chars().count();
            if length >= width || fill.is_empty() {
                return Ok(Value::String(text));
            }
            let padding: String = fill.chars().cycle().take(width - length).collect();
            Ok(Value::String(if name == "pad_start" {
                format!("{}{}", padding, text)
            } else {
                format!("{}{}", text, padding)
            }))
        }
        "starts_with" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Bool(stringify(&args[0]).starts_with(&stringify(&args[1]))))
        }
        "ends_with" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Bool(stringify(&args[0]).ends_with(&stringify(&args[1]))))
        }
        "index_of" => {
            arity(name, args, 2, 2)?;
            let position = match &args[0] {
                Value::Array(items) => items.iter().position(|item| loose_eq(item, &args[1])),
                other => {
                    let haystack = stringify(other);
                    haystack
                        .find(&stringify(&args[1]))
                        .map(|byte| haystack[..byte].chars().count())
                }
            };
            Ok(number(position.map(|index| index as f64).unwrap_or(-1.0)))
        }
        "replace" => {
            arity(name, args, 3, 3)?;
            let text = stringify(&args[0]);
            let from = stringify(&args[1]);
            if from.is_empty() {
                return Ok(Value::String(text));
            }
            Ok(Value::String(text.replace(&from, &stringify(&args[2]))))
        }
        "split" => {
            arity(name, args, 1, 2)?;
            let text = stringify(&args[0]);
            let separator = args.get(1).map(stringify).unwrap_or_else(|| ",".to_string());
            let parts: Vec<Value> = if separator.is_empty() {
                text.chars().map(|ch| Value::String(ch.to_string())).collect()
            } else {
                text.split(&separator).map(|part| Value::String(part.to_string())).collect()
            };
            Ok(Value::Array(parts))
        }
        "join" => {
            arity(name, args, 1, 2)?;
            let separator = args.get(1).map(stringify).unwrap_or_else(|| ",".to_string());
            let items = array(name, args, 0)?;
            Ok(Value::String(items.iter().map(stringify).collect::<Vec<_>>().join(&separator)))
        }
        "repeat" => {
            arity(name, args, 2, 2)?;
            let count = integer(name, args, 1)?.clamp(0, MAX_RANGE as i64) as usize;
            Ok(Value::String(stringify(&args[0]).repeat(count)))
        }

        // dispatching on string or array
        "length" => {
            arity(name, args, 1, 1)?;
            Ok(number(length(&args[0]) as f64))
        }
        "includes" => {
            arity(name, args, 2, 2)?;
            Ok(Value::Bool(match &args[0] {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, &args[1])),
                Value::Object(map) => map.contains_key(&stringify(&args[1])),
                Value::Null => false,
                other => stringify(other).contains(&stringify(&args[1])),
            }))
        }

        // math
        "abs" => unary_math(name, args, f64::abs),
        "floor" => unary_math(name, args, f64::floor),
        "ceil" => unary_math(name, args, f64::ceil),
        "sqrt" => unary_math(name, args, f64::sqrt),
        "exp" => unary_math(name, args, f64::exp),
        "sin" => unary_math(name, args, f64::sin),
        "cos" => unary_math(name, args, f64::cos),
        "tan" => unary_math(name, args, f64::tan),
        "asin" => unary_math(name, args, f64::asin),
        "acos" => unary_math(name, args, f64::acos),
        "atan" => unary_math(name, args, f64::atan),
        "sign" => unary_math(name, args, |x| if x == 0.0 { 0.0 } else { x.signum() }),
        "round" => {
            arity(name, args, 1, 2)?;
            let value = float(name, args, 0)?;
            let digits = if args.len() == 2 { integer(name, args, 1)? } else { 0 };
            let scale = 10f64.powi(digits as i32);
            Ok(number((value * scale).round() / scale))
        }
        "log" => {
            arity(name, args, 1, 2)?;
            let value = float(name, args, 0)?;
            Ok(number(if args.len() == 2 {
                value.log(float(name, args, 1)?)
            } else {
                value.ln()
            }))
        }
        "pow" => {
            arity(name, args, 2, 2)?;
            Ok(number(float(name, args, 0)?.powf(float(name, args, 1)?)))
        }
        "atan2" => {
            arity(name, args, 2, 2)?;
            Ok(number(float(name, args, 0)?.atan2(float(name, args, 1)?)))
        }
        "clamp" => {
            arity(name, args, 3, 3)?;
            let (value, low, high) = (float(name, args, 0)?, float(name, args, 1)?, float(name, args, 2)?);
            Ok(number(value.max(low).min(high)))
        }
        "lerp" => {
            arity(name, args, 3, 3)?;
            let (start, end, t) = (float(name, args, 0)?, float(name, args, 1)?, float(name, args, 2)?);
            Ok(number(start + (end - start) * t))
        }
        "inverse_lerp" => {
            arity(name, args, 3, 3)?;
            let (start, end, value) = (float(name, args, 0)?, float(name, args, 1)?, float(name, args, 2)?);
            if end == start {
                return Ok(number(0.0));
            }
            Ok(number((value - start) / (end - start)))
        }
        "factorial" => {
            arity(name, args, 1, 1)?;
            let n = integer(name, args, 0)?;
            Ok(if n < 0 { Value::Null } else { number(factorial(n as u64)) })
        }
        "combinations" | "permutations" => {
            arity(name, args, 2, 2)?;
            let (n, k) = (integer(name, args, 0)?, integer(name, args, 1)?);
            if n < 0 || k < 0 || k > n {
                return Ok(number(0.0));
            }
            let steps = if name == "combinations" { k.min(n - k) } else { k };
            if steps > MAX_RANGE as i64 {
                return Ok(Value::Null);
            }
            let mut result = 1.0;
            for step in 0..steps {
                result *= (n - step) as f64;
            }
            if name == "combinations" {
                result /= factorial(steps as u64);
            }
            Ok(number(result.round()))
        }
        "distance" => {
            let (left, right) = match args {
                [Value::Array(a), Value::Array(b)] => (a.clone(), b.clone()),
                [x1, y1, x2, y2] => (vec![x1.clone(), y1.clone()], vec![x2.clone(), y2.clone()]),
                _ => {
                    return Err(EvalError::Arity {
                        name: name.to_string(),
                        expected: "2 or 4".to_string(),
                        received: args.len(),
                    });
                }
            };
            let squared: f64 = left
                .iter()
                .zip(right.iter())
                .map(|(a, b)| (as_number(a).unwrap_or(0.0) - as_number(b).unwrap_or(0.0)).powi(2))
                .sum();
            Ok(number(squared.sqrt()))
        }

        // random
        "random" => {
            arity(name, args, 0, 2)?;
            Ok(match args.len() {
                0 => number(rng.next_f64()),
                1 => number(rng.uniform(0.0, float(name, args, 0)?)),
                _ => number(rng.uniform(float(name, args, 0)?, float(name, args, 1)?)),
            })
        }
        "random_int" => {
            arity(name, args, 1, 2)?;
            let (low, high) = if args.len() == 1 {
                (0, integer(name, args, 0)?)
            } else {
                (integer(name, args, 0)?, integer(name, args, 1)?)
            };
            Ok(number(rng.int_inclusive(low, high) as f64))
        }
        "random_normal" => {
            arity(name, args, 0, 2)?;
            let mean = if !args.is_empty() { float(name, args, 0)? } else { 0.0 };
            let deviation = if args.len() == 2 { float(name, args, 1)? } else { 1.0 };
            Ok(number(rng.normal(mean, deviation)))
        }
        "coin" => {
            arity(name, args, 0, 1)?;
            let probability = if args.len() == 1 { float(name, args, 0)? } else { 0.5 };
            Ok(Value::Bool(rng.next_f64() < probability))
        }
        "dice" => {
            arity(name, args, 0, 2)?;
            let sides = if !args.is_empty() { integer(name, args, 0)? } else { 6 };
            let count = if args.len() == 2 { integer(name, args, 1)? } else { 1 };
            let total: i64 = (0..count.clamp(0, MAX_RANGE as i64))
                .map(|_| rng.int_inclusive(1, sides.max(1)))
                .sum();
            Ok(number(total as f64))
        }
        "weighted_choice" => {
            arity(name, args, 1, 2)?;
            let (items, weights): (Vec<Value>, Vec<f64>) = match (&args[0], args.get(1)) {
                (Value::Object(map), None) => map
                    .iter()
                    .map(|(key, weight)| (Value::String(key.clone()), as_number(weight).unwrap_or(0.0)))
                    .unzip(),
                (Value::Array(items), Some(Value::Array(weights))) => (
                    items.clone(),
                    weights.iter().map(|weight| as_number(weight).unwrap_or(0.0)).collect(),
                ),
                (Value::Array(items), None) => (items.clone(), vec![1.0; items.len()]),
                _ => return Err(EvalError::Type("weighted_choice expects an object or arrays".into())),
            };
            if items.len() != weights.len() {
                return Err(EvalError::Type("weighted_choice weights must match items".into()));
            }
            Ok(rng
                .weighted(&weights)
                .and_then(|index| items.get(index).cloned())
                .unwrap_or(Value::Null))
        }
        "pick" => {
            arity(name, args, 1, 1)?;
            let items = array(name, args, 0)?;
            Ok(rng
                .index(items.len())
                .map(|index| items[index].clone())
                .unwrap_or(Value::Null))
        }
        "shuffle" => {
            arity(name, args, 1, 1)?;
            let mut items = array(name, args, 0)?.clone();
            rng.shuffle(&mut items);
            Ok(Value::Array(items))
        }
        "sample" => {
            arity(name, args, 2, 2)?;
            let mut items = array(name, args, 0)?.clone();
            let count = integer(name, args, 1)?.max(0) as usize;
            rng.shuffle(&mut items);
            items.truncate(count);
            Ok(Value::Array(items))
        }

        // casts and inspection
        "to_number" => {
            arity(name, args, 1, 1)?;
            Ok(to_number(&args[0]))
        }
        "to_string" => {
            arity(name, args, 1, 1)?;
            Ok(Value::String(stringify(&args[0])))
        }
        "to_boolean" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(to_boolean(&args[0])))
        }
        "to_enum" => {
            arity(name, args, 2, 2)?;
            let options = match &args[1] {
                Value::Array(items) => items.iter().map(stringify).collect(),
                other => enum_options(&stringify(other)),
            };
            Ok(to_enum(&args[0], &options))
        }
        "is_null" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(args[0].is_null()))
        }
        "type_of" => {
            arity(name, args, 1, 1)?;
            Ok(Value::String(type_name(&args[0]).to_string()))
        }
        "keys" => {
            arity(name, args, 1, 1)?;
            Ok(match &args[0] {
                Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
                _ => Value::Array(Vec::new()),
            })
        }
        "values" => {
            arity(name, args, 1, 1)?;
            Ok(match &args[0] {
                Value::Object(map) => Value::Array(map.values().cloned().collect()),
                _ => Value::Array(Vec::new()),
            })
        }
        "merge" => {
            let mut merged = Map::new();
            for arg in args {
                if let Value::Object(map) = arg {
                    merged.extend(map.clone());
                }
            }
            Ok(Value::Object(merged))
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

/// Length of a string (chars), array, or object; null is 0
pub fn length(value: &Value) -> usize {
    match value {
        Value::String(text) => text.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => stringify(other).chars().count(),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    if args.len() < min || args.len() > max {
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected: if min == max {
                min.to_string()
            } else {
                format!("{}..{}", min, max)
            },
            received: args.len(),
        });
    }
    Ok(())
}

fn float(name: &str, args: &[Value], index: usize) -> EvalResult<f64> {
    args.get(index)
        .and_then(as_number)
        .ok_or_else(|| EvalError::Type(format!("{} expects a number for argument {}", name, index + 1)))
}

fn integer(name: &str, args: &[Value], index: usize) -> EvalResult<i64> {
    float(name, args, index).map(|value| value.trunc() as i64)
}

fn array<'a>(name: &str, args: &'a [Value], index: usize) -> EvalResult<&'a Vec<Value>> {
    match args.get(index) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(EvalError::Type(format!("{} expects an array for argument {}", name, index + 1))),
    }
}

fn flatten_args(args: &[Value]) -> Vec<Value> {
    match args {
        [Value::Array(items)] => items.clone(),
        _ => args.to_vec(),
    }
}

fn numbers(name: &str, args: &[Value]) -> EvalResult<Vec<f64>> {
    flatten_args(args)
        .iter()
        .map(|value| {
            as_number(value).ok_or_else(|| EvalError::Type(format!("{} expects numbers", name)))
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn unique(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| loose_eq(seen, item)) {
            out.push(item.clone());
        }
    }
    out
}

fn bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
    let resolve = |index: i64| -> usize {
        if index < 0 {
            (len as i64 + index).max(0) as usize
        } else {
            (index as usize).min(len)
        }
    };
    let from = resolve(start);
    let to = end.map(resolve).unwrap_or(len);
    (from, to.max(from))
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => stringify(left).cmp(&stringify(right)),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn factorial(n: u64) -> f64 {
    (1..=n.min(170)).map(|value| value as f64).product()
}

fn string_map(name: &str, args: &[Value], map: impl Fn(&str) -> String) -> EvalResult<Value> {
    arity(name, args, 1, 1)?;
    Ok(Value::String(map(&stringify(&args[0]))))
}

fn unary_math(name: &str, args: &[Value], op: impl Fn(f64) -> f64) -> EvalResult<Value> {
    arity(name, args, 1, 1)?;
    Ok(number(op(float(name, args, 0)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, args: Vec<Value>) -> Value {
        let mut rng = Prng::from_seed("functions", 0);
        call(name, &args, &mut rng).unwrap()
    }

    #[test]
    fn test_array_helpers() {
        assert_eq!(run("first", vec![json!([3, 4])]), json!(3));
        assert_eq!(run("nth", vec![json!([1, 2, 3]), json!(-1)]), json!(3));
        assert_eq!(run("slice", vec![json!([1, 2, 3, 4]), json!(1), json!(-1)]), json!([2, 3]));
        assert_eq!(run("sort", vec![json!([3, 1, 2])]), json!([1, 2, 3]));
        assert_eq!(run("unique", vec![json!([1, 1.0, "a", "a"])]), json!([1, "a"]));
        assert_eq!(run("flatten", vec![json!([[1], 2, [3, [4]]])]), json!([1, 2, 3, [4]]));
        assert_eq!(run("intersection", vec![json!([1, 2, 3]), json!([2, 3, 4])]), json!([2, 3]));
        assert_eq!(run("difference", vec![json!([1, 2, 3]), json!([2])]), json!([1, 3]));
        assert_eq!(run("range", vec![json!(3)]), json!([0, 1, 2]));
    }

    #[test]
    fn test_statistics() {
        assert_eq!(run("sum", vec![json!([1, 2, 3])]), json!(6));
        assert_eq!(run("mean", vec![json!(2), json!(4)]), json!(3));
        assert_eq!(run("median", vec![json!([5, 1, 3, 2])]), json!(2.5));
        assert_eq!(run("mode", vec![json!(["a", "b", "b"])]), json!("b"));
        assert_eq!(run("max", vec![json!([1, 9, 4])]), json!(9));
        assert_eq!(run("min", vec![json!(4), json!(-2)]), json!(-2));
        assert_eq!(run("stdev", vec![json!([2, 4, 4, 4, 5, 5, 7, 9])]), json!(2));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(run("title", vec![json!("the old mill")]), json!("The Old Mill"));
        assert_eq!(run("pad_start", vec![json!("7"), json!(3), json!("0")]), json!("007"));
        assert_eq!(run("split", vec![json!("a-b"), json!("-")]), json!(["a", "b"]));
        assert_eq!(run("join", vec![json!(["a", 1]), json!(" ")]), json!("a 1"));
        assert_eq!(run("index_of", vec![json!("héllo"), json!("l")]), json!(2));
        assert_eq!(run("replace", vec![json!("a.a"), json!("a"), json!("b")]), json!("b.b"));
    }

    #[test]
    fn test_dispatching_helpers() {
        assert_eq!(run("length", vec![json!("héllo")]), json!(5));
        assert_eq!(run("length", vec![json!([1, 2])]), json!(2));
        assert_eq!(run("includes", vec![json!("lantern"), json!("ant")]), json!(true));
        assert_eq!(run("includes", vec![json!([1, 2]), json!(2.0)]), json!(true));
        assert_eq!(run("slice", vec![json!("lantern"), json!(0), json!(3)]), json!("lan"));
    }

    #[test]
    fn test_math_helpers() {
        assert_eq!(run("round", vec![json!(2.346), json!(2)]), json!(2.35));
        assert_eq!(run("clamp", vec![json!(12), json!(0), json!(10)]), json!(10));
        assert_eq!(run("lerp", vec![json!(0), json!(10), json!(0.5)]), json!(5));
        assert_eq!(run("factorial", vec![json!(5)]), json!(120));
        assert_eq!(run("combinations", vec![json!(5), json!(2)]), json!(10));
        assert_eq!(run("permutations", vec![json!(5), json!(2)]), json!(20));
        assert_eq!(run("distance", vec![json!(0), json!(0), json!(3), json!(4)]), json!(5));
    }

    #[test]
    fn test_oversized_arguments_are_bounded() {
        let padded = run("pad_start", vec![json!("a"), json!(1e12)]);
        assert_eq!(padded.as_str().map(|text| text.chars().count()), Some(MAX_RANGE));
        let padded = run("pad_end", vec![json!("ab"), json!(1e12), json!("-")]);
        assert_eq!(padded.as_str().map(|text| text.len()), Some(MAX_RANGE));
        assert_eq!(run("combinations", vec![json!(1e18), json!(1e17)]), json!(null));
        assert_eq!(run("permutations", vec![json!(1e18), json!(1e17)]), json!(null));
        assert_eq!(run("combinations", vec![json!(100_000), json!(99_999)]), json!(100_000));
    }

    #[test]
    fn test_random_family_is_reproducible() {
        let mut first = Prng::from_seed("s", 7);
        let mut second = Prng::from_seed("s", 7);
        for name in ["random", "coin", "dice"] {
            assert_eq!(call(name, &[], &mut first).unwrap(), call(name, &[], &mut second).unwrap());
        }
        let deck = json!([1, 2, 3, 4, 5]);
        assert_eq!(
            call("shuffle", &[deck.clone()], &mut first).unwrap(),
            call("shuffle", &[deck], &mut second).unwrap()
        );
        let roll = call("dice", &[json!(6), json!(3)], &mut first).unwrap();
        let total = roll.as_i64().unwrap();
        assert!((3..=18).contains(&total));
    }

    #[test]
    fn test_weighted_choice_respects_zero_weights() {
        let mut rng = Prng::from_seed("w", 1);
        for _ in 0..20 {
            let choice = call("weighted_choice", &[json!({"a": 0, "b": 2})], &mut rng).unwrap();
            assert_eq!(choice, json!("b"));
        }
    }

    #[test]
    fn test_errors_are_typed() {
        let mut rng = Prng::from_seed("e", 0);
        assert!(matches!(call("nope", &[], &mut rng), Err(EvalError::UnknownFunction(_))));
        assert!(matches!(call("upper", &[], &mut rng), Err(EvalError::Arity { .. })));
        assert!(matches!(call("sort", &[json!(1)], &mut rng), Err(EvalError::Type(_))));
    }
}
