//! Tree-walking interpreter for expressions and statements

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use super::functions::{self, length};
use super::path;
use super::random::Prng;
use super::value::{as_number, loose_eq, number, stringify, truthy};
use crate::error::{EvalError, EvalResult};

/// Variable environment seen by the evaluator.
///
/// Reads of unknown paths yield null; writes decide their own target layer.
pub trait Scope {
    /// Read a dotted path
    fn lookup(&self, path: &str) -> Value;

    /// Write a dotted path
    fn assign(&mut self, path: &str, value: Value);
}

/// Flat map scope, used for metadata interpolation and tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapScope {
    /// Backing values
    pub values: Map<String, Value>,
}

impl MapScope {
    /// Wrap an existing map
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl Scope for MapScope {
    fn lookup(&self, path: &str) -> Value {
        path::get_in(&self.values, path).cloned().unwrap_or(Value::Null)
    }

    fn assign(&mut self, path: &str, value: Value) {
        path::set_in(&mut self.values, path, value);
    }
}

/// Evaluator over a borrowed scope and random source.
///
/// `let` bindings stay local to one interpreter; every other write goes
/// through [`Scope::assign`].
pub struct Interpreter<'a> {
    scope: &'a mut dyn Scope,
    rng: &'a mut Prng,
    locals: Map<String, Value>,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter
    pub fn new(scope: &'a mut dyn Scope, rng: &'a mut Prng) -> Self {
        Self {
            scope,
            rng,
            locals: Map::new(),
        }
    }

    /// Run statements, returning the value of the last expression statement
    pub fn execute(&mut self, program: &[Stmt]) -> EvalResult<Value> {
        let mut last = Value::Null;
        for statement in program {
            last = self.statement(statement)?;
        }
        Ok(last)
    }

    fn statement(&mut self, statement: &Stmt) -> EvalResult<Value> {
        match statement {
            Stmt::Let(name, value) => {
                let value = self.eval(value)?;
                self.locals.insert(name.clone(), value);
                Ok(Value::Null)
            }
            Stmt::Assign(target, op, value) => {
                let path = self.place(target)?;
                let rhs = self.eval(value)?;
                let value = match op {
                    Some(op) => {
                        let current = self.read(&path);
                        arithmetic(*op, &current, &rhs)
                    }
                    None => rhs,
                };
                self.write(&path, value);
                Ok(Value::Null)
            }
            Stmt::If(cond, then, otherwise) => {
                let branch = if truthy(&self.eval(cond)?) { then } else { otherwise };
                self.execute(branch)
            }
            Stmt::Expr(expr) => self.eval(expr),
        }
    }

    /// Evaluate one expression
    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => Ok(self.read(name)),
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Member(target, name) => {
                let target = self.eval(target)?;
                Ok(member(&target, name))
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(element(&target, &index))
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(name, args)
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&self.eval(operand)?))),
            Expr::Unary(UnaryOp::Neg, operand) => {
                let value = self.eval(operand)?;
                Ok(as_number(&value).map(|float| number(-float)).unwrap_or(Value::Null))
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) { self.eval(right) } else { Ok(left) }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left)?;
                if truthy(&left) { Ok(left) } else { self.eval(right) }
            }
            Expr::Binary(BinaryOp::Coalesce, left, right) => {
                let left = self.eval(left)?;
                if left.is_null() { self.eval(right) } else { Ok(left) }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Conditional(cond, then, otherwise) => {
                if truthy(&self.eval(cond)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        match name {
            "get" => match args.as_slice() {
                [key] => Ok(self.read(&stringify(key))),
                [key, fallback] => {
                    let value = self.read(&stringify(key));
                    Ok(if value.is_null() { fallback.clone() } else { value })
                }
                _ => Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: "1..2".to_string(),
                    received: args.len(),
                }),
            },
            "set" => match args.as_slice() {
                [key, value] => {
                    self.write(&stringify(key), value.clone());
                    Ok(value.clone())
                }
                _ => Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: "2".to_string(),
                    received: args.len(),
                }),
            },
            _ => functions::call(name, &args, self.rng),
        }
    }

    fn place(&mut self, target: &Expr) -> EvalResult<String> {
        match target {
            Expr::Ident(name) => Ok(name.clone()),
            Expr::Member(inner, name) => Ok(format!("{}.{}", self.place(inner)?, name)),
            Expr::Index(inner, index) => {
                let base = self.place(inner)?;
                let key = self.eval(index)?;
                Ok(format!("{}.{}", base, stringify(&key)))
            }
            other => Err(EvalError::InvalidTarget(format!("{:?}", other))),
        }
    }

    fn read(&self, key: &str) -> Value {
        if self.locals.contains_key(path::root(key)) {
            return path::get_in(&self.locals, key).cloned().unwrap_or(Value::Null);
        }
        self.scope.lookup(key)
    }

    fn write(&mut self, key: &str, value: Value) {
        if self.locals.contains_key(path::root(key)) {
            path::set_in(&mut self.locals, key, value);
        } else {
            self.scope.assign(key, value);
        }
    }
}

fn member(target: &Value, name: &str) -> Value {
    match target {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(_) | Value::String(_) if name == "length" => number(length(target) as f64),
        _ => Value::Null,
    }
}

fn element(target: &Value, index: &Value) -> Value {
    match target {
        Value::Array(items) => as_number(index)
            .filter(|float| *float >= 0.0)
            .and_then(|float| items.get(float as usize).cloned())
            .unwrap_or(Value::Null),
        Value::String(text) => as_number(index)
            .filter(|float| *float >= 0.0)
            .and_then(|float| text.chars().nth(float as usize))
            .map(|ch| Value::String(ch.to_string()))
            .unwrap_or(Value::Null),
        Value::Object(_) => member(target, &stringify(index)),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_eq(left, right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => match (as_number(left), as_number(right)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            };
            Value::Bool(ordering.is_some_and(|ordering| match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        _ => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if op == BinaryOp::Add {
        match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                return Value::String(format!("{}{}", stringify(left), stringify(right)));
            }
            (Value::Array(a), Value::Array(b)) => {
                return Value::Array(a.iter().chain(b.iter()).cloned().collect());
            }
            _ => {}
        }
    }
    let (Some(a), Some(b)) = (as_number(left), as_number(right)) else {
        return Value::Null;
    };
    number(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => return Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::parser::{parse_expression, parse_program};
    use serde_json::json;

    fn eval_with(source: &str, scope: &mut MapScope) -> Value {
        let mut rng = Prng::from_seed("interp", 0);
        let expr = parse_expression(source).unwrap();
        Interpreter::new(scope, &mut rng).eval(&expr).unwrap()
    }

    fn eval(source: &str) -> Value {
        eval_with(source, &mut MapScope::default())
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3"), json!(7));
        assert_eq!(eval("7 / 2"), json!(3.5));
        assert_eq!(eval("2 ** 10"), json!(1024));
        assert_eq!(eval("'a' + 1"), json!("a1"));
        assert_eq!(eval("1 / 0"), Value::Null);
        assert_eq!(eval("[1] + [2]"), json!([1, 2]));
    }

    #[test]
    fn test_logic_returns_operands() {
        assert_eq!(eval("0 || 'x'"), json!("x"));
        assert_eq!(eval("'a' && 'b'"), json!("b"));
        assert_eq!(eval("null ?? 4"), json!(4));
        assert_eq!(eval("0 ?? 4"), json!(0));
        assert_eq!(eval("missing ? 1 : 2"), json!(2));
        assert_eq!(eval("!''"), json!(true));
        assert_eq!(eval("2 == 2.0"), json!(true));
        assert_eq!(eval("'b' > 'a'"), json!(true));
    }

    #[test]
    fn test_unknown_identifiers_read_null() {
        assert_eq!(eval("ghost"), Value::Null);
        assert_eq!(eval("ghost.deep.path"), Value::Null);
    }

    #[test]
    fn test_member_and_index_access() {
        let mut scope = MapScope::default();
        scope.assign("player", json!({"name": "Ada", "items": ["lamp", "key"]}));
        assert_eq!(eval_with("player.items[1]", &mut scope), json!("key"));
        assert_eq!(eval_with("player['name']", &mut scope), json!("Ada"));
        assert_eq!(eval_with("player.items.length", &mut scope), json!(2));
        assert_eq!(eval_with("upper(player.name)", &mut scope), json!("ADA"));
    }

    #[test]
    fn test_statements_write_through_scope_and_keep_lets_local() {
        let mut scope = MapScope::default();
        let mut rng = Prng::from_seed("interp", 0);
        let program = parse_program(
            "let bonus = 2; score = 10; score += bonus; set('flags.seen', true); if (score > 11) { rank = 'high' } else { rank = 'low' }",
        )
        .unwrap();
        Interpreter::new(&mut scope, &mut rng).execute(&program).unwrap();
        assert_eq!(scope.lookup("score"), json!(12));
        assert_eq!(scope.lookup("flags.seen"), json!(true));
        assert_eq!(scope.lookup("rank"), json!("high"));
        assert_eq!(scope.lookup("bonus"), Value::Null);
    }

    #[test]
    fn test_dynamic_index_assignment() {
        let mut scope = MapScope::default();
        scope.assign("slots", json!([0, 0, 0]));
        let mut rng = Prng::from_seed("interp", 0);
        let program = parse_program("let i = 1; slots[i] = 'x'").unwrap();
        Interpreter::new(&mut scope, &mut rng).execute(&program).unwrap();
        assert_eq!(scope.lookup("slots"), json!([0, "x", 0]));
    }
}
