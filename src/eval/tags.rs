//! Derived tag rules
//!
//! A tag rule is a named expression. Rules may mention other rules by name;
//! those tokens are resolved first (for the same subject), memoized, and a
//! rule that is already being resolved for a subject reads as `0`, so
//! mutually referential rules terminate without any ordering by the author.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::ast::Expr;
use super::interp::{Interpreter, Scope};
use super::parser::parse_expression;
use super::path;
use super::random::Prng;
use super::value::truthy;

/// One compiled rule
#[derive(Debug, Clone, Serialize)]
pub struct TagRule {
    /// Tag name
    pub name: String,
    /// Rule source text
    pub rule: String,
    /// Free identifiers of the rule, in first-use order
    pub tokens: Vec<String>,
    #[serde(skip)]
    expr: Expr,
}

/// Rule set compiled once per story
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TagRules {
    rules: Vec<TagRule>,
}

impl TagRules {
    /// Compile `(name, rule)` pairs; unparseable rules are logged and dropped
    pub fn compile<I, N, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, R)>,
        N: Into<String>,
        R: Into<String>,
    {
        let mut rules = Vec::new();
        for (name, rule) in pairs {
            let name = name.into();
            let rule = rule.into();
            match parse_expression(&rule) {
                Ok(expr) => {
                    let mut tokens = Vec::new();
                    expr.identifiers(&mut tokens);
                    rules.push(TagRule {
                        name,
                        rule,
                        tokens,
                        expr,
                    });
                }
                Err(error) => tracing::warn!("dropping tag rule {}: {}", name, error),
            }
        }
        Self { rules }
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterate over compiled rules
    pub fn iter(&self) -> impl Iterator<Item = &TagRule> {
        self.rules.iter()
    }

    /// Merge rules from another set; later names replace earlier ones
    pub fn extend(&mut self, other: TagRules) {
        for rule in other.rules {
            self.rules.retain(|existing| existing.name != rule.name);
            self.rules.push(rule);
        }
    }

    /// Value of one rule for a subject
    pub fn evaluate(&self, name: &str, subject: &str, scope: &dyn Scope, rng: &mut Prng) -> Value {
        let mut resolution = Resolution::new(self, scope);
        resolution.resolve(name, subject, rng)
    }

    /// Names of all rules that are truthy for a subject
    pub fn matching(&self, subject: &str, scope: &dyn Scope, rng: &mut Prng) -> Vec<String> {
        let mut resolution = Resolution::new(self, scope);
        self.rules
            .iter()
            .filter(|rule| truthy(&resolution.resolve(&rule.name, subject, rng)))
            .map(|rule| rule.name.clone())
            .collect()
    }

    fn rule(&self, name: &str) -> Option<&TagRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }
}

struct Resolution<'a> {
    rules: &'a TagRules,
    base: &'a dyn Scope,
    memo: HashMap<(String, String), Value>,
    resolving: HashSet<(String, String)>,
}

impl<'a> Resolution<'a> {
    fn new(rules: &'a TagRules, base: &'a dyn Scope) -> Self {
        Self {
            rules,
            base,
            memo: HashMap::new(),
            resolving: HashSet::new(),
        }
    }

    fn resolve(&mut self, name: &str, subject: &str, rng: &mut Prng) -> Value {
        let key = (subject.to_string(), name.to_string());
        if let Some(value) = self.memo.get(&key) {
            return value.clone();
        }
        if self.resolving.contains(&key) {
            return Value::from(0);
        }
        let Some(rule) = self.rules.rule(name) else {
            return Value::Null;
        };

        self.resolving.insert(key.clone());
        let mut overlay = Map::new();
        overlay.insert("subject".to_string(), Value::String(subject.to_string()));
        for token in &rule.tokens {
            if token != name && self.rules.rule(token).is_some() {
                let value = self.resolve(token, subject, rng);
                overlay.insert(token.clone(), value);
            } else if token == name {
                overlay.insert(token.clone(), Value::from(0));
            }
        }
        let mut scope = OverlayScope {
            overlay,
            base: self.base,
        };
        let value = Interpreter::new(&mut scope, rng)
            .eval(&rule.expr)
            .unwrap_or_else(|error| {
                tracing::warn!("tag rule {} failed for {}: {}", name, subject, error);
                Value::Null
            });
        self.resolving.remove(&key);
        self.memo.insert(key, value.clone());
        value
    }
}

/// Read-through overlay; writes never reach the base scope
struct OverlayScope<'a> {
    overlay: Map<String, Value>,
    base: &'a dyn Scope,
}

impl Scope for OverlayScope<'_> {
    fn lookup(&self, key: &str) -> Value {
        if self.overlay.contains_key(path::root(key)) {
            return path::get_in(&self.overlay, key).cloned().unwrap_or(Value::Null);
        }
        self.base.lookup(key)
    }

    fn assign(&mut self, key: &str, value: Value) {
        path::set_in(&mut self.overlay, key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::interp::MapScope;
    use serde_json::json;

    fn scope(values: Value) -> MapScope {
        match values {
            Value::Object(map) => MapScope::new(map),
            _ => MapScope::default(),
        }
    }

    #[test]
    fn test_rules_reference_each_other() {
        let rules = TagRules::compile(vec![
            ("angry", "mood == 'angry'"),
            ("hostile", "angry && armed"),
        ]);
        let base = scope(json!({"mood": "angry", "armed": true}));
        let mut rng = Prng::from_seed("tags", 0);
        assert_eq!(rules.matching("guard", &base, &mut rng), vec!["angry", "hostile"]);
    }

    #[test]
    fn test_mutual_recursion_reads_zero() {
        let rules = TagRules::compile(vec![("a", "b + 1"), ("b", "a + 1")]);
        let base = MapScope::default();
        let mut rng = Prng::from_seed("tags", 0);
        // resolving a: b is resolved with a reading 0, so b = 1 and a = 2
        assert_eq!(rules.evaluate("a", "x", &base, &mut rng), json!(2));
        assert_eq!(rules.evaluate("b", "x", &base, &mut rng), json!(2));
    }

    #[test]
    fn test_self_reference_and_bad_rules() {
        let rules = TagRules::compile(vec![("loop", "loop + 5"), ("broken", "(")]);
        assert_eq!(rules.len(), 1);
        let base = MapScope::default();
        let mut rng = Prng::from_seed("tags", 0);
        assert_eq!(rules.evaluate("loop", "x", &base, &mut rng), json!(5));
    }

    #[test]
    fn test_subject_is_visible_to_rules() {
        let rules = TagRules::compile(vec![("is_narrator", "subject == 'narrator'")]);
        let base = MapScope::default();
        let mut rng = Prng::from_seed("tags", 0);
        assert_eq!(rules.matching("narrator", &base, &mut rng), vec!["is_narrator"]);
        assert!(rules.matching("guard", &base, &mut rng).is_empty());
    }
}
