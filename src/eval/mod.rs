//! Expression, statement and template evaluation
//!
//! Values are plain `serde_json::Value`s. Everything that needs variables goes
//! through the [`Scope`] trait, so scripts, conditions, templates and tag
//! rules share one scope model.

pub mod ast;
pub mod cast;
pub mod functions;
pub mod interp;
pub mod parser;
pub mod path;
pub mod random;
pub mod tags;
pub mod template;
pub mod value;

pub use interp::{Interpreter, MapScope, Scope};
pub use parser::{parse_expression, parse_program};
pub use random::Prng;
pub use tags::{TagRule, TagRules};
pub use template::{RenderContext, VariationSite, VariationState, expand_generated, interpolate, render};
pub use value::{stringify, truthy};

use serde_json::Value;

use crate::error::EvalResult;

/// Parse and evaluate a single expression
pub fn evaluate(source: &str, scope: &mut dyn Scope, rng: &mut Prng) -> EvalResult<Value> {
    let expr = parse_expression(source)?;
    Interpreter::new(scope, rng).eval(&expr)
}

/// Parse and run a statement list
pub fn execute(source: &str, scope: &mut dyn Scope, rng: &mut Prng) -> EvalResult<Value> {
    let program = parse_program(source)?;
    Interpreter::new(scope, rng).execute(&program)
}

/// Evaluate a condition; evaluation errors are logged and read as false
pub fn condition(source: &str, scope: &mut dyn Scope, rng: &mut Prng) -> bool {
    match evaluate(source, scope, rng) {
        Ok(value) => truthy(&value),
        Err(error) => {
            tracing::warn!("condition '{}' failed: {}", source, error);
            false
        }
    }
}
