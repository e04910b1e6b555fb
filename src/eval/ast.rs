//! Expression and statement syntax tree

use serde_json::Value;

/// Binary operators, loosest binding last in the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `??`
    Coalesce,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==` / `===`
    Eq,
    /// `!=` / `!==`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `**`
    Pow,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Bare identifier
    Ident(String),
    /// Array literal
    Array(Vec<Expr>),
    /// Object literal
    Object(Vec<(String, Expr)>),
    /// `target.name`
    Member(Box<Expr>, String),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `name(args)`
    Call(String, Vec<Expr>),
    /// Prefix operator
    Unary(UnaryOp, Box<Expr>),
    /// Infix operator
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : otherwise`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Dotted path for plain identifier/member chains (`a.b.c`)
    pub fn as_path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member(target, name) => Some(format!("{}.{}", target.as_path()?, name)),
            Expr::Index(target, index) => match index.as_ref() {
                Expr::Literal(Value::Number(number)) => {
                    Some(format!("{}.{}", target.as_path()?, number))
                }
                Expr::Literal(Value::String(key)) => Some(format!("{}.{}", target.as_path()?, key)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the expression can be assigned to
    pub fn is_place(&self) -> bool {
        match self {
            Expr::Ident(_) => true,
            Expr::Member(target, _) | Expr::Index(target, _) => target.is_place(),
            _ => false,
        }
    }

    /// Collect free identifiers in evaluation order (no duplicates)
    pub fn identifiers(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ident(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::Array(items) => items.iter().for_each(|item| item.identifiers(out)),
            Expr::Object(entries) => entries.iter().for_each(|(_, item)| item.identifiers(out)),
            Expr::Member(target, _) => target.identifiers(out),
            Expr::Index(target, index) => {
                target.identifiers(out);
                index.identifiers(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|arg| arg.identifiers(out)),
            Expr::Unary(_, operand) => operand.identifiers(out),
            Expr::Binary(_, left, right) => {
                left.identifiers(out);
                right.identifiers(out);
            }
            Expr::Conditional(cond, then, otherwise) => {
                cond.identifiers(out);
                then.identifiers(out);
                otherwise.identifiers(out);
            }
        }
    }
}

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = value`
    Let(String, Expr),
    /// `target = value` or compound `target op= value`
    Assign(Expr, Option<BinaryOp>, Expr),
    /// `if (cond) { … } else { … }`
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    /// Expression evaluated for its effects
    Expr(Expr),
}
