use serde_json::{Number, Value};

use super::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::error::{EvalError, EvalResult};

/// Parse a single expression; trailing input is an error
pub fn parse_expression(source: &str) -> EvalResult<Expr> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Parse a statement list (script bodies, modules, `<code>`)
pub fn parse_program(source: &str) -> EvalResult<Vec<Stmt>> {
    let mut parser = Parser::new(source);
    let statements = parser.parse_statements(false)?;
    Ok(statements)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn advance(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }

    fn error(&self, message: &str) -> EvalError {
        EvalError::Syntax {
            message: message.to_string(),
            offset: self.index,
        }
    }

    fn skip_ws(&mut self) {
        loop {
            while let Some(ch) = self.current() {
                if ch.is_ascii_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.current() == Some(b'/') && self.peek(1) == Some(b'/') {
                while let Some(ch) = self.current() {
                    self.advance();
                    if ch == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if self.current() == Some(b'/') && self.peek(1) == Some(b'*') {
                match self.src[self.index + 2..].find("*/") {
                    Some(offset) => self.index += offset + 4,
                    None => self.index = self.bytes.len(),
                }
                continue;
            }
            break;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.src[self.index..].starts_with(token) {
            self.index += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> EvalResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", token)))
        }
    }

    /// Peek a keyword without consuming it
    fn at_keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let rest = &self.src[self.index..];
        rest.starts_with(word)
            && !rest[word.len()..]
                .bytes()
                .next()
                .is_some_and(is_ident_byte)
    }

    fn parse_statements(&mut self, in_block: bool) -> EvalResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            self.skip_ws();
            while self.current() == Some(b';') {
                self.advance();
                self.skip_ws();
            }
            if self.eof() {
                if in_block {
                    return Err(self.error("unterminated block"));
                }
                break;
            }
            if in_block && self.current() == Some(b'}') {
                self.advance();
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> EvalResult<Stmt> {
        if self.at_keyword("let") || self.at_keyword("const") || self.at_keyword("var") {
            self.index += self.src[self.index..]
                .bytes()
                .take_while(|byte| is_ident_byte(*byte))
                .count();
            self.skip_ws();
            let name = self.parse_ident()?;
            self.expect("=")?;
            let value = self.parse_expr()?;
            return Ok(Stmt::Let(name, value));
        }

        if self.at_keyword("if") {
            self.index += 2;
            self.expect("(")?;
            let cond = self.parse_expr()?;
            self.expect(")")?;
            let then = self.parse_body()?;
            let otherwise = if self.at_keyword("else") {
                self.index += 4;
                if self.at_keyword("if") {
                    vec![self.parse_statement()?]
                } else {
                    self.parse_body()?
                }
            } else {
                Vec::new()
            };
            return Ok(Stmt::If(cond, then, otherwise));
        }

        let target = self.parse_expr()?;
        self.skip_ws();
        let compound = match (self.current(), self.peek(1)) {
            (Some(b'='), next) if next != Some(b'=') => Some(None),
            (Some(b'+'), Some(b'=')) => Some(Some(BinaryOp::Add)),
            (Some(b'-'), Some(b'=')) => Some(Some(BinaryOp::Sub)),
            (Some(b'*'), Some(b'=')) => Some(Some(BinaryOp::Mul)),
            (Some(b'/'), Some(b'=')) => Some(Some(BinaryOp::Div)),
            _ => None,
        };
        match compound {
            Some(op) => {
                if !target.is_place() {
                    return Err(EvalError::InvalidTarget(format!("{:?}", target)));
                }
                self.index += if op.is_some() { 2 } else { 1 };
                let value = self.parse_expr()?;
                Ok(Stmt::Assign(target, op, value))
            }
            None => Ok(Stmt::Expr(target)),
        }
    }

    fn parse_body(&mut self) -> EvalResult<Vec<Stmt>> {
        if self.eat("{") {
            self.parse_statements(true)
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_expr(&mut self) -> EvalResult<Expr> {
        let cond = self.parse_binary(0)?;
        self.skip_ws();
        if self.current() == Some(b'?') && self.peek(1) != Some(b'?') && self.peek(1) != Some(b'.') {
            self.advance();
            let then = self.parse_expr()?;
            self.expect(":")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    /// Precedence climbing over the binary levels
    fn parse_binary(&mut self, level: usize) -> EvalResult<Expr> {
        if level >= LEVELS.len() {
            return self.parse_power();
        }
        let mut left = self.parse_binary(level + 1)?;
        loop {
            self.skip_ws();
            let Some((token, op)) = LEVELS[level]
                .iter()
                .find(|(token, _)| self.matches_operator(token))
                .copied()
            else {
                break;
            };
            self.index += token.len();
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn matches_operator(&self, token: &str) -> bool {
        let rest = &self.src[self.index..];
        if !rest.starts_with(token) {
            return false;
        }
        let following = rest.as_bytes().get(token.len()).copied();
        match token {
            "+" | "-" | "*" | "/" => following != Some(b'=') && !(token == "*" && following == Some(b'*')),
            "<" | ">" => following != Some(b'='),
            "==" | "!=" => following != Some(b'='),
            "%" => following != Some(b'}'),
            _ => true,
        }
    }

    fn parse_power(&mut self) -> EvalResult<Expr> {
        let base = self.parse_unary()?;
        self.skip_ws();
        if self.src[self.index..].starts_with("**") {
            self.index += 2;
            // right associative
            let exponent = self.parse_power()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> EvalResult<Expr> {
        self.skip_ws();
        match self.current() {
            Some(b'!') => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(b'-') => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            Some(b'+') => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_ws();
            match self.current() {
                Some(b'.') if self.peek(1).is_some_and(is_ident_start) => {
                    self.advance();
                    let name = self.parse_ident()?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                Some(b'?') if self.peek(1) == Some(b'.') => {
                    // optional chaining reads the same as plain access; missing is null
                    self.index += 2;
                    let name = self.parse_ident()?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                Some(b'[') => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect("]")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> EvalResult<Expr> {
        self.skip_ws();
        let Some(ch) = self.current() else {
            return Err(self.error("unexpected end of input"));
        };
        match ch {
            b'(' => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(")")?;
                Ok(expr)
            }
            b'[' => {
                self.advance();
                let items = self.parse_list(b']')?;
                Ok(Expr::Array(items))
            }
            b'{' => self.parse_object(),
            b'"' | b'\'' | b'`' => Ok(Expr::Literal(Value::String(self.parse_string()?))),
            b'0'..=b'9' | b'.' => self.parse_number(),
            ch if is_ident_start(ch) => {
                let name = self.parse_ident()?;
                match name.as_str() {
                    "true" => return Ok(Expr::Literal(Value::Bool(true))),
                    "false" => return Ok(Expr::Literal(Value::Bool(false))),
                    "null" | "undefined" => return Ok(Expr::Literal(Value::Null)),
                    _ => {}
                }
                self.skip_ws();
                if self.current() == Some(b'(') {
                    self.advance();
                    let args = self.parse_list(b')')?;
                    return Ok(Expr::Call(name, args));
                }
                Ok(Expr::Ident(name))
            }
            _ => Err(self.error(&format!("unexpected character '{}'", ch as char))),
        }
    }

    fn parse_list(&mut self, close: u8) -> EvalResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.current() == Some(close) {
                self.advance();
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            self.skip_ws();
            match self.current() {
                Some(b',') => self.advance(),
                Some(ch) if ch == close => {}
                _ => return Err(self.error(&format!("expected ',' or '{}'", close as char))),
            }
        }
    }

    fn parse_object(&mut self) -> EvalResult<Expr> {
        // consume '{'
        self.advance();
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.current() == Some(b'}') {
                self.advance();
                return Ok(Expr::Object(entries));
            }
            let key = match self.current() {
                Some(b'"' | b'\'') => self.parse_string()?,
                Some(ch) if is_ident_start(ch) => self.parse_ident()?,
                Some(b'0'..=b'9') => {
                    let start = self.index;
                    while self.current().is_some_and(|ch| ch.is_ascii_digit()) {
                        self.advance();
                    }
                    self.src[start..self.index].to_string()
                }
                _ => return Err(self.error("expected object key")),
            };
            self.skip_ws();
            let value = if self.eat(":") {
                self.parse_expr()?
            } else {
                // shorthand `{name}`
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            self.skip_ws();
            match self.current() {
                Some(b',') => self.advance(),
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn parse_ident(&mut self) -> EvalResult<String> {
        self.skip_ws();
        let start = self.index;
        if !self.current().is_some_and(is_ident_start) {
            return Err(self.error("expected identifier"));
        }
        while self.current().is_some_and(is_ident_byte) {
            self.advance();
        }
        Ok(self.src[start..self.index].to_string())
    }

    fn parse_number(&mut self) -> EvalResult<Expr> {
        let start = self.index;
        let mut is_float = false;
        while let Some(ch) = self.current() {
            match ch {
                b'0'..=b'9' | b'_' => self.advance(),
                b'.' if !is_float && self.peek(1).is_some_and(|next| next.is_ascii_digit()) => {
                    is_float = true;
                    self.advance();
                }
                b'e' | b'E' if self.peek(1).is_some_and(|next| next.is_ascii_digit() || next == b'-' || next == b'+') => {
                    is_float = true;
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }
        let text: String = self.src[start..self.index].chars().filter(|ch| *ch != '_').collect();
        if text.is_empty() || text == "." {
            return Err(self.error("invalid number"));
        }
        if !is_float {
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(Expr::Literal(Value::Number(integer.into())));
            }
        }
        let float: f64 = text.parse().map_err(|_| self.error("invalid number"))?;
        Number::from_f64(float)
            .map(|number| Expr::Literal(Value::Number(number)))
            .ok_or_else(|| self.error("number out of range"))
    }

    fn parse_string(&mut self) -> EvalResult<String> {
        let Some(quote) = self.current() else {
            return Err(self.error("expected string"));
        };
        self.advance();
        let mut out = String::new();
        loop {
            let Some(ch) = self.current() else {
                return Err(self.error("unterminated string"));
            };
            if ch == quote {
                self.advance();
                return Ok(out);
            }
            if ch == b'\\' {
                self.advance();
                let Some(escaped) = self.current() else {
                    return Err(self.error("unterminated escape"));
                };
                self.advance();
                out.push(match escaped {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'0' => '\0',
                    other => other as char,
                });
                continue;
            }
            // copy a whole UTF-8 scalar
            let rest = &self.src[self.index..];
            let Some(scalar) = rest.chars().next() else {
                return Err(self.error("unterminated string"));
            };
            out.push(scalar);
            self.index += scalar.len_utf8();
        }
    }
}

const LEVELS: &[&[(&str, BinaryOp)]] = &[
    &[("??", BinaryOp::Coalesce)],
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[
        ("===", BinaryOp::Eq),
        ("!==", BinaryOp::Ne),
        ("==", BinaryOp::Eq),
        ("!=", BinaryOp::Ne),
    ],
    &[
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Rem),
    ],
];

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_byte(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(value: Value) -> Box<Expr> {
        Box::new(Expr::Literal(value))
    }

    #[test]
    fn test_precedence_and_associativity() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                lit(json!(1)),
                Box::new(Expr::Binary(BinaryOp::Mul, lit(json!(2)), lit(json!(3))))
            )
        );
        let power = parse_expression("2 ** 3 ** 2").unwrap();
        assert_eq!(
            power,
            Expr::Binary(
                BinaryOp::Pow,
                lit(json!(2)),
                Box::new(Expr::Binary(BinaryOp::Pow, lit(json!(3)), lit(json!(2))))
            )
        );
    }

    #[test]
    fn test_ternary_coalesce_and_calls() {
        let expr = parse_expression("a ?? b ? upper(name) : 'x'").unwrap();
        match expr {
            Expr::Conditional(cond, then, _) => {
                assert!(matches!(*cond, Expr::Binary(BinaryOp::Coalesce, _, _)));
                assert_eq!(*then, Expr::Call("upper".into(), vec![Expr::Ident("name".into())]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_member_index_and_literals() {
        let expr = parse_expression("player.items[0]").unwrap();
        assert_eq!(expr.as_path(), Some("player.items.0".to_string()));
        let object = parse_expression("{a: [1, 2.5], 'b': \"x\\n\"}").unwrap();
        assert!(matches!(object, Expr::Object(ref entries) if entries.len() == 2));
    }

    #[test]
    fn test_statements_split_on_semicolons_and_newlines() {
        let program = parse_program("let x = 1; x += 2\ny = x * 2\nif (y > 4) { z = 1 } else z = 0").unwrap();
        assert_eq!(program.len(), 4);
        assert!(matches!(program[1], Stmt::Assign(_, Some(BinaryOp::Add), _)));
        assert!(matches!(program[3], Stmt::If(_, ref then, ref otherwise) if then.len() == 1 && otherwise.len() == 1));
    }

    #[test]
    fn test_comments_are_skipped() {
        let program = parse_program("// setup\nx = 1 /* inline */ + 1").unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn test_syntax_errors_report_offsets() {
        assert!(matches!(
            parse_expression("1 +"),
            Err(EvalError::Syntax { .. })
        ));
        assert!(matches!(
            parse_expression("(1"),
            Err(EvalError::Syntax { .. })
        ));
        assert!(matches!(
            parse_program("1 = 2"),
            Err(EvalError::InvalidTarget(_))
        ));
    }
}
