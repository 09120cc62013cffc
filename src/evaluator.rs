//! Expression evaluator (component C). The design keeps the expression
//! *language* itself out of scope ("consumed, not specified") and only
//! requires an [`Evaluator`] seam the engine calls into for conditions,
//! size expressions, and evaluated-field values. A small self-contained
//! expression language is provided here so the crate is runnable
//! standalone, in the same spirit as the teacher's `Transform::apply`
//! (`crates/bitcraft/src/transform.rs`) providing a concrete default for a
//! capability the design otherwise only names.
//!
//! Grammar (field-path references against the current record, its parent,
//! and the decode root; arithmetic; comparisons; boolean connectives):
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := not_expr ( "&&" not_expr )*
//! not_expr   := "!" not_expr | cmp_expr
//! cmp_expr   := add_expr ( ("==" | "!=" | "<=" | ">=" | "<" | ">") add_expr )?
//! add_expr   := mul_expr ( ("+" | "-") mul_expr )*
//! mul_expr   := unary ( ("*" | "/" | "%") unary )*
//! unary      := "-" unary | primary
//! primary    := NUMBER | STRING | "true" | "false" | PATH | "(" expr ")"
//! ```
//!
//! `PATH` is a dotted identifier, optionally prefixed with `self.`,
//! `parent.`, or `root.` to pick which scope it resolves against (§4.5
//! "current object / parent / root").

use std::collections::HashMap;
use std::sync::RwLock;

use crate::context::GlobalContext;
use crate::errors::EngineError;
use crate::value::{Record, Value};

/// The scopes an expression's field-path references can resolve against.
pub struct EvalScope<'a> {
    pub current: &'a Record,
    pub parent: Option<&'a Record>,
    pub root: Option<&'a Record>,
    /// Process-wide bindings injected via `ParserBuilder::add_to_context`,
    /// resolved through the `context.<name>` path prefix (§4.4).
    pub context: Option<&'a GlobalContext>,
}

/// Evaluates boolean conditions, size expressions, and evaluated-field
/// values against a decode/encode-time scope.
pub trait Evaluator: Send + Sync {
    /// Evaluates `expression` to a [`Value`] (used for evaluated fields and
    /// enum/converter lookups).
    fn evaluate(&self, expression: &str, scope: &EvalScope) -> Result<Value, EngineError>;

    /// Evaluates `expression` as a boolean condition; an empty expression
    /// is always `true` (§4.5 "a field with no `condition` is always
    /// present").
    fn evaluate_boolean(&self, expression: &str, scope: &EvalScope) -> Result<bool, EngineError> {
        if expression.trim().is_empty() {
            return Ok(true);
        }
        match self.evaluate(expression, scope)? {
            Value::Bool(b) => Ok(b),
            Value::I64(n) => Ok(n != 0),
            other => Err(EngineError::Expression(expression.to_string(), format!("expected boolean, got {other}"))),
        }
    }

    /// Evaluates `expression` as a bit/byte size; an empty expression
    /// resolves to `0`.
    fn evaluate_size(&self, expression: &str, scope: &EvalScope) -> Result<i64, EngineError> {
        if expression.trim().is_empty() {
            return Ok(0);
        }
        if let Ok(literal) = expression.trim().parse::<i64>() {
            return Ok(literal);
        }
        match self.evaluate(expression, scope)? {
            Value::I64(n) => Ok(n),
            Value::U64(n) => i64::try_from(n).map_err(|_| EngineError::Expression(expression.to_string(), "size overflow".into())),
            other => Err(EngineError::Expression(expression.to_string(), format!("expected integer size, got {other}"))),
        }
    }
}

/// A default, self-contained arithmetic/boolean/field-path expression
/// evaluator with a compiled-AST cache keyed by source text (§4.5
/// "expressions are parsed once and cached").
pub struct DefaultEvaluator {
    cache: RwLock<HashMap<String, Expr>>,
}

impl Default for DefaultEvaluator {
    fn default() -> Self {
        DefaultEvaluator { cache: RwLock::new(HashMap::new()) }
    }
}

impl DefaultEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, expression: &str) -> Result<Expr, EngineError> {
        if let Some(expr) = self.cache.read().unwrap().get(expression) {
            return Ok(expr.clone());
        }
        let expr = parse(expression).map_err(|e| EngineError::Expression(expression.to_string(), e))?;
        self.cache.write().unwrap().insert(expression.to_string(), expr.clone());
        Ok(expr)
    }
}

impl Evaluator for DefaultEvaluator {
    fn evaluate(&self, expression: &str, scope: &EvalScope) -> Result<Value, EngineError> {
        let expr = self.compiled(expression)?;
        eval_expr(&expr, scope).map_err(|e| EngineError::Expression(expression.to_string(), e))
    }
}

// ---- AST ----------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Number(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Path(Vec<String>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn eval_expr(expr: &Expr, scope: &EvalScope) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::I64(*n)),
        Expr::Float(f) => Ok(Value::F64(*f)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Path(segments) => resolve_path(segments, scope),
        Expr::Not(inner) => {
            let v = eval_expr(inner, scope)?;
            Ok(Value::Bool(!v.as_bool().ok_or_else(|| "cannot negate non-boolean".to_string())?))
        }
        Expr::Neg(inner) => match eval_expr(inner, scope)? {
            Value::I64(n) => Ok(Value::I64(-n)),
            Value::F64(f) => Ok(Value::F64(-f)),
            _ => Err("cannot negate non-numeric value".to_string()),
        },
        Expr::BinOp(op, lhs, rhs) => eval_binop(*op, lhs, rhs, scope),
    }
}

fn resolve_path(segments: &[String], scope: &EvalScope) -> Result<Value, String> {
    if segments[0] == "context" {
        let rest = &segments[1..];
        if rest.is_empty() {
            return Err("empty field path".to_string());
        }
        let context = scope.context.ok_or("no process-wide context available")?;
        let name = rest.join(".");
        return context.get(&name).cloned().ok_or_else(|| format!("unresolved context binding: {name}"));
    }

    let (root_record, rest): (&Record, &[String]) = match segments[0].as_str() {
        "self" => (scope.current, &segments[1..]),
        "parent" => (scope.parent.ok_or("no parent scope available")?, &segments[1..]),
        "root" => (scope.root.unwrap_or(scope.current), &segments[1..]),
        _ => (scope.current, segments),
    };
    if rest.is_empty() {
        return Err("empty field path".to_string());
    }
    let path = rest.join(".");
    root_record.get_path(&path).cloned().ok_or_else(|| format!("unresolved field path: {path}"))
}

fn eval_binop(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &EvalScope) -> Result<Value, String> {
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = eval_expr(lhs, scope)?.as_bool().ok_or("left operand of boolean connective is not boolean")?;
        return match op {
            BinOp::And => {
                if !l {
                    Ok(Value::Bool(false))
                } else {
                    let r = eval_expr(rhs, scope)?.as_bool().ok_or("right operand of && is not boolean")?;
                    Ok(Value::Bool(r))
                }
            }
            BinOp::Or => {
                if l {
                    Ok(Value::Bool(true))
                } else {
                    let r = eval_expr(rhs, scope)?.as_bool().ok_or("right operand of || is not boolean")?;
                    Ok(Value::Bool(r))
                }
            }
            _ => unreachable!(),
        };
    }

    let l = eval_expr(lhs, scope)?;
    let r = eval_expr(rhs, scope)?;

    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let lf = l.as_f64().ok_or("left operand of comparison is not numeric")?;
            let rf = r.as_f64().ok_or("right operand of comparison is not numeric")?;
            let result = match op {
                BinOp::Lt => lf < rf,
                BinOp::Le => lf <= rf,
                BinOp::Gt => lf > rf,
                BinOp::Ge => lf >= rf,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            if let (Some(li), Some(ri)) = (as_exact_i64(&l), as_exact_i64(&r)) {
                let result = match op {
                    BinOp::Add => li.checked_add(ri),
                    BinOp::Sub => li.checked_sub(ri),
                    BinOp::Mul => li.checked_mul(ri),
                    BinOp::Div => (ri != 0).then(|| li / ri),
                    BinOp::Rem => (ri != 0).then(|| li % ri),
                    _ => unreachable!(),
                };
                return result.map(Value::I64).ok_or_else(|| "arithmetic overflow or division by zero".to_string());
            }
            let lf = l.as_f64().ok_or("left operand of arithmetic is not numeric")?;
            let rf = r.as_f64().ok_or("right operand of arithmetic is not numeric")?;
            let result = match op {
                BinOp::Add => lf + rf,
                BinOp::Sub => lf - rf,
                BinOp::Mul => lf * rf,
                BinOp::Div => lf / rf,
                BinOp::Rem => lf % rf,
                _ => unreachable!(),
            };
            Ok(Value::F64(result))
        }
        BinOp::And | BinOp::Or => unreachable!(),
    }
}

fn as_exact_i64(value: &Value) -> Option<i64> {
    match value {
        Value::I64(n) => Some(*n),
        Value::U64(n) => i64::try_from(*n).ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

// ---- Parser ---------------------------------------------------------------
//
// A small hand-rolled recursive-descent parser; sufficient for the
// condition/size-expression grammar documented above and cheap to cache
// per-expression-string.

fn parse(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input at token {}", parser.pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated string literal".to_string());
            }
            i += 1;
            tokens.push(Token::Str(s));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.contains('.') {
                tokens.push(Token::Float(text.parse().map_err(|_| format!("invalid number: {text}"))?));
            } else {
                tokens.push(Token::Number(text.parse().map_err(|_| format!("invalid number: {text}"))?));
            }
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let symbol = match two.as_str() {
            "&&" => Some("&&"),
            "||" => Some("||"),
            "==" => Some("=="),
            "!=" => Some("!="),
            "<=" => Some("<="),
            ">=" => Some(">="),
            _ => None,
        };
        if let Some(sym) = symbol {
            tokens.push(Token::Symbol(sym));
            i += 2;
            continue;
        }
        let one = match c {
            '(' => "(",
            ')' => ")",
            '!' => "!",
            '<' => "<",
            '>' => ">",
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '%' => "%",
            _ => return Err(format!("unexpected character: {c}")),
        };
        tokens.push(Token::Symbol(one));
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat_symbol("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat_symbol("&&") {
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat_symbol("!") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Symbol("==")) => Some(BinOp::Eq),
            Some(Token::Symbol("!=")) => Some(BinOp::Ne),
            Some(Token::Symbol("<=")) => Some(BinOp::Le),
            Some(Token::Symbol(">=")) => Some(BinOp::Ge),
            Some(Token::Symbol("<")) => Some(BinOp::Lt),
            Some(Token::Symbol(">")) => Some(BinOp::Gt),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.parse_add()?;
            return Ok(Expr::BinOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("+")) => BinOp::Add,
                Some(Token::Symbol("-")) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol("*")) => BinOp::Mul,
                Some(Token::Symbol("/")) => BinOp::Div,
                Some(Token::Symbol("%")) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat_symbol("-") {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Float(f)) => Ok(Expr::Float(f)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Path(ident.split('.').map(str::to_string).collect())),
            },
            Some(Token::Symbol("(")) => {
                let inner = self.parse_or()?;
                if !self.eat_symbol(")") {
                    return Err("expected closing parenthesis".to_string());
                }
                Ok(inner)
            }
            other => Err(format!("unexpected token: {other:?}")),
        }
    }
}
