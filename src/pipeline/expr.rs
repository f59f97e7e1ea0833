//! Expression language of the `calculate` step.
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | cmp
//! cmp     := sum (("=" | "==" | "!=" | "<>" | ">" | "<" | ">=" | "<=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := number | 'text' | "text" | true | false | null
//!          | ident | ident "(" args ")" | "[" any name "]" | "(" expr ")"
//! ```
//!
//! Identifiers may contain dots, so `users.name` names a joined column.

use std::fmt;

use ahash::AHashSet;

use crate::core::{Row, Value, cell};
use crate::join::Operator;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    Parse(String),
    DivisionByZero,
    Type(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::Parse(msg) => write!(f, "invalid expression: {}", msg),
            ExprError::DivisionByZero => write!(f, "division by zero"),
            ExprError::Type(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Cmp(Operator),
    And,
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> String {
        match self {
            BinaryOp::Add => "+".to_string(),
            BinaryOp::Sub => "-".to_string(),
            BinaryOp::Mul => "*".to_string(),
            BinaryOp::Div => "/".to_string(),
            BinaryOp::Rem => "%".to_string(),
            BinaryOp::Cmp(op) => op.to_string(),
            BinaryOp::And => "and".to_string(),
            BinaryOp::Or => "or".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Function {
    Upper,
    Lower,
    Len,
    Trim,
    Abs,
    Round,
    Concat,
    Coalesce,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        match name.to_ascii_lowercase().as_str() {
            "upper" => Some(Function::Upper),
            "lower" => Some(Function::Lower),
            "len" | "length" => Some(Function::Len),
            "trim" => Some(Function::Trim),
            "abs" => Some(Function::Abs),
            "round" => Some(Function::Round),
            "concat" => Some(Function::Concat),
            "coalesce" => Some(Function::Coalesce),
            _ => None,
        }
    }

    /// Accepted argument counts, inclusive.
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::Upper | Function::Lower | Function::Len | Function::Trim | Function::Abs => {
                (1, 1)
            }
            Function::Round => (1, 2),
            Function::Concat | Function::Coalesce => (1, usize::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.len() > MAX_TOKENS {
            return Err(ExprError::Parse(format!(
                "expression longer than {} tokens",
                MAX_TOKENS
            )));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::Parse(format!("unexpected {}", token))),
        }
    }

    /// Every column the expression reads.
    pub fn columns(&self) -> AHashSet<&str> {
        let mut out = AHashSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut AHashSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(name) => {
                out.insert(name.as_str());
            }
            Expr::Neg(e) | Expr::Not(e) => e.collect_columns(out),
            Expr::Binary(_, l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_columns(out)),
        }
    }

    pub fn eval(&self, row: &Row) -> Result<Value, ExprError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Column(name) => Ok(cell(row, name).clone()),
            Expr::Neg(e) => match e.eval(row)? {
                Value::Null => Ok(Value::Null),
                v => v
                    .as_f64()
                    .map(|n| Value::Number(-n))
                    .ok_or_else(|| ExprError::Type(format!("cannot negate '{}'", v))),
            },
            Expr::Not(e) => Ok(Value::Bool(!e.eval(row)?.is_truthy())),
            Expr::Binary(BinaryOp::And, l, r) => {
                Ok(Value::Bool(l.eval(row)?.is_truthy() && r.eval(row)?.is_truthy()))
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                Ok(Value::Bool(l.eval(row)?.is_truthy() || r.eval(row)?.is_truthy()))
            }
            Expr::Binary(op, l, r) => binary(*op, l.eval(row)?, r.eval(row)?),
            Expr::Call(func, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(row))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, args)
            }
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
    if let BinaryOp::Cmp(cmp) = op {
        return Ok(Value::Bool(cmp.apply(&left, &right)));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ if op == BinaryOp::Add => {
            return Ok(Value::String(format!("{}{}", left, right)));
        }
        _ => {
            return Err(ExprError::Type(format!(
                "cannot apply '{}' to '{}' and '{}'",
                op.symbol(),
                left,
                right
            )));
        }
    };
    let n = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem if b == 0.0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Rem => a % b,
        BinaryOp::Cmp(_) | BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    };
    Ok(Value::Number(n))
}

fn call(func: Function, mut args: Vec<Value>) -> Result<Value, ExprError> {
    let text = |v: &Value, f: fn(&str) -> String| match v {
        Value::Null => Value::Null,
        v => Value::String(f(&v.to_string())),
    };
    let number = |v: &Value, name: &str| -> Result<Option<f64>, ExprError> {
        match v {
            Value::Null => Ok(None),
            v => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| ExprError::Type(format!("{} expects a number, got '{}'", name, v))),
        }
    };

    match func {
        Function::Upper => Ok(text(&args[0], |s| s.to_uppercase())),
        Function::Lower => Ok(text(&args[0], |s| s.to_lowercase())),
        Function::Trim => Ok(text(&args[0], |s| s.trim().to_string())),
        Function::Len => Ok(match &args[0] {
            Value::Null => Value::Null,
            v => Value::Number(v.to_string().chars().count() as f64),
        }),
        Function::Abs => Ok(number(&args[0], "abs")?
            .map(|n| Value::Number(n.abs()))
            .unwrap_or(Value::Null)),
        Function::Round => {
            let digits = match args.get(1) {
                Some(d) => number(d, "round")?.unwrap_or(0.0),
                None => 0.0,
            };
            let factor = 10f64.powi(digits.clamp(-15.0, 15.0) as i32);
            Ok(number(&args[0], "round")?
                .map(|n| {
                    let scaled = n * factor;
                    if scaled.is_finite() {
                        Value::Number(scaled.round() / factor)
                    } else {
                        Value::Number(n)
                    }
                })
                .unwrap_or(Value::Null))
        }
        Function::Concat => Ok(Value::String(
            args.iter()
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect(),
        )),
        Function::Coalesce => {
            let idx = args.iter().position(|v| !v.is_null());
            Ok(idx.map(|i| args.swap_remove(i)).unwrap_or(Value::Null))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Quoted(String),
    Symbol(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Text(s) => write!(f, "text '{}'", s),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Quoted(s) => write!(f, "[{}]", s),
            Token::Symbol(s) => write!(f, "'{}'", s),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

const SYMBOLS: [&str; 16] = [
    "==", "!=", "<>", ">=", "<=", "&&", "||", "=", ">", "<", "+", "-", "*", "/", "%", "!",
];

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| ExprError::Parse("unterminated string".to_string()))?;
                tokens.push(Token::Text(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
                continue;
            }
            '[' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| ExprError::Parse("unterminated column name".to_string()))?;
                tokens.push(Token::Quoted(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
                continue;
            }
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Parse(format!("bad number '{}'", text)))?;
                tokens.push(Token::Number(n));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
                continue;
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let symbol = SYMBOLS
                    .iter()
                    .find(|s| rest.starts_with(**s))
                    .ok_or_else(|| ExprError::Parse(format!("unexpected character '{}'", c)))?;
                tokens.push(Token::Symbol(*symbol));
                i += symbol.len();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

/// Bounds on expression size. Together they cap the height of the parsed
/// tree, which evaluation walks recursively.
const MAX_TOKENS: usize = 1024;
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::Parse("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_symbol(&mut self, symbols: &[&str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Symbol(s)) if symbols.contains(s) => {
                let s = *s;
                self.pos += 1;
                Some(s)
            }
            _ => None,
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.nested(Self::or_chain)
    }

    fn or_chain(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") || self.eat_symbol(&["||"]).is_some() {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") || self.eat_symbol(&["&&"]).is_some() {
            let right = self.not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") || self.eat_symbol(&["!"]).is_some() {
            return Ok(Expr::Not(Box::new(self.nested(Self::not)?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.sum()?;
        let Some(symbol) = self.eat_symbol(&["=", "==", "!=", "<>", ">", "<", ">=", "<="]) else {
            return Ok(left);
        };
        let op = match symbol {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            _ => Operator::Le,
        };
        let right = self.sum()?;
        Ok(Expr::Binary(BinaryOp::Cmp(op), Box::new(left), Box::new(right)))
    }

    fn sum(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.product()?;
        while let Some(symbol) = self.eat_symbol(&["+", "-"]) {
            let op = if symbol == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            let right = self.product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        while let Some(symbol) = self.eat_symbol(&["*", "/", "%"]) {
            let op = match symbol {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_symbol(&["-"]).is_some() {
            return Ok(Expr::Neg(Box::new(self.nested(Self::unary)?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Text(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Quoted(name)) => Ok(Expr::Column(name)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::Parse("missing ')'".to_string())),
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(&name);
                }
                match name.to_ascii_lowercase().as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => Ok(Expr::Column(name)),
                }
            }
            Some(token) => Err(ExprError::Parse(format!("unexpected {}", token))),
            None => Err(ExprError::Parse("unexpected end of expression".to_string())),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, ExprError> {
        let func = Function::from_name(name)
            .ok_or_else(|| ExprError::Parse(format!("unknown function '{}'", name)))?;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.or()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    _ => return Err(ExprError::Parse(format!("missing ')' after {}(", name))),
                }
            }
        }

        let (min, max) = func.arity();
        if args.len() < min || args.len() > max {
            return Err(ExprError::Parse(format!(
                "{} takes {} arguments, got {}",
                name,
                if min == max {
                    min.to_string()
                } else if max == usize::MAX {
                    format!("at least {}", min)
                } else {
                    format!("{} to {}", min, max)
                },
                args.len()
            )));
        }
        Ok(Expr::Call(func, args))
    }
}
