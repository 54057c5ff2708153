//! Closed expression language for factor predicates.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not") not | cmp
//! cmp     := sum (("<" | "<=" | ">" | ">=" | "==" | "!=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | primary
//! primary := number | "true" | "false" | field | func "(" args ")" | "(" or ")"
//! ```
//!
//! Fields come from [`Field::lookup`]; post-match fields are rejected.

use std::fmt;

use crate::error::ExprError;
use crate::record::{Field, FieldLookup, MatchRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Func::Abs),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Func::Abs => 1,
            Func::Min | Func::Max => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Min => "min",
            Func::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Bool(bool),
    Field(Field),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Number,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Num(f64),
    Bool(bool),
}

impl Expr {
    pub fn parse(src: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        if let Some((tok, pos)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::UnexpectedToken {
                found: tok.to_string(),
                pos: *pos,
            });
        }
        expr.check()?;
        Ok(expr)
    }

    pub fn check(&self) -> Result<ExprType, ExprError> {
        let want = |e: &Expr, t: ExprType, ctx: &str| -> Result<(), ExprError> {
            let got = e.check()?;
            if got != t {
                return Err(ExprError::Type(format!("{ctx} expects {t:?}, got {got:?} in {e}")));
            }
            Ok(())
        };
        match self {
            Expr::Num(_) | Expr::Field(_) => Ok(ExprType::Number),
            Expr::Bool(_) => Ok(ExprType::Boolean),
            Expr::Neg(e) => want(e, ExprType::Number, "negation").map(|_| ExprType::Number),
            Expr::Not(e) => want(e, ExprType::Boolean, "not").map(|_| ExprType::Boolean),
            Expr::Arith(_, a, b) => {
                want(a, ExprType::Number, "arithmetic")?;
                want(b, ExprType::Number, "arithmetic")?;
                Ok(ExprType::Number)
            }
            Expr::Cmp(op, a, b) => {
                let ta = a.check()?;
                let tb = b.check()?;
                if ta != tb {
                    return Err(ExprError::Type(format!("cannot compare {ta:?} with {tb:?}")));
                }
                if ta == ExprType::Boolean && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Err(ExprError::Type("booleans only support == and !=".into()));
                }
                Ok(ExprType::Boolean)
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                want(a, ExprType::Boolean, "logical operator")?;
                want(b, ExprType::Boolean, "logical operator")?;
                Ok(ExprType::Boolean)
            }
            Expr::Call(f, args) => {
                for arg in args {
                    want(arg, ExprType::Number, f.name())?;
                }
                Ok(ExprType::Number)
            }
        }
    }

    /// `None` means a referenced field is missing or arithmetic was undefined.
    pub fn eval(&self, record: &MatchRecord) -> Option<Value> {
        match self {
            Expr::Num(v) => Some(Value::Num(*v)),
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::Field(f) => record.field(f).map(Value::Num),
            Expr::Neg(e) => Some(Value::Num(-e.num(record)?)),
            Expr::Not(e) => Some(Value::Bool(!e.boolean(record)?)),
            Expr::Arith(op, a, b) => {
                let (x, y) = (a.num(record)?, b.num(record)?);
                let v = match op {
                    ArithOp::Add => x + y,
                    ArithOp::Sub => x - y,
                    ArithOp::Mul => x * y,
                    ArithOp::Div => {
                        if y == 0.0 {
                            return None;
                        }
                        x / y
                    }
                };
                v.is_finite().then_some(Value::Num(v))
            }
            Expr::Cmp(op, a, b) => {
                let res = match (a.eval(record)?, b.eval(record)?) {
                    (Value::Num(x), Value::Num(y)) => match op {
                        CmpOp::Lt => x < y,
                        CmpOp::Le => x <= y,
                        CmpOp::Gt => x > y,
                        CmpOp::Ge => x >= y,
                        CmpOp::Eq => (x - y).abs() < 1e-9,
                        CmpOp::Ne => (x - y).abs() >= 1e-9,
                    },
                    (Value::Bool(x), Value::Bool(y)) => match op {
                        CmpOp::Eq => x == y,
                        CmpOp::Ne => x != y,
                        _ => return None,
                    },
                    _ => return None,
                };
                Some(Value::Bool(res))
            }
            // Missing data anywhere in a conjunction excludes the match.
            Expr::And(a, b) => Some(Value::Bool(a.boolean(record)? && b.boolean(record)?)),
            Expr::Or(a, b) => Some(Value::Bool(a.boolean(record)? || b.boolean(record)?)),
            Expr::Call(f, args) => {
                let v = match f {
                    Func::Abs => args.first()?.num(record)?.abs(),
                    Func::Min => args.first()?.num(record)?.min(args.get(1)?.num(record)?),
                    Func::Max => args.first()?.num(record)?.max(args.get(1)?.num(record)?),
                };
                Some(Value::Num(v))
            }
        }
    }

    fn num(&self, record: &MatchRecord) -> Option<f64> {
        match self.eval(record)? {
            Value::Num(v) => Some(v),
            Value::Bool(_) => None,
        }
    }

    fn boolean(&self, record: &MatchRecord) -> Option<bool> {
        match self.eval(record)? {
            Value::Bool(b) => Some(b),
            Value::Num(_) => None,
        }
    }
}

// Fully parenthesised so the rendering doubles as a canonical cache key.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Field(field) => f.write_str(&field.name()),
            Expr::Neg(e) => write!(f, "(-{e})"),
            Expr::Not(e) => write!(f, "(!{e})"),
            Expr::Arith(op, a, b) => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                write!(f, "({a} {sym} {b})")
            }
            Expr::Cmp(op, a, b) => {
                let sym = match op {
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                    CmpOp::Eq => "==",
                    CmpOp::Ne => "!=",
                };
                write!(f, "({a} {sym} {b})")
            }
            Expr::And(a, b) => write!(f, "({a} && {b})"),
            Expr::Or(a, b) => write!(f, "({a} || {b})"),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{v}"),
            Token::Ident(s) => f.write_str(s),
            Token::Op(s) => f.write_str(s),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

const OPERATORS: &[&str] = &[
    "&&", "||", "<=", ">=", "==", "!=", "<", ">", "!", "+", "-", "*", "/",
];

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let mut out = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()))
        {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError::UnexpectedChar { ch, pos: start })?;
            out.push((Token::Num(value), start));
            continue;
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            out.push((Token::Ident(chars[start..i].iter().collect()), start));
            continue;
        }
        match ch {
            '(' => out.push((Token::LParen, start)),
            ')' => out.push((Token::RParen, start)),
            ',' => out.push((Token::Comma, start)),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(ExprError::UnexpectedChar { ch, pos: start });
                };
                out.push((Token::Op(*op), start));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Token, usize), ExprError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        let found = match self.peek()? {
            Token::Op(op) if ops.contains(op) => Some(*op),
            Token::Ident(word) => match word.as_str() {
                "and" if ops.contains(&"&&") => Some("&&"),
                "or" if ops.contains(&"||") => Some("||"),
                "not" if ops.contains(&"!") => Some("!"),
                _ => None,
            },
            _ => None,
        }?;
        self.pos += 1;
        Some(found)
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let (tok, pos) = self.next()?;
        if tok != want {
            return Err(ExprError::UnexpectedToken {
                found: tok.to_string(),
                pos,
            });
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.not()?;
        while self.eat_op(&["&&"]).is_some() {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_op(&["!"]).is_some() {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.sum()?;
        let Some(op) = self.eat_op(&["<=", ">=", "==", "!=", "<", ">"]) else {
            return Ok(lhs);
        };
        let rhs = self.sum()?;
        let op = match op {
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "==" => CmpOp::Eq,
            _ => CmpOp::Ne,
        };
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.product()?;
            let op = if op == "+" { ArithOp::Add } else { ArithOp::Sub };
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/"]) {
            let rhs = self.unary()?;
            let op = if op == "*" { ArithOp::Mul } else { ArithOp::Div };
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_op(&["-"]).is_some() {
            return Ok(match self.unary()? {
                Expr::Num(v) => Expr::Num(-v),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let (tok, pos) = self.next()?;
        match tok {
            Token::Num(v) => Ok(Expr::Num(v)),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                match name.as_str() {
                    "true" => return Ok(Expr::Bool(true)),
                    "false" => return Ok(Expr::Bool(false)),
                    _ => {}
                }
                if self.peek() == Some(&Token::LParen) {
                    return self.call(name);
                }
                match Field::lookup(&name) {
                    FieldLookup::Known(field) => Ok(Expr::Field(field)),
                    FieldLookup::PostMatch => Err(ExprError::PostMatchField(name)),
                    FieldLookup::Unknown => Err(ExprError::UnknownField(name)),
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.to_string(),
                pos,
            }),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ExprError> {
        let func = Func::from_name(&name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        self.expect(Token::RParen)?;
        if args.len() != func.arity() {
            return Err(ExprError::Arity {
                name,
                expected: func.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(func, args))
    }
}
