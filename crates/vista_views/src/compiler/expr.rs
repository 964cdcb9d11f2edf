//! Expression parsing for echoes and directive arguments.
//!
//! Precedence, loosest first: `??`, `||`, `&&`, `== !=`, `< <= > >=`,
//! `+ -`, `* / %`, unary `! -`, then member access (`a.b`, `a[0]`, `a['k']`).

use serde_json::Value;

use super::template::{BinaryOp, Expr, Segment};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(Value),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

const OPERATORS: &[&str] = &[
    "??", "||", "&&", "=>", "==", "!=", "<=", ">=", "<", ">", "!", "+", "-", "*", "/", "%",
];

/// Parse a complete expression.
pub(crate) fn parse_expression(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.coalesce()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(format!("unexpected {} in expression `{}`", describe(tok), src)),
    }
}

/// Parse an expression that must be a string literal, such as a view name.
pub(crate) fn parse_string_literal(src: &str) -> Result<String, String> {
    match parse_expression(src)? {
        Expr::Literal(Value::String(s)) => Ok(s),
        _ => Err(format!("expected a quoted string, found `{}`", src)),
    }
}

/// Split directive arguments on top-level commas.
pub(crate) fn split_arguments(src: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in src.char_indices() {
        if let Some(q) = quote {
            match c {
                '\\' => escaped = !escaped,
                c if c == q && !escaped => quote = None,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(src[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = src[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) => format!("`{}`", s),
        Tok::Number(n) => format!("number {}", n),
        Tok::Str(s) => format!("string {:?}", s),
        Tok::Op(op) => format!("`{}`", op),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Dot => "`.`".to_string(),
    }
}

fn tokenize(src: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            // After a dot the digits are a list index, never a fraction.
            let member = matches!(tokens.last(), Some(Tok::Dot));
            let mut fractional = false;
            if !member
                && i + 1 < chars.len()
                && chars[i] == '.'
                && chars[i + 1].is_ascii_digit()
            {
                fractional = true;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            if member {
                tokens.push(Tok::Ident(text));
            } else if fractional {
                let n: f64 = text.parse().map_err(|_| format!("invalid number {}", text))?;
                tokens.push(Tok::Number(Value::from(n)));
            } else {
                let n: i64 = text.parse().map_err(|_| format!("invalid number {}", text))?;
                tokens.push(Tok::Number(Value::from(n)));
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Tok::Str(text));
            i = next;
            continue;
        }

        let simple = match c {
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '[' => Some(Tok::LBracket),
            ']' => Some(Tok::RBracket),
            ',' => Some(Tok::Comma),
            '.' => Some(Tok::Dot),
            _ => None,
        };
        if let Some(tok) = simple {
            tokens.push(tok);
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match OPERATORS.iter().copied().find(|op| rest.starts_with(op)) {
            Some(op) => {
                tokens.push(Tok::Op(op));
                i += op.len();
            }
            None => return Err(format!("unexpected character `{}`", c)),
        }
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`, returning it and the next index.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string literal".to_string())
}

struct ExprParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Tok::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn expect(&mut self, expected: Tok) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {}, found {}", describe(&expected), describe(&tok))),
            None => Err(format!("expected {}, found end of expression", describe(&expected))),
        }
    }

    fn coalesce(&mut self) -> Result<Expr, String> {
        let left = self.or()?;
        if self.eat_op(&["??"]).is_some() {
            let right = self.coalesce()?;
            return Ok(Expr::Coalesce {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr, String>,
    ) -> Result<Expr, String> {
        let mut left = next(self)?;
        while let Some(op) = self.eat_op(ops) {
            let right = next(self)?;
            left = Expr::Binary {
                op: binary_op(op),
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, String> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr, String> {
        self.binary_level(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, String> {
        self.binary_level(&["==", "!="], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        self.binary_level(&["<", "<=", ">", ">="], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, String> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.eat_op(&["!", "-"]) {
            Some("!") => Ok(Expr::Not(Box::new(self.unary()?))),
            Some(_) => Ok(Expr::Negate(Box::new(self.unary()?))),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Tok::Number(n)) => Ok(Expr::Literal(n)),
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Tok::LParen) => {
                let inner = self.coalesce()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBracket) => self.array(),
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.path(name),
            },
            Some(tok) => Err(format!("unexpected {}", describe(&tok))),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    /// `[a, b]` or `['k' => v]`, after the opening bracket.
    fn array(&mut self) -> Result<Expr, String> {
        let mut items = Vec::new();
        let mut entries = Vec::new();

        while self.peek() != Some(&Tok::RBracket) {
            let item = self.coalesce()?;
            if self.eat_op(&["=>"]).is_some() {
                let key = match item {
                    Expr::Literal(Value::String(key)) => key,
                    Expr::Literal(Value::Number(n)) => n.to_string(),
                    _ => return Err("array keys must be string or number literals".to_string()),
                };
                entries.push((key, self.coalesce()?));
            } else {
                items.push(item);
            }
            if !items.is_empty() && !entries.is_empty() {
                return Err("cannot mix keyed and positional array entries".to_string());
            }

            match self.peek() {
                Some(Tok::Comma) => self.pos += 1,
                Some(Tok::RBracket) => {}
                Some(tok) => return Err(format!("expected `,` or `]`, found {}", describe(tok))),
                None => return Err("unterminated array literal".to_string()),
            }
        }
        self.pos += 1;

        if entries.is_empty() {
            Ok(Expr::List(items))
        } else {
            Ok(Expr::Map(entries))
        }
    }

    fn path(&mut self, root: String) -> Result<Expr, String> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Tok::Ident(key)) => segments.push(Segment::Key(key)),
                        Some(tok) => {
                            return Err(format!("expected a member name, found {}", describe(&tok)))
                        }
                        None => return Err("expected a member name after `.`".to_string()),
                    }
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.coalesce()?;
                    self.expect(Tok::RBracket)?;
                    segments.push(match index {
                        Expr::Literal(Value::String(key)) => Segment::Key(key),
                        other => Segment::Index(other),
                    });
                }
                _ => break,
            }
        }
        Ok(Expr::Path { root, segments })
    }
}

fn binary_op(op: &str) -> BinaryOp {
    match op {
        "||" => BinaryOp::Or,
        "&&" => BinaryOp::And,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        _ => BinaryOp::Rem,
    }
}
