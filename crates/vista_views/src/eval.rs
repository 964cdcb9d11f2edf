//! Evaluates compiled templates against view data.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use vista_core::{kind_of, merge, ViewData, ViewError, ViewResult};

use crate::compiler::{BinaryOp, CompiledTemplate, Expr, Node, Segment};
use crate::factory::Factory;

/// Nested includes and layouts deeper than this are treated as recursion.
pub const MAX_DEPTH: usize = 64;

/// Stands in for `@parent` until the parent section's content is known.
const PARENT_PLACEHOLDER: &str = "##parent-placeholder##";

/// State shared by every view taking part in one top-level render:
/// the factory used for includes and layouts, and the section contents.
pub struct RenderEnv {
    factory: Arc<Factory>,
    sections: HashMap<String, String>,
    depth: usize,
}

impl RenderEnv {
    pub fn new(factory: Arc<Factory>) -> Self {
        Self {
            factory,
            sections: HashMap::new(),
            depth: 0,
        }
    }

    pub fn factory(&self) -> &Arc<Factory> {
        &self.factory
    }

    /// Content of a section defined so far in this render.
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    pub(crate) fn enter(&mut self, view: &str) -> ViewResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(ViewError::render(
                view,
                format!("views nested more than {} levels deep", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Record a section. Content defined first (by the most derived view)
    /// wins; its `@parent` marker is replaced with the later content.
    fn extend_section(&mut self, name: &str, content: String) {
        let merged = match self.sections.get(name) {
            Some(existing) => existing.replace(PARENT_PLACEHOLDER, &content),
            None => content,
        };
        self.sections.insert(name.to_string(), merged);
    }

    fn yield_section(&self, name: &str) -> Option<String> {
        self.sections
            .get(name)
            .map(|content| content.replace(PARENT_PLACEHOLDER, ""))
    }
}

/// Render `template` for the view called `view`.
pub(crate) fn render_template(
    template: &CompiledTemplate,
    view: &str,
    data: &ViewData,
    env: &mut RenderEnv,
) -> ViewResult<String> {
    let mut out = String::new();
    let layout = {
        let mut evaluator = Evaluator {
            view,
            env: &mut *env,
            scope: Scope::new(data),
            loops: Vec::new(),
            layout: None,
        };
        evaluator.nodes(&template.nodes, &mut out)?;
        evaluator.layout
    };

    match layout {
        Some(layout) => {
            let factory = env.factory().clone();
            let mut parent = factory.make_view(&layout, data.clone(), ViewData::new())?;
            parent.render_in(env)
        }
        None => Ok(out),
    }
}

struct Scope<'d> {
    base: &'d ViewData,
    locals: Vec<(String, Value)>,
}

impl<'d> Scope<'d> {
    fn new(base: &'d ViewData) -> Self {
        Self {
            base,
            locals: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .or_else(|| self.base.get(name))
    }

    /// Every visible variable, locals shadowing view data.
    fn flatten(&self) -> ViewData {
        let mut all = self.base.clone();
        for (k, v) in &self.locals {
            all.insert(k.clone(), v.clone());
        }
        all
    }
}

struct Evaluator<'a, 'd> {
    view: &'a str,
    env: &'a mut RenderEnv,
    scope: Scope<'d>,
    loops: Vec<Value>,
    layout: Option<String>,
}

impl Evaluator<'_, '_> {
    fn nodes(&mut self, nodes: &[Node], out: &mut String) -> ViewResult<()> {
        for node in nodes {
            self.node(node, out)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &Node, out: &mut String) -> ViewResult<()> {
        match node {
            Node::Text { text } => out.push_str(text),
            Node::Echo { expr, escape } => {
                let text = display(&self.eval(expr)?);
                if *escape {
                    out.push_str(&escape_html(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::If { branches, otherwise } => {
                for branch in branches {
                    if truthy(&self.eval(&branch.condition)?) {
                        return self.nodes(&branch.body, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.nodes(body, out)?;
                }
            }
            Node::Foreach {
                source,
                key,
                value,
                body,
                empty,
            } => self.foreach(source, key.as_deref(), value, body, empty.as_deref(), out)?,
            Node::Include {
                view,
                data,
                optional,
            } => self.include(view, data.as_ref(), *optional, out)?,
            Node::Extends { layout } => self.layout = Some(layout.clone()),
            Node::Section { name, body, show } => {
                let mut content = String::new();
                self.nodes(body, &mut content)?;
                self.env.extend_section(name, content);
                if *show {
                    out.push_str(&self.env.yield_section(name).unwrap_or_default());
                }
            }
            Node::Yield { name, default } => match self.env.yield_section(name) {
                Some(content) => out.push_str(&content),
                None => {
                    if let Some(default) = default {
                        out.push_str(&escape_html(&display(&self.eval(default)?)));
                    }
                }
            },
            Node::Parent => out.push_str(PARENT_PLACEHOLDER),
        }
        Ok(())
    }

    fn foreach(
        &mut self,
        source: &Expr,
        key: Option<&str>,
        value: &str,
        body: &[Node],
        empty: Option<&[Node]>,
        out: &mut String,
    ) -> ViewResult<()> {
        let items: Vec<(Value, Value)> = match self.eval(source)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(self.error(format!("cannot iterate over {}", kind_of(&other))));
            }
        };

        if items.is_empty() {
            if let Some(fallback) = empty {
                self.nodes(fallback, out)?;
            }
            return Ok(());
        }

        let count = items.len();
        let parent = self.loops.last().cloned().unwrap_or(Value::Null);
        let depth = self.loops.len() + 1;
        let mark = self.scope.locals.len();

        for (index, (k, v)) in items.into_iter().enumerate() {
            let info = json!({
                "index": index,
                "iteration": index + 1,
                "remaining": count - index - 1,
                "count": count,
                "first": index == 0,
                "last": index + 1 == count,
                "even": (index + 1) % 2 == 0,
                "odd": (index + 1) % 2 == 1,
                "depth": depth,
                "parent": parent,
            });

            self.loops.push(info.clone());
            self.scope.locals.push(("loop".to_string(), info));
            if let Some(key) = key {
                self.scope.locals.push((key.to_string(), k));
            }
            self.scope.locals.push((value.to_string(), v));

            let result = self.nodes(body, out);

            self.scope.locals.truncate(mark);
            self.loops.pop();
            result?;
        }
        Ok(())
    }

    fn include(
        &mut self,
        name: &str,
        data: Option<&Expr>,
        optional: bool,
        out: &mut String,
    ) -> ViewResult<()> {
        let factory = self.env.factory().clone();
        if optional && !factory.exists(name) {
            return Ok(());
        }

        let mut vars = self.scope.flatten();
        if let Some(expr) = data {
            match self.eval(expr)? {
                Value::Object(extra) => vars = merge(&vars, &extra),
                Value::Null => {}
                other => {
                    return Err(self.error(format!(
                        "@include data must be a mapping, got {}",
                        kind_of(&other)
                    )));
                }
            }
        }

        let mut view = factory.make_view(name, vars, ViewData::new())?;
        out.push_str(&view.render_in(self.env)?);
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> ViewError {
        ViewError::render(self.view, message)
    }

    fn eval(&self, expr: &Expr) -> ViewResult<Value> {
        self.resolve(expr, true)
    }

    /// Evaluate `expr`. When `strict` is false an undefined variable is null
    /// instead of an error, as inside `??`, `@isset` and `@empty`.
    fn resolve(&self, expr: &Expr, strict: bool) -> ViewResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path { root, segments } => {
                let mut current = match self.scope.lookup(root) {
                    Some(value) => value.clone(),
                    None if strict => {
                        return Err(self.error(format!("Undefined variable: {}", root)));
                    }
                    None => return Ok(Value::Null),
                };
                for segment in segments {
                    current = match segment {
                        Segment::Key(key) => member(&current, key),
                        Segment::Index(index) => match self.resolve(index, strict)? {
                            Value::String(key) => member(&current, &key),
                            Value::Number(n) => member(&current, &n.to_string()),
                            _ => Value::Null,
                        },
                    };
                }
                Ok(current)
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.resolve(inner, strict)?))),
            Expr::Negate(inner) => match self.resolve(inner, strict)? {
                Value::Number(n) => match n.as_i64().and_then(i64::checked_neg) {
                    Some(i) => Ok(Value::from(i)),
                    None => Ok(Value::from(-n.as_f64().unwrap_or(0.0))),
                },
                other => Err(self.error(format!("cannot negate {}", kind_of(&other)))),
            },
            Expr::Coalesce { left, right } => match self.resolve(left, false)? {
                Value::Null => self.resolve(right, strict),
                value => Ok(value),
            },
            Expr::Isset(inner) => Ok(Value::Bool(!self.resolve(inner, false)?.is_null())),
            Expr::Empty(inner) => Ok(Value::Bool(!truthy(&self.resolve(inner, false)?))),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, strict),
            Expr::List(items) => items
                .iter()
                .map(|item| self.resolve(item, strict))
                .collect::<ViewResult<Vec<_>>>()
                .map(Value::Array),
            Expr::Map(entries) => {
                let mut map = ViewData::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.resolve(value, strict)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, strict: bool) -> ViewResult<Value> {
        let lhs = self.resolve(left, strict)?;
        match op {
            BinaryOp::And if !truthy(&lhs) => return Ok(Value::Bool(false)),
            BinaryOp::Or if truthy(&lhs) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let rhs = self.resolve(right, strict)?;

        let result = match op {
            BinaryOp::And | BinaryOp::Or => Value::Bool(truthy(&rhs)),
            BinaryOp::Eq => Value::Bool(loose_eq(&lhs, &rhs)),
            BinaryOp::Ne => Value::Bool(!loose_eq(&lhs, &rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(&lhs, &rhs).ok_or_else(|| {
                    self.error(format!(
                        "cannot compare {} with {}",
                        kind_of(&lhs),
                        kind_of(&rhs)
                    ))
                })?;
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.arithmetic(op, &lhs, &rhs)?
            }
        };
        Ok(result)
    }

    fn arithmetic(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> ViewResult<Value> {
        if let (BinaryOp::Add, Value::String(a), Value::String(b)) = (op, lhs, rhs) {
            return Ok(Value::String(format!("{}{}", a, b)));
        }

        let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
            return Err(self.error(format!(
                "cannot apply `{}` to {} and {}",
                op.symbol(),
                kind_of(lhs),
                kind_of(rhs)
            )));
        };

        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            let exact = match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                BinaryOp::Mul => x.checked_mul(y),
                // Inexact quotients and `i64::MIN / -1` fall through to f64.
                BinaryOp::Div => x
                    .checked_rem(y)
                    .filter(|r| *r == 0)
                    .and_then(|_| x.checked_div(y)),
                BinaryOp::Rem if y == -1 => Some(0),
                BinaryOp::Rem => x.checked_rem(y),
                _ => None,
            };
            if let Some(n) = exact {
                return Ok(Value::from(n));
            }
        }

        let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && y == 0.0 {
            return Err(self.error("division by zero"));
        }
        Ok(Value::from(match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            _ => x % y,
        }))
    }
}

fn member(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Text form of a value as written by an echo.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Escape text for safe inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}
