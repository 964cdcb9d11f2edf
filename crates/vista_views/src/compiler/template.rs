//! Compiled template representation.
//!
//! A template compiles into a tree of [`Node`]s which is serialized as JSON
//! into the cache directory and evaluated by the compiler engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped whenever the node format changes so stale artifacts get recompiled.
pub const FORMAT_VERSION: u32 = 1;

/// The cached, executable form of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub version: u32,
    /// Source file this template was compiled from.
    pub source: PathBuf,
    pub nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn new(source: impl Into<PathBuf>, nodes: Vec<Node>) -> Self {
        Self {
            version: FORMAT_VERSION,
            source: source.into(),
            nodes,
        }
    }

    /// Whether this artifact was written by the current compiler.
    pub fn is_current(&self) -> bool {
        self.version == FORMAT_VERSION
    }

    /// The layout named by a top-level `@extends`, if any.
    pub fn layout(&self) -> Option<&str> {
        self.nodes.iter().find_map(|node| match node {
            Node::Extends { layout } => Some(layout.as_str()),
            _ => None,
        })
    }
}

/// One element of a compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Text {
        text: String,
    },
    Echo {
        expr: Expr,
        escape: bool,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        source: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
        /// `@forelse` fallback when the source is empty.
        empty: Option<Vec<Node>>,
    },
    Include {
        view: String,
        data: Option<Expr>,
        /// `@includeIf`: skip silently when the view does not exist.
        optional: bool,
    },
    Extends {
        layout: String,
    },
    Section {
        name: String,
        body: Vec<Node>,
        /// `@show`: yield the section in place once it is defined.
        show: bool,
    },
    Yield {
        name: String,
        default: Option<Expr>,
    },
    Parent,
}

/// A condition and the nodes rendered when it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Node>,
}

/// Template expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Value),
    /// Variable lookup: a root name followed by member accesses.
    Path {
        root: String,
        segments: Vec<Segment>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left ?? right`
    Coalesce {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `@isset(...)`: defined and not null.
    Isset(Box<Expr>),
    /// `@empty(...)`: undefined or falsy.
    Empty(Box<Expr>),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `['key' => value]`, entries in source order.
    Map(Vec<(String, Expr)>),
}

/// Member access on a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Key(String),
    Index(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Or,
    And,
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

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}
