//! Builds the node tree from lexer tokens.

use super::expr::{is_identifier, parse_expression, parse_string_literal, split_arguments};
use super::lexer::{Token, TokenKind};
use super::template::{Branch, Expr, Node};
use super::SyntaxError;

/// The directive that closed a block.
struct End {
    name: String,
    args: Option<String>,
    line: usize,
}

/// An open block, for error reporting.
#[derive(Clone, Copy)]
struct Opened<'a> {
    name: &'a str,
    line: usize,
}

pub(crate) fn parse(tokens: Vec<Token>) -> Result<Vec<Node>, SyntaxError> {
    let mut parser = Parser { tokens, pos: 0 };
    let (nodes, _) = parser.block(&[], None)?;
    Ok(nodes)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn block(
        &mut self,
        terminators: &[&str],
        opened: Option<Opened<'_>>,
    ) -> Result<(Vec<Node>, Option<End>), SyntaxError> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            let line = token.line;

            match token.kind {
                TokenKind::Text(text) => nodes.push(Node::Text { text }),
                TokenKind::Echo { expr, escape } => nodes.push(Node::Echo {
                    expr: expression(&expr, line)?,
                    escape,
                }),
                TokenKind::Directive { name, args } => {
                    let empty_block = name == "empty" && args.is_some();
                    if !empty_block && terminators.contains(&name.as_str()) {
                        return Ok((nodes, Some(End { name, args, line })));
                    }
                    nodes.push(self.directive(&name, args, line)?);
                }
            }
        }

        match opened {
            Some(open) => Err(SyntaxError {
                line: open.line,
                message: format!(
                    "unclosed @{}, expected @{}",
                    open.name,
                    terminators.last().copied().unwrap_or("end")
                ),
            }),
            None => Ok((nodes, None)),
        }
    }

    /// Like [`Parser::block`] but the block must be closed.
    fn closed_block(
        &mut self,
        terminators: &[&str],
        opened: Opened<'_>,
    ) -> Result<(Vec<Node>, End), SyntaxError> {
        match self.block(terminators, Some(opened))? {
            (nodes, Some(end)) => Ok((nodes, end)),
            (_, None) => Err(SyntaxError {
                line: opened.line,
                message: format!("unclosed @{}", opened.name),
            }),
        }
    }

    fn directive(&mut self, name: &str, args: Option<String>, line: usize) -> Result<Node, SyntaxError> {
        let opened = Opened { name, line };
        match name {
            "if" => self.conditional(required(name, args, line)?, opened, false),
            "unless" => self.conditional(required(name, args, line)?, opened, true),
            "isset" | "empty" => {
                let inner = Box::new(expression(&required(name, args, line)?, line)?);
                let condition = if name == "isset" {
                    Expr::Isset(inner)
                } else {
                    Expr::Empty(inner)
                };
                let closer = if name == "isset" { "endisset" } else { "endempty" };
                let (body, _) = self.closed_block(&[closer], opened)?;
                Ok(Node::If {
                    branches: vec![Branch { condition, body }],
                    otherwise: None,
                })
            }
            "foreach" | "forelse" => self.foreach(&required(name, args, line)?, opened),
            "include" | "includeIf" => {
                let args = required(name, args, line)?;
                let parts = split_arguments(&args);
                if parts.is_empty() || parts.len() > 2 {
                    return Err(syntax(line, format!("@{} expects a view name and optional data", name)));
                }
                Ok(Node::Include {
                    view: string_literal(parts[0], line)?,
                    data: parts.get(1).map(|d| expression(d, line)).transpose()?,
                    optional: name == "includeIf",
                })
            }
            "extends" => Ok(Node::Extends {
                layout: string_literal(&required(name, args, line)?, line)?,
            }),
            "section" => self.section(&required(name, args, line)?, opened),
            "yield" => {
                let args = required(name, args, line)?;
                let parts = split_arguments(&args);
                if parts.is_empty() || parts.len() > 2 {
                    return Err(syntax(line, "@yield expects a section name and optional default"));
                }
                Ok(Node::Yield {
                    name: string_literal(parts[0], line)?,
                    default: parts.get(1).map(|d| expression(d, line)).transpose()?,
                })
            }
            "parent" => Ok(Node::Parent),
            other => Err(syntax(line, format!("unexpected @{}", other))),
        }
    }

    fn conditional(&mut self, args: String, opened: Opened<'_>, negate: bool) -> Result<Node, SyntaxError> {
        let mut condition = expression(&args, opened.line)?;
        if negate {
            condition = Expr::Not(Box::new(condition));
        }

        let terminators: &[&str] = if negate {
            &["else", "endunless"]
        } else {
            &["elseif", "else", "endif"]
        };
        let closer = if negate { "endunless" } else { "endif" };

        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            let (body, end) = self.closed_block(terminators, opened)?;
            branches.push(Branch { condition, body });
            match end.name.as_str() {
                "elseif" => {
                    condition = expression(&required("elseif", end.args, end.line)?, end.line)?;
                }
                "else" => {
                    let (body, _) = self.closed_block(&[closer], opened)?;
                    otherwise = Some(body);
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If { branches, otherwise })
    }

    fn foreach(&mut self, args: &str, opened: Opened<'_>) -> Result<Node, SyntaxError> {
        let line = opened.line;
        let split = args
            .rfind(" as ")
            .ok_or_else(|| syntax(line, format!("@{} expects `items as item`", opened.name)))?;
        let source = expression(&args[..split], line)?;
        let target = args[split + 4..].trim();

        let (key, value) = match target.split_once("=>") {
            Some((k, v)) => (Some(k.trim().to_string()), v.trim().to_string()),
            None => (None, target.to_string()),
        };
        for name in key.iter().chain(std::iter::once(&value)) {
            if !is_identifier(name) {
                return Err(syntax(line, format!("invalid loop variable `{}`", name)));
            }
        }

        let (body, empty) = if opened.name == "forelse" {
            let (body, end) = self.closed_block(&["empty", "endforelse"], opened)?;
            if end.name == "empty" {
                let (fallback, _) = self.closed_block(&["endforelse"], opened)?;
                (body, Some(fallback))
            } else {
                (body, Some(Vec::new()))
            }
        } else {
            let (body, _) = self.closed_block(&["endforeach"], opened)?;
            (body, None)
        };

        Ok(Node::Foreach {
            source,
            key,
            value,
            body,
            empty,
        })
    }

    fn section(&mut self, args: &str, opened: Opened<'_>) -> Result<Node, SyntaxError> {
        let line = opened.line;
        let parts = split_arguments(args);
        let name = match parts.first() {
            Some(first) => string_literal(first, line)?,
            None => return Err(syntax(line, "@section expects a section name")),
        };

        match parts.len() {
            1 => {
                let (body, end) = self.closed_block(&["endsection", "stop", "show"], opened)?;
                Ok(Node::Section {
                    name,
                    body,
                    show: end.name == "show",
                })
            }
            2 => Ok(Node::Section {
                name,
                body: vec![Node::Echo {
                    expr: expression(parts[1], line)?,
                    escape: true,
                }],
                show: false,
            }),
            _ => Err(syntax(line, "@section expects a section name and optional content")),
        }
    }
}

fn required(name: &str, args: Option<String>, line: usize) -> Result<String, SyntaxError> {
    match args {
        Some(args) if !args.is_empty() => Ok(args),
        _ => Err(syntax(line, format!("@{} requires arguments", name))),
    }
}

fn expression(src: &str, line: usize) -> Result<Expr, SyntaxError> {
    parse_expression(src).map_err(|message| SyntaxError { line, message })
}

fn string_literal(src: &str, line: usize) -> Result<String, SyntaxError> {
    parse_string_literal(src).map_err(|message| SyntaxError { line, message })
}

fn syntax(line: usize, message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        line,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::template::Segment;

    fn compile(src: &str) -> Result<Vec<Node>, SyntaxError> {
        parse(Lexer::new().tokenize(src)?)
    }

    #[test]
    fn test_if_elseif_else() {
        let nodes = compile("@if(a) A @elseif(b) B @else C @endif").unwrap();
        match &nodes[0] {
            Node::If { branches, otherwise } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise.as_deref(), Some(&[Node::Text { text: " C ".into() }][..]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unless_negates() {
        let nodes = compile("@unless(a) x @endunless").unwrap();
        match &nodes[0] {
            Node::If { branches, .. } => assert!(matches!(branches[0].condition, Expr::Not(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_foreach_with_key() {
        let nodes = compile("@foreach(user.roles as i => role){{ role }}@endforeach").unwrap();
        match &nodes[0] {
            Node::Foreach { source, key, value, body, empty } => {
                assert_eq!(
                    source,
                    &Expr::Path {
                        root: "user".into(),
                        segments: vec![Segment::Key("roles".into())],
                    }
                );
                assert_eq!(key.as_deref(), Some("i"));
                assert_eq!(value, "role");
                assert_eq!(body.len(), 1);
                assert!(empty.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_forelse_with_nested_empty_block() {
        let nodes =
            compile("@forelse(items as item)@empty(item.tags)-@endempty @empty none @endforelse").unwrap();
        match &nodes[0] {
            Node::Foreach { body, empty, .. } => {
                assert!(matches!(body[0], Node::If { .. }));
                assert_eq!(empty.as_deref(), Some(&[Node::Text { text: " none ".into() }][..]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_layout_directives() {
        let nodes = compile(
            "@extends('layouts.app')@section('title', page.title)@section('body')hi @parent @show @yield('footer', 'bye')",
        )
        .unwrap();
        assert_eq!(nodes[0], Node::Extends { layout: "layouts.app".into() });
        assert!(matches!(&nodes[1], Node::Section { name, show: false, .. } if name == "title"));
        match &nodes[2] {
            Node::Section { name, body, show } => {
                assert_eq!(name, "body");
                assert!(*show);
                assert!(body.contains(&Node::Parent));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&nodes[4], Node::Yield { default: Some(_), .. }));
    }

    #[test]
    fn test_include_arguments() {
        let nodes = compile("@include('partials.nav', menu)@includeIf('maybe')").unwrap();
        assert!(matches!(&nodes[0], Node::Include { view, data: Some(_), optional: false } if view == "partials.nav"));
        assert!(matches!(&nodes[1], Node::Include { optional: true, data: None, .. }));
    }

    #[test]
    fn test_errors_report_lines() {
        let err = compile("a\n@if(x)\nunclosed").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("@endif"));

        let err = compile("\n\n@endforeach").unwrap_err();
        assert_eq!(err.line, 3);

        let err = compile("{{ a + }}").unwrap_err();
        assert_eq!(err.line, 1);

        assert!(compile("@foreach(items)@endforeach").is_err());
        assert!(compile("@include(view)").is_err());
        assert!(compile("@if()x@endif").is_err());
    }
}
