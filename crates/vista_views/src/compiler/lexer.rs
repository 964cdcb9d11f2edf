//! Splits template source into text, echo and directive tokens.

use regex::{Captures, Regex};

use super::SyntaxError;

/// Directives the parser understands. Any other `@word` is plain text.
const DIRECTIVES: &[&str] = &[
    "if",
    "elseif",
    "else",
    "endif",
    "unless",
    "endunless",
    "isset",
    "endisset",
    "empty",
    "endempty",
    "foreach",
    "endforeach",
    "forelse",
    "endforelse",
    "include",
    "includeIf",
    "extends",
    "section",
    "endsection",
    "show",
    "stop",
    "yield",
    "parent",
    "verbatim",
    "endverbatim",
];

// Alternation order matters: comments before echoes, escaped echoes before
// directives.
const TOKEN_PATTERN: &str = concat!(
    r"(?s)\{\{--.*?--\}\}",
    r"|@(\{\{.*?\}\}|\{!!.*?!!\})",
    r"|\{!!(.*?)!!\}",
    r"|\{\{(.*?)\}\}",
    r"|@(@?)([A-Za-z_][A-Za-z0-9_]*)",
);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    Echo { expr: String, escape: bool },
    Directive { name: String, args: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

pub(crate) struct Lexer {
    pattern: Regex,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(TOKEN_PATTERN).expect("token pattern is valid"),
        }
    }

    pub fn tokenize(&self, src: &str) -> Result<Vec<Token>, SyntaxError> {
        let mut out = Output::default();
        let mut lines = LineCounter::new(src);
        let mut cursor = 0;

        while let Some(caps) = self.pattern.captures_at(src, cursor) {
            let Some(whole) = caps.get(0) else { break };
            let line = lines.line_at(whole.start());
            out.text(&src[cursor..whole.start()], line);
            cursor = whole.end();

            if let Some(literal) = caps.get(1) {
                out.text(literal.as_str(), line);
            } else if let Some(raw) = caps.get(2) {
                out.push(echo(raw.as_str(), false), line);
            } else if let Some(escaped) = caps.get(3) {
                out.push(echo(escaped.as_str(), true), line);
            } else if let Some(name) = caps.get(5) {
                cursor = self.directive(src, &caps, name.as_str(), cursor, line, &mut out)?;
            }
            // Comments produce nothing.
        }

        out.text(&src[cursor..], lines.line_at(cursor));
        Ok(out.tokens)
    }

    /// Handle a `@name` match ending at `cursor`, returning the new cursor.
    fn directive(
        &self,
        src: &str,
        caps: &Captures<'_>,
        name: &str,
        cursor: usize,
        line: usize,
        out: &mut Output,
    ) -> Result<usize, SyntaxError> {
        let Some(whole) = caps.get(0) else {
            return Ok(cursor);
        };
        let escaped = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
        let glued = src[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');

        if escaped {
            out.text(&whole.as_str()[1..], line);
            return Ok(cursor);
        }
        if glued || !DIRECTIVES.contains(&name) {
            out.text(whole.as_str(), line);
            return Ok(cursor);
        }

        if name == "verbatim" {
            let end = src[cursor..].find("@endverbatim").ok_or_else(|| SyntaxError {
                line,
                message: "unclosed @verbatim, expected @endverbatim".to_string(),
            })?;
            out.text(&src[cursor..cursor + end], line);
            return Ok(cursor + end + "@endverbatim".len());
        }

        let rest = &src[cursor..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        if trimmed.starts_with('(') {
            let open = cursor + (rest.len() - trimmed.len());
            let close = find_closing(src, open).ok_or_else(|| SyntaxError {
                line,
                message: format!("unclosed parenthesis after @{}", name),
            })?;
            out.push(
                TokenKind::Directive {
                    name: name.to_string(),
                    args: Some(src[open + 1..close].trim().to_string()),
                },
                line,
            );
            return Ok(close + 1);
        }

        out.push(
            TokenKind::Directive {
                name: name.to_string(),
                args: None,
            },
            line,
        );
        Ok(cursor)
    }
}

fn echo(expr: &str, escape: bool) -> TokenKind {
    TokenKind::Echo {
        expr: expr.trim().to_string(),
        escape,
    }
}

/// Index of the `)` matching the `(` at `open`, skipping quoted strings.
fn find_closing(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in src[open..].char_indices() {
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Default)]
struct Output {
    tokens: Vec<Token>,
}

impl Output {
    fn text(&mut self, text: &str, line: usize) {
        if text.is_empty() {
            return;
        }
        if let Some(Token {
            kind: TokenKind::Text(existing),
            ..
        }) = self.tokens.last_mut()
        {
            existing.push_str(text);
            return;
        }
        self.push(TokenKind::Text(text.to_string()), line);
    }

    fn push(&mut self, kind: TokenKind, line: usize) {
        self.tokens.push(Token { kind, line });
    }
}

struct LineCounter<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        if offset > self.offset {
            self.line += self.src[self.offset..offset].matches('\n').count();
            self.offset = offset;
        }
        self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new()
            .tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn directive(name: &str, args: Option<&str>) -> TokenKind {
        TokenKind::Directive {
            name: name.to_string(),
            args: args.map(String::from),
        }
    }

    #[test]
    fn test_echoes_and_text() {
        assert_eq!(
            kinds("<p>Hallo {{ user.name }}</p>"),
            vec![
                TokenKind::Text("<p>Hallo ".into()),
                echo("user.name", true),
                TokenKind::Text("</p>".into()),
            ]
        );
        assert_eq!(kinds("{!! html !!}"), vec![echo("html", false)]);
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(
            kinds("a{{-- {{ hidden }} --}}b"),
            vec![TokenKind::Text("ab".into())]
        );
    }

    #[test]
    fn test_escaped_echo_is_literal() {
        assert_eq!(
            kinds("@{{ name }} and @@if"),
            vec![TokenKind::Text("{{ name }} and @if".into())]
        );
    }

    #[test]
    fn test_directive_arguments_with_nested_parens_and_strings() {
        assert_eq!(
            kinds("@if ((a || b) && c == ')') x @endif"),
            vec![
                directive("if", Some("(a || b) && c == ')'")),
                TokenKind::Text(" x ".into()),
                directive("endif", None),
            ]
        );
    }

    #[test]
    fn test_unknown_directives_and_emails_are_text() {
        assert_eq!(
            kinds("mail me@example.com @media (x)"),
            vec![TokenKind::Text("mail me@example.com @media (x)".into())]
        );
    }

    #[test]
    fn test_verbatim_block() {
        assert_eq!(
            kinds("@verbatim{{ raw }} @if@endverbatim!"),
            vec![TokenKind::Text("{{ raw }} @if!".into())]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = Lexer::new().tokenize("a\nb\n@if(x)\n@endif").unwrap();
        assert_eq!(tokens[1].line, 3);
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn test_unclosed_parenthesis() {
        let err = Lexer::new().tokenize("line\n@if(a").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("@if"));
    }
}
