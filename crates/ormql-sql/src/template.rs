//! Template syntax.
//!
//! Literal SQL with `{...}` directives:
//!
//! ```text
//! {name}                                placeholder
//! {schema:db.schema.table}              schema-qualified name ("db" optional)
//! {schema:schema.table,"`"}             ... with a custom quote character
//! {variant:id,"main","alternative"}     branch chosen at render time
//! {cycle:id,"body","delimiter"}         body repeated per configured row
//! {cycle:id,"body","delimiter","empty"} ... with an empty case
//! {item:N}                              N-th value of the current cycle row
//! {indent:"..."}                        content on its own indented lines
//! {delimiter:","}                       column separator
//! {row_delimiter:","}                   row separator
//! {{ }}                                 literal braces
//! ```
//!
//! String arguments other than delimiters are themselves templates.

use tracing::trace;

use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::node::{DelimiterKind, Node, QualifiedName};
use crate::span::{Span, Spanned};

const DIRECTIVES: &str = "schema, variant, cycle, item, indent, delimiter, row_delimiter";

/// Parse a template into a raw, uncompressed node list.
pub fn parse_template(source: &str) -> Result<Vec<Node>, ParseError> {
    let nodes = parse_fragment(source, 0, false)?;
    trace!(nodes = nodes.len(), "parsed template");
    Ok(nodes)
}

/// Escape `text` so it parses back to itself as a literal.
pub fn escape_text(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Parse `text`, whose first byte sits at `base` in the outermost source.
fn parse_fragment(text: &str, base: usize, in_cycle: bool) -> Result<Vec<Node>, ParseError> {
    let mut nodes = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(
                    ParseError::new("unmatched '}'", Span::new(base + i, base + i + 1))
                        .with_hint("write '}}' for a literal brace"),
                );
            }
            '{' => {
                let end = directive_end(text, i).ok_or_else(|| {
                    ParseError::new(
                        "unterminated directive",
                        Span::new(base + i, base + text.len()),
                    )
                })?;
                if !literal.is_empty() {
                    nodes.push(Node::text(std::mem::take(&mut literal)));
                }
                let span = Span::new(base + i, base + end + 1);
                nodes.push(parse_directive(&text[i + 1..end], span, in_cycle)?);
                while matches!(chars.peek(), Some(&(j, _)) if j <= end) {
                    chars.next();
                }
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        nodes.push(Node::text(literal));
    }
    Ok(nodes)
}

/// Byte index of the `}` closing the directive opened at `open`, skipping
/// braces inside string arguments.
fn directive_end(text: &str, open: usize) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in text.as_bytes()[open + 1..].iter().enumerate() {
        match byte {
            _ if escaped => escaped = false,
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'}' if !in_string => return Some(open + 1 + offset),
            _ => {}
        }
    }
    None
}

fn parse_directive(content: &str, span: Span, in_cycle: bool) -> Result<Node, ParseError> {
    let mut args = DirectiveParser {
        lexer: Lexer::new(content, span.start + 1),
        span,
        in_cycle,
    };

    if args.lexer.peek().is_none() {
        // Either empty or a lexer error; surface the latter.
        return match args.lexer.next_token() {
            Some(Err(err)) => Err(err),
            _ => Err(ParseError::new("empty directive", span)),
        };
    }

    let head = args.expect_ident()?;
    if args.lexer.peek().is_none() {
        args.finish()?;
        return Ok(Node::placeholder(head.value));
    }
    args.expect_colon()?;

    let node = match head.value.as_str() {
        "schema" => args.qualified_name()?,
        "variant" => {
            let id = args.expect_ident()?;
            args.expect_comma()?;
            let main = args.expect_template(in_cycle)?;
            args.expect_comma()?;
            let alternative = args.expect_template(in_cycle)?;
            Node::variant(id.value, main, alternative)
        }
        "cycle" => {
            let id = args.expect_ident()?;
            args.expect_comma()?;
            let body = args.expect_template(true)?;
            args.expect_comma()?;
            let delimiter = args.expect_str()?;
            let empty_case = if args.lexer.peek().is_some() {
                args.expect_comma()?;
                args.expect_template(in_cycle)?
            } else {
                Vec::new()
            };
            Node::cycle(id.value, body, delimiter.value, empty_case)
        }
        "item" => {
            let index = args.expect_int()?;
            if !in_cycle {
                return Err(ParseError::new("cycle item outside of a cycle body", span)
                    .with_hint("{item:N} is only valid inside {cycle:...}"));
            }
            Node::cycle_item(index.value)
        }
        "indent" => Node::indented(args.expect_template(in_cycle)?),
        "delimiter" => Node::delimiter(args.expect_str()?.value, DelimiterKind::Column),
        "row_delimiter" => Node::delimiter(args.expect_str()?.value, DelimiterKind::Row),
        other => {
            return Err(
                ParseError::new(format!("unknown directive '{}'", other), head.span)
                    .with_hint(format!("expected one of {}", DIRECTIVES)),
            );
        }
    };

    args.finish()?;
    Ok(node)
}

/// Argument parser over one directive's tokens.
struct DirectiveParser<'source> {
    lexer: Lexer<'source>,
    /// Span of the whole directive, braces included.
    span: Span,
    in_cycle: bool,
}

impl DirectiveParser<'_> {
    /// `[database.]schema.name[,"quote"]`
    fn qualified_name(&mut self) -> Result<Node, ParseError> {
        let mut parts = vec![self.expect_ident()?];
        while self.lexer.peek() == Some(&Token::Dot) {
            self.next_token()?;
            parts.push(self.expect_ident()?);
        }

        let quote = if self.lexer.peek() == Some(&Token::Comma) {
            self.next_token()?;
            let quote = self.expect_str()?;
            let mut chars = quote.value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => {
                    return Err(ParseError::new(
                        "quote must be a single character",
                        quote.span,
                    ))
                }
            }
        } else {
            None
        };

        let mut parts = parts.into_iter().map(|part| part.value);
        let name = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(schema), Some(name), None, None) => QualifiedName::new(None, schema, name),
            (Some(database), Some(schema), Some(name), None) => {
                QualifiedName::new(Some(database), schema, name)
            }
            _ => {
                return Err(ParseError::new(
                    "expected schema.name or database.schema.name",
                    self.span,
                ))
            }
        };

        Ok(Node::qualified(match quote {
            Some(quote) => name.with_quote(quote),
            None => name,
        }))
    }

    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        match self.lexer.next_token() {
            Some(token) => token,
            None => Err(ParseError::new("unexpected end of directive", self.lexer.end())),
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(Spanned::new(name, tok.span)),
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn expect_str(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Str(s) => Ok(Spanned::new(s, tok.span)),
            other => Err(ParseError::new(
                format!("expected string, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn expect_int(&mut self) -> Result<Spanned<usize>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Int(n) => Ok(Spanned::new(n, tok.span)),
            other => Err(ParseError::new(
                format!("expected integer, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    /// A string argument parsed as a nested template.
    ///
    /// Error spans inside it are exact unless the string uses escapes.
    fn expect_template(&mut self, in_cycle: bool) -> Result<Vec<Node>, ParseError> {
        let text = self.expect_str()?;
        parse_fragment(&text.value, text.span.start + 1, in_cycle || self.in_cycle)
    }

    fn expect_colon(&mut self) -> Result<(), ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Colon => Ok(()),
            Token::Dot => Err(ParseError::new("expected ':', found '.'", tok.span)
                .with_hint("qualified names are written {schema:db.schema.table}")),
            other => Err(ParseError::new(
                format!("expected ':', found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn expect_comma(&mut self) -> Result<(), ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Comma => Ok(()),
            other => Err(ParseError::new(
                format!("expected ',', found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        match self.lexer.next_token() {
            None => Ok(()),
            Some(Err(err)) => Err(err),
            Some(Ok(tok)) => Err(ParseError::new(
                format!("unexpected {} at end of directive", tok.token.describe()),
                tok.span,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_placeholder_and_cycle() {
        let nodes =
            parse_template(r#"SELECT * FROM {tbl} WHERE id IN ({cycle:ids,"?",","})"#).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::text("SELECT * FROM "),
                Node::placeholder("tbl"),
                Node::text(" WHERE id IN ("),
                Node::cycle("ids", vec![Node::text("?")], ",", vec![]),
                Node::text(")"),
            ]
        );
    }

    #[test]
    fn test_escaped_braces() {
        let nodes = parse_template("a {{b}} c").unwrap();
        assert_eq!(nodes, vec![Node::text("a {b} c")]);
        assert_eq!(escape_text("{x}"), "{{x}}");
    }

    #[test]
    fn test_nested_directives() {
        let nodes = parse_template(
            r#"{cycle:rows,"({item:0}, {variant:v,\"{item:1}\",\"NULL\"})",",","(NULL)"}"#,
        )
        .unwrap();
        assert_eq!(
            nodes,
            vec![Node::cycle(
                "rows",
                vec![
                    Node::text("("),
                    Node::cycle_item(0),
                    Node::text(", "),
                    Node::variant("v", vec![Node::cycle_item(1)], vec![Node::text("NULL")]),
                    Node::text(")"),
                ],
                ",",
                vec![Node::text("(NULL)")],
            )]
        );
    }

    #[test]
    fn test_schema_qualified_names() {
        let nodes =
            parse_template("{schema:main.dbo.Users} {schema: dbo . Orders, \"`\"}").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::qualified(QualifiedName::new(Some("main".into()), "dbo", "Users")),
                Node::text(" "),
                Node::qualified(QualifiedName::new(None, "dbo", "Orders").with_quote('`')),
            ]
        );
        assert!(parse_template("{schema:Users}").is_err());
        assert!(parse_template("{schema:a.b.c.d}").is_err());
    }

    #[test]
    fn test_indent_and_delimiters() {
        let nodes = parse_template(r#"IN ({indent:"a{delimiter:\",\"}b"})"#).unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::text("IN ("),
                Node::indented(vec![
                    Node::text("a"),
                    Node::delimiter(",", DelimiterKind::Column),
                    Node::text("b"),
                ]),
                Node::text(")"),
            ]
        );
    }

    #[test]
    fn test_item_outside_cycle_rejected() {
        let err = parse_template("x {item:0}").unwrap_err();
        assert_eq!(err.span, Span::new(2, 10));
        assert!(err.hint.is_some());

        // Empty cases render when there is no row.
        assert!(parse_template(r#"{cycle:c,"?",",","{item:0}"}"#).is_err());
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("{}", "empty directive"),
            ("{tbl", "unterminated directive"),
            ("a } b", "unmatched '}'"),
            ("{frob:x}", "unknown directive 'frob'"),
            ("{a.b}", "expected ':', found '.'"),
            ("{variant:v,\"a\"}", "unexpected end of directive"),
            ("{tbl extra}", "expected ':', found identifier 'extra'"),
            ("{delimiter:\",\" x}", "unexpected identifier 'x' at end of directive"),
            ("{item:x}", "expected integer, found identifier 'x'"),
        ];
        for (source, message) in cases {
            let err = parse_template(source).unwrap_err();
            assert_eq!(err.message, message, "{}", source);
        }
    }

    #[test]
    fn test_error_span_points_into_nested_string() {
        let source = r#"{variant:v,"ok","{bad:1}"}"#;
        let err = parse_template(source).unwrap_err();
        assert_eq!(&source[err.span.start..err.span.end], "bad");
    }
}
