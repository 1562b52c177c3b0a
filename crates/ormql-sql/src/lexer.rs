//! Lexer for directive arguments using logos.
//!
//! Only the text between a directive's braces is lexed; literal SQL around
//! directives is copied through untouched by the template parser.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Tokens inside a `{...}` directive.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Double-quoted, backslash-escaped.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    Str(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<usize>().ok())]
    Int(usize),

    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
}

impl Token {
    /// Short human-readable name for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Str(_) => "string".to_string(),
            Token::Int(n) => format!("integer {}", n),
            Token::Colon => "':'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
        }
    }
}

fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// A token with its span in the template source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer over one directive's content, with single-token lookahead.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    base: usize,
    peeked: Option<Option<Result<SpannedToken, ParseError>>>,
}

impl<'source> Lexer<'source> {
    /// Lex `source`, reporting spans shifted by `base` bytes.
    pub fn new(source: &'source str, base: usize) -> Self {
        Self {
            inner: Token::lexer(source),
            base,
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_inner());
        }
        match self.peeked.as_ref() {
            Some(Some(Ok(tok))) => Some(&tok.token),
            _ => None,
        }
    }

    pub fn next_token(&mut self) -> Option<Result<SpannedToken, ParseError>> {
        if let Some(peeked) = self.peeked.take() {
            peeked
        } else {
            self.next_inner()
        }
    }

    fn next_inner(&mut self) -> Option<Result<SpannedToken, ParseError>> {
        let token = self.inner.next()?;
        let span = Span::from(self.inner.span()).offset(self.base);
        Some(match token {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(ParseError::new(
                format!("unexpected '{}' in directive", self.inner.slice()),
                span,
            )),
        })
    }

    /// Span of the end of the lexed content.
    pub fn end(&self) -> Span {
        let end = self.base + self.inner.source().len();
        Span::new(end, end)
    }
}

/// Tokenize directive content (for debugging/testing).
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Lexer::new(source, 0);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token?);
    }
    Ok(tokens)
}
