//! Lexer for tag arguments and variable expressions using logos

use logos::{Lexer, Logos};

use crate::error::{ParseError, Span};
use crate::parser::lexer::scan_quoted;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\x0C]+")]
pub enum Token {
    // Keywords
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[token("True")]
    #[token("true")]
    True,
    #[token("False")]
    #[token("false")]
    False,
    #[token("None")]
    #[token("none")]
    NoneLit,

    // Comparison operators (longer first)
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Punctuation
    #[token("=")]
    Assign,
    #[token("|")]
    Pipe,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("/")]
    Slash,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_@][a-zA-Z0-9_\-]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[token("\"", lex_string)]
    #[token("'", lex_string)]
    Str(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
}

/// Consume a quoted string, including nested tags, and unescape it
fn lex_string(lex: &mut Lexer<Token>) -> Option<String> {
    let start = lex.span().start;
    let end = scan_quoted(lex.source().as_bytes(), start).ok()?;
    lex.bump(end - lex.span().end);
    Some(unescape(&lex.source()[start + 1..end - 1]))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next @ ('\\' | '"' | '\'')) => out.push(next),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Lex an argument string whose first byte sits at `offset` in the template
pub fn lex(input: &str, offset: usize) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let span = span.start + offset..span.end + offset;
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let slice = lexer.slice();
                let message = if slice.starts_with('"') || slice.starts_with('\'') {
                    "unterminated string literal".to_string()
                } else {
                    format!("unexpected character '{}'", slice)
                };
                return Err(ParseError::syntax(span, message));
            }
        }
    }
    Ok(tokens)
}
