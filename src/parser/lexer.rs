//! Template tokenizers
//!
//! [`tokenize`] is a single left-to-right scanner that keeps a stack of open
//! regions so tag arguments may carry nested tags inside quoted strings:
//!
//! ```text
//! {% component "card" title="{% lorem 3 w %}" / %}
//! ```
//!
//! [`tokenize_baseline`] is the plain regex tokenizer. For input without
//! nested syntax both produce the same token stream.

use std::sync::LazyLock;

use memchr::{memchr, memmem};
use regex::Regex;

use crate::error::{ParseError, Span};
use crate::parser::ast::{Spanned, Token};

static TAG_RE_MULTILINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").expect("valid regex")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").expect("valid regex"));

static SMART_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?s)(?:[^\x20\t\n\x0C\r'"]*"#,
        r#"(?:(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')[^\x20\t\n\x0C\r'"]*)+)"#,
        r#"|[^\x20\t\n\x0C\r]+"#,
    ))
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Block,
    Variable,
    Comment,
}

impl TagKind {
    fn from_opener(byte: u8) -> Option<Self> {
        match byte {
            b'%' => Some(TagKind::Block),
            b'{' => Some(TagKind::Variable),
            b'#' => Some(TagKind::Comment),
            _ => None,
        }
    }

    fn terminator(self) -> &'static [u8] {
        match self {
            TagKind::Block => b"%}",
            TagKind::Variable => b"}}",
            TagKind::Comment => b"#}",
        }
    }
}

/// Region opened while scanning inside a tag
#[derive(Debug, Clone, Copy)]
enum Region {
    Quote(u8),
    Tag(&'static [u8]),
}

/// Innermost region left open at the end of input
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Unclosed {
    pub span: Span,
    pub nested_tag: bool,
}

impl Unclosed {
    pub(crate) fn into_error(self) -> ParseError {
        let message = if self.nested_tag {
            "unclosed tag inside quoted argument"
        } else {
            "unterminated string literal"
        };
        ParseError::syntax(self.span, message)
    }
}

fn is_ws(byte: u8) -> bool {
    byte.is_ascii_whitespace()
}

/// Whether a quote at `i` starts a quoted region: only at the start of a bit
/// or right after an argument separator, so apostrophes in words stay literal
fn opens_quote(bytes: &[u8], i: usize, bit_start: usize) -> bool {
    i == bit_start || matches!(bytes[i - 1], b'=' | b':' | b'(' | b',' | b'|') || is_ws(bytes[i - 1])
}

/// Scan a quoted string whose opening quote is at `start`.
///
/// Returns the index one past the closing quote. Inside the quotes `\`
/// escapes the next byte and `{%` / `{{` open nested tags in which quotes
/// are balanced again.
pub(crate) fn scan_quoted(bytes: &[u8], start: usize) -> Result<usize, Unclosed> {
    let mut stack = vec![(Region::Quote(bytes[start]), start)];
    let mut i = start + 1;

    while i < bytes.len() {
        let Some(&(region, opened)) = stack.last() else {
            break;
        };
        match region {
            Region::Quote(quote) => {
                let byte = bytes[i];
                if byte == b'\\' {
                    i += 2;
                } else if byte == quote {
                    stack.pop();
                    i += 1;
                    if stack.is_empty() {
                        return Ok(i);
                    }
                } else if byte == b'{' && matches!(bytes.get(i + 1), Some(b'%' | b'{')) {
                    let terminator: &'static [u8] = if bytes[i + 1] == b'%' { b"%}" } else { b"}}" };
                    stack.push((Region::Tag(terminator), i));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            Region::Tag(terminator) => {
                if bytes[i..].starts_with(terminator) {
                    stack.pop();
                    i += 2;
                    continue;
                }
                let byte = bytes[i];
                if (byte == b'"' || byte == b'\'') && opens_quote(bytes, i, opened + 2) {
                    stack.push((Region::Quote(byte), i));
                }
                i += 1;
            }
        }
    }

    let (region, opened) = stack
        .last()
        .copied()
        .unwrap_or((Region::Quote(b'"'), start));
    Err(Unclosed {
        span: opened..bytes.len(),
        nested_tag: matches!(region, Region::Tag(_)),
    })
}

/// Find the start of the terminator of the tag opened at `open`.
///
/// `Ok(None)` means the opener is plain text.
fn find_close(
    bytes: &[u8],
    open: usize,
    kind: TagKind,
    multiline: bool,
) -> Result<Option<usize>, ParseError> {
    let content_start = open + 2;
    let terminator = kind.terminator();

    if kind == TagKind::Comment {
        let rest = &bytes[content_start..];
        let Some(pos) = memmem::find(rest, terminator) else {
            return Ok(None);
        };
        if !multiline && memchr(b'\n', &rest[..pos]).is_some() {
            return Ok(None);
        }
        return Ok(Some(content_start + pos));
    }

    let mut i = content_start;
    while i < bytes.len() {
        if bytes[i..].starts_with(terminator) {
            return Ok(Some(i));
        }
        let byte = bytes[i];
        if byte == b'\n' && !multiline {
            return Ok(None);
        }
        if (byte == b'"' || byte == b'\'') && opens_quote(bytes, i, content_start) {
            let end = scan_quoted(bytes, i).map_err(Unclosed::into_error)?;
            if !multiline && memchr(b'\n', &bytes[i..end]).is_some() {
                return Ok(None);
            }
            i = end;
            continue;
        }
        i += 1;
    }
    Ok(None)
}

/// Trim ASCII whitespace from `start..end`, returning the trimmed bounds
fn trimmed(src: &str, start: usize, end: usize) -> (usize, usize) {
    let text = &src[start..end];
    let rest = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let lead = text.len() - rest.len();
    let inner = rest.trim_end_matches(|c: char| c.is_ascii_whitespace());
    (start + lead, start + lead + inner.len())
}

/// Split tag contents on whitespace outside quoted regions
fn split_bits_extended(src: &str, start: usize, end: usize) -> Vec<Span> {
    let bytes = &src.as_bytes()[..end];
    let mut bits = Vec::new();
    let mut i = start;

    while i < end {
        if is_ws(bytes[i]) {
            i += 1;
            continue;
        }
        let bit_start = i;
        while i < end && !is_ws(bytes[i]) {
            if bytes[i] == b'"' || bytes[i] == b'\'' {
                if let Ok(next) = scan_quoted(bytes, i) {
                    i = next;
                    continue;
                }
            }
            i += 1;
        }
        bits.push(bit_start..i);
    }
    bits
}

fn split_bits_baseline(src: &str, start: usize, end: usize) -> Vec<Span> {
    SMART_SPLIT_RE
        .find_iter(&src[start..end])
        .map(|m| start + m.start()..start + m.end())
        .collect()
}

fn push_text(tokens: &mut Vec<Spanned<Token>>, src: &str, start: usize, end: usize) {
    if start < end {
        tokens.push(Spanned::new(Token::Text(src[start..end].to_string()), start..end));
    }
}

fn push_tag(
    tokens: &mut Vec<Spanned<Token>>,
    src: &str,
    kind: TagKind,
    open: usize,
    close: usize,
    split: fn(&str, usize, usize) -> Vec<Span>,
) {
    let (start, end) = trimmed(src, open + 2, close);
    match kind {
        TagKind::Comment => {}
        TagKind::Variable => {
            tokens.push(Spanned::new(Token::VarRef(src[start..end].to_string()), start..end));
        }
        TagKind::Block => {
            let mut bits = split(src, start, end).into_iter();
            match bits.next() {
                Some(name) => tokens.push(Spanned::new(
                    Token::TagStart(src[name.clone()].to_string()),
                    name,
                )),
                None => tokens.push(Spanned::new(Token::TagStart(String::new()), start..start)),
            }
            for bit in bits {
                tokens.push(Spanned::new(Token::TagArg(src[bit.clone()].to_string()), bit));
            }
            tokens.push(Spanned::new(Token::TagEnd, close..close + 2));
        }
    }
}

/// Tokenize template source, allowing nested tags inside quoted arguments
pub fn tokenize(src: &str, multiline: bool) -> Result<Vec<Spanned<Token>>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = memchr(b'{', &bytes[pos..]) {
        let open = pos + offset;
        let Some(kind) = bytes.get(open + 1).and_then(|&b| TagKind::from_opener(b)) else {
            pos = open + 1;
            continue;
        };
        match find_close(bytes, open, kind, multiline)? {
            Some(close) => {
                push_text(&mut tokens, src, text_start, open);
                push_tag(&mut tokens, src, kind, open, close, split_bits_extended);
                pos = close + 2;
                text_start = pos;
            }
            None => pos = open + 1,
        }
    }
    push_text(&mut tokens, src, text_start, src.len());
    Ok(tokens)
}

/// Tokenize template source with the plain regex scanner
pub fn tokenize_baseline(src: &str, multiline: bool) -> Vec<Spanned<Token>> {
    let re = if multiline { &*TAG_RE_MULTILINE } else { &*TAG_RE };
    let mut tokens = Vec::new();
    let mut text_start = 0;

    for m in re.find_iter(src) {
        let kind = match TagKind::from_opener(src.as_bytes()[m.start() + 1]) {
            Some(kind) => kind,
            None => continue,
        };
        push_text(&mut tokens, src, text_start, m.start());
        push_tag(&mut tokens, src, kind, m.start(), m.end() - 2, split_bits_baseline);
        text_start = m.end();
    }
    push_text(&mut tokens, src, text_start, src.len());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(tokens: &[Spanned<Token>]) -> Vec<Token> {
        tokens.iter().map(|t| t.node.clone()).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = tokenize("a {{ x }}{% if y %}b{% endif %}{# gone #}", true).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                Token::Text("a ".into()),
                Token::VarRef("x".into()),
                Token::TagStart("if".into()),
                Token::TagArg("y".into()),
                Token::TagEnd,
                Token::Text("b".into()),
                Token::TagStart("endif".into()),
                Token::TagEnd,
            ]
        );
    }

    #[test]
    fn test_spans_point_into_source() {
        let src = "<p>{% slot \"body\" %}</p>";
        let tokens = tokenize(src, true).unwrap();
        assert_eq!(&src[tokens[1].span.clone()], "slot");
        assert_eq!(&src[tokens[2].span.clone()], "\"body\"");
        assert_eq!(&src[tokens[3].span.clone()], "%}");
    }

    #[test]
    fn test_nested_tag_in_quoted_argument() {
        let src = r#"{% component "card" title="{% lorem 3 w %}" / %}"#;
        let tokens = tokenize(src, true).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                Token::TagStart("component".into()),
                Token::TagArg("\"card\"".into()),
                Token::TagArg(r#"title="{% lorem 3 w %}""#.into()),
                Token::TagArg("/".into()),
                Token::TagEnd,
            ]
        );
    }

    #[test]
    fn test_nested_quotes_inside_nested_tag() {
        let src = r#"{% component "c" x="{% component "inner" y='1 2' / %}" %}"#;
        let tokens = tokenize(src, true).unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(
            tokens[2].node,
            Token::TagArg(r#"x="{% component "inner" y='1 2' / %}""#.into())
        );
    }

    #[test]
    fn test_unterminated_quote_reports_span() {
        let src = r#"{% component title="abc %}"#;
        let err = tokenize(src, true).unwrap_err();
        assert_eq!(err.span(), &(19..src.len()));
        assert_eq!(err.message(), "unterminated string literal");
    }

    #[test]
    fn test_unclosed_nested_tag_reports_innermost_region() {
        let src = r#"{% component title="{% lorem %}"#;
        // The outer quote swallows the tag terminator; the innermost region is the quote
        let err = tokenize(src, true).unwrap_err();
        assert_eq!(err.span().start, 19);
    }

    #[test]
    fn test_apostrophe_in_word_is_literal() {
        let tokens = tokenize("{% lorem don't 2 %}", true).unwrap();
        assert_eq!(tokens[1].node, Token::TagArg("don't".into()));
    }

    #[test]
    fn test_unterminated_opener_is_text() {
        let tokens = tokenize("a {% b", true).unwrap();
        assert_eq!(kinds(&tokens), vec![Token::Text("a {% b".into())]);
    }

    #[test]
    fn test_single_line_tags() {
        let src = "{{ a\n}} {{ b }}";
        let tokens = tokenize(src, false).unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![Token::Text("{{ a\n}} ".into()), Token::VarRef("b".into())]
        );
        assert_eq!(tokens, tokenize_baseline(src, false));
    }

    #[test]
    fn test_empty_block_tag() {
        let tokens = tokenize("{% %}", true).unwrap();
        assert_eq!(tokens[0].node, Token::TagStart(String::new()));
    }

    #[test]
    fn test_matches_baseline_for_ordinary_input() {
        let samples = [
            "plain text only",
            "{% if user.is_staff and not x %}Hi {{ user.name|title }}{% endif %}",
            "{% for a, b in items reversed %}{{ a }}={{ b }}{% empty %}none{% endfor %}",
            r#"{% component "card" title="Hello world" count=3 / %}"#,
            "{% with greeting='hi there' %}{{ greeting }}{% endwith %}",
            "{# note #}{% lorem 2 w random %}{{}}{%%}",
            "{% slot 'x' default %}It's {{ thing }}{% endslot %}",
            "{% html_attrs attrs class=\"a b\" data-id=\"7\" %}\n{%\n  if x\n%}y{% endif %}",
            "{{ a }} { b } {%- c -%} }} %} {# x",
            "{% trans \"don't\" %} and {% blocktrans count n=1 %}",
        ];
        for multiline in [true, false] {
            for src in samples {
                assert_eq!(
                    tokenize(src, multiline).unwrap(),
                    tokenize_baseline(src, multiline),
                    "{src:?} multiline={multiline}"
                );
            }
        }
    }
}
