//! Expression and tag-argument grammar using chumsky

use std::sync::Arc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::{ParseError, Span};
use crate::parser::args::{self, Token};
use crate::parser::ast::*;
use crate::parser::ParseOptions;
use crate::value::Value;

type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Arguments of a block tag: `"name" key=value ... /`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagArgs {
    pub positional: Vec<Spanned<Expr>>,
    pub kwargs: Vec<Kwarg>,
    /// Trailing `/` marking a self-closing tag
    pub self_closing: bool,
}

/// Header of a `{% for %}` tag
#[derive(Debug, Clone, PartialEq)]
pub struct ForHeader {
    pub vars: Vec<String>,
    pub iterable: Spanned<Expr>,
    pub reversed: bool,
}

enum Arg {
    Positional(Spanned<Expr>),
    Keyword(Kwarg),
}

/// Parse a full expression (`{{ ... }}` contents or `{% if %}` condition)
pub fn parse_expr(src: &str, offset: usize, opts: ParseOptions) -> Result<Spanned<Expr>, ParseError> {
    let tokens = args::lex(src, offset)?;
    let eoi = offset + src.len();
    expr_entry(opts)
        .parse(token_stream(tokens, eoi))
        .into_result()
        .map_err(|errs| first_error(errs, offset..eoi))
}

/// Parse block tag arguments
pub fn parse_args(src: &str, offset: usize, opts: ParseOptions) -> Result<TagArgs, ParseError> {
    let tokens = args::lex(src, offset)?;
    let eoi = offset + src.len();
    args_parser(opts)
        .parse(token_stream(tokens, eoi))
        .into_result()
        .map_err(|errs| first_error(errs, offset..eoi))
}

/// Parse a `{% for %}` header
pub fn parse_for(src: &str, offset: usize, opts: ParseOptions) -> Result<ForHeader, ParseError> {
    let tokens = args::lex(src, offset)?;
    let eoi = offset + src.len();
    for_parser(opts)
        .parse(token_stream(tokens, eoi))
        .into_result()
        .map_err(|errs| first_error(errs, offset..eoi))
}

fn token_stream<'a>(
    tokens: Vec<(Token, Span)>,
    eoi: usize,
) -> impl ValueInput<'a, Token = Token, Span = SimpleSpan> {
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));
    Stream::from_iter(token_iter).map((eoi..eoi).into(), |(t, s): (_, _)| (t, s))
}

fn first_error(errs: Vec<Rich<'_, Token>>, fallback: Span) -> ParseError {
    errs.into_iter()
        .next()
        .map(ParseError::from)
        .unwrap_or_else(|| ParseError::syntax(fallback, "invalid tag arguments"))
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> Span {
    e.start()..e.end()
}

/// String literals containing template syntax compile to nested templates
fn string_expr<'a>(s: String, span: SimpleSpan, opts: ParseOptions) -> Result<Expr, Rich<'a, Token>> {
    if s.contains("{%") || s.contains("{{") {
        crate::parser::parse_with(&s, opts)
            .map(|template| Expr::Template(Arc::new(template)))
            .map_err(|err| Rich::custom(span, format!("in nested template: {}", err.message())))
    } else {
        Ok(Expr::Literal(Value::Str(s)))
    }
}

/// `atom ("|" filter (":" atom)?)*`, with `expr` used for parenthesised groups
fn filtered_atom<'a, I, P>(expr: P, opts: ParseOptions) -> impl Parser<'a, I, Expr, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
    P: Parser<'a, I, Expr, Extra<'a>> + Clone,
{
    let ident = select! { Token::Ident(s) => s };

    let literal = select! {
        Token::Int(n) => Value::Int(n),
        Token::Float(f) => Value::Float(f),
        Token::True => Value::Bool(true),
        Token::False => Value::Bool(false),
        Token::NoneLit => Value::None,
    }
    .map(Expr::Literal);

    let string = select! { Token::Str(s) => s }
        .try_map(move |s, span: SimpleSpan| string_expr(s, span, opts));

    let segment = choice((
        ident.clone().map(PathSegment::Key),
        select! { Token::Int(n) if n >= 0 => PathSegment::Index(n as usize) },
    ));

    // Variable path: user.name, items.0
    let path = ident
        .clone()
        .then(
            just(Token::Dot)
                .ignore_then(segment)
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(root, segments)| Expr::Path { root, segments });

    let atom = choice((
        literal,
        string,
        path,
        expr.delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
    ));

    let filter = just(Token::Pipe)
        .ignore_then(ident)
        .then(just(Token::Colon).ignore_then(atom.clone()).or_not())
        .try_map(|(name, arg), span| match Filter::from_name(&name) {
            Some(filter) => Ok((filter, arg)),
            None => Err(Rich::custom(span, format!("unknown filter '{}'", name))),
        });

    atom.then(filter.repeated().collect::<Vec<_>>())
        .map(|(base, filters)| {
            filters.into_iter().fold(base, |input, (filter, arg)| Expr::Filter {
                input: Box::new(input),
                filter,
                arg: arg.map(Box::new),
            })
        })
}

fn expr_parser<'a, I>(opts: ParseOptions) -> impl Parser<'a, I, Expr, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(move |expr| {
        let filtered = filtered_atom(expr, opts).boxed();

        let op = choice((
            just(Token::Eq).to(CmpOp::Eq),
            just(Token::Ne).to(CmpOp::Ne),
            just(Token::Le).to(CmpOp::Le),
            just(Token::Ge).to(CmpOp::Ge),
            just(Token::Lt).to(CmpOp::Lt),
            just(Token::Gt).to(CmpOp::Gt),
            just(Token::In).to(CmpOp::In),
            just(Token::Not).then(just(Token::In)).to(CmpOp::NotIn),
        ));

        let cmp = filtered
            .clone()
            .then(op.then(filtered).or_not())
            .map(|(left, rhs)| match rhs {
                Some((op, right)) => Expr::Compare {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                None => left,
            });

        let not = just(Token::Not)
            .repeated()
            .collect::<Vec<_>>()
            .then(cmp)
            .map(|(nots, inner)| {
                nots.iter()
                    .fold(inner, |acc, _| Expr::Not(Box::new(acc)))
            })
            .boxed();

        let and = not
            .clone()
            .then(
                just(Token::And)
                    .ignore_then(not)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |l, r| Expr::And(Box::new(l), Box::new(r)))
            })
            .boxed();

        and.clone()
            .then(
                just(Token::Or)
                    .ignore_then(and)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |l, r| Expr::Or(Box::new(l), Box::new(r)))
            })
            .boxed()
    })
}

fn expr_entry<'a, I>(opts: ParseOptions) -> impl Parser<'a, I, Spanned<Expr>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    expr_parser(opts)
        .map_with(|expr, e| Spanned::new(expr, span_range(&e.span())))
        .then_ignore(end())
}

fn args_parser<'a, I>(opts: ParseOptions) -> impl Parser<'a, I, TagArgs, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let value = filtered_atom(expr_parser(opts), opts)
        .map_with(|expr, e| Spanned::new(expr, span_range(&e.span())));

    let name = select! { Token::Ident(s) => s }
        .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let kwarg = name
        .then_ignore(just(Token::Assign))
        .then(value.clone())
        .map(|(name, value)| Arg::Keyword(Kwarg { name, value }));

    choice((kwarg, value.map(Arg::Positional)))
        .repeated()
        .collect::<Vec<_>>()
        .then(just(Token::Slash).or_not())
        .then_ignore(end())
        .map(|(items, slash)| {
            let mut args = TagArgs {
                self_closing: slash.is_some(),
                ..TagArgs::default()
            };
            for item in items {
                match item {
                    Arg::Positional(expr) => args.positional.push(expr),
                    Arg::Keyword(kwarg) => args.kwargs.push(kwarg),
                }
            }
            args
        })
}

fn for_parser<'a, I>(opts: ParseOptions) -> impl Parser<'a, I, ForHeader, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let var = select! { Token::Ident(s) => s };
    let reversed = select! { Token::Ident(s) if s == "reversed" => () };

    var.separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .then_ignore(just(Token::In))
        .then(
            filtered_atom(expr_parser(opts), opts)
                .map_with(|expr, e| Spanned::new(expr, span_range(&e.span()))),
        )
        .then(reversed.or_not())
        .then_ignore(end())
        .map(|((vars, iterable), reversed)| ForHeader {
            vars,
            iterable,
            reversed: reversed.is_some(),
        })
}
