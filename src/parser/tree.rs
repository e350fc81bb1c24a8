//! Block-tag tree builder
//!
//! Consumes the flat token stream, matches block tags to their end tags and
//! produces the compiled [`Template`].

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{ParseError, Span};
use crate::parser::ast::*;
use crate::parser::grammar::{self, TagArgs};
use crate::parser::ParseOptions;
use crate::value::Value;

/// Tags that only make sense as the end or a branch of an enclosing block
const CLOSING_TAGS: &[&str] = &[
    "elif",
    "else",
    "endif",
    "empty",
    "endfor",
    "endwith",
    "endcomponent",
    "endfill",
    "endslot",
    "endprovide",
    "endcomment",
];

/// Build a template tree from tokens produced for `src`
pub fn build(src: &str, tokens: Vec<Spanned<Token>>, opts: ParseOptions) -> Result<Template, ParseError> {
    let mut parser = TreeParser {
        src,
        tokens: tokens.into_iter(),
        opts,
    };
    let (nodes, _) = parser.parse_block(None, &[], false)?;
    Ok(Template::new(nodes))
}

/// A complete `{% ... %}` tag
#[derive(Debug)]
struct Tag {
    name: String,
    name_span: Span,
    args: Vec<Spanned<String>>,
    end_span: Span,
}

impl Tag {
    fn span(&self) -> Span {
        self.name_span.start..self.end_span.end
    }

    /// Source text covering all arguments, with its offset
    fn args_source<'s>(&self, src: &'s str) -> (&'s str, usize) {
        match (self.args.first(), self.args.last()) {
            (Some(first), Some(last)) => (&src[first.span.start..last.span.end], first.span.start),
            _ => ("", self.name_span.end),
        }
    }
}

enum Item {
    Text(Spanned<String>),
    Var(Spanned<String>),
    Tag(Tag),
}

struct TreeParser<'s> {
    src: &'s str,
    tokens: std::vec::IntoIter<Spanned<Token>>,
    opts: ParseOptions,
}

impl<'s> TreeParser<'s> {
    fn next_item(&mut self) -> Result<Option<Item>, ParseError> {
        let Some(token) = self.tokens.next() else {
            return Ok(None);
        };
        match token.node {
            Token::Text(text) => Ok(Some(Item::Text(Spanned::new(text, token.span)))),
            Token::VarRef(var) => Ok(Some(Item::Var(Spanned::new(var, token.span)))),
            Token::TagStart(name) => {
                let mut args = Vec::new();
                loop {
                    match self.tokens.next() {
                        Some(Spanned {
                            node: Token::TagArg(arg),
                            span,
                        }) => args.push(Spanned::new(arg, span)),
                        Some(Spanned {
                            node: Token::TagEnd,
                            span,
                        }) => {
                            return Ok(Some(Item::Tag(Tag {
                                name,
                                name_span: token.span,
                                args,
                                end_span: span,
                            })))
                        }
                        _ => return Err(ParseError::syntax(token.span, "malformed tag")),
                    }
                }
            }
            Token::TagArg(_) | Token::TagEnd => {
                Err(ParseError::syntax(token.span, "tag argument outside of a tag"))
            }
        }
    }

    /// Parse nodes until a tag named in `until`; `None` when input ran out
    fn parse_block(
        &mut self,
        opener: Option<&Tag>,
        until: &[&str],
        in_component: bool,
    ) -> Result<(Vec<Spanned<Node>>, Option<Tag>), ParseError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.next_item()? {
            match item {
                Item::Text(text) => nodes.push(Spanned::new(Node::Text(text.node), text.span)),
                Item::Var(var) => {
                    if var.node.is_empty() {
                        return Err(ParseError::syntax(var.span, "empty variable tag"));
                    }
                    let expr = grammar::parse_expr(&var.node, var.span.start, self.opts)?;
                    nodes.push(Spanned::new(Node::Output(expr.node), var.span));
                }
                Item::Tag(tag) => {
                    if until.contains(&tag.name.as_str()) {
                        return Ok((nodes, Some(tag)));
                    }
                    if CLOSING_TAGS.contains(&tag.name.as_str()) {
                        let message = match opener {
                            Some(opener) => format!(
                                "unexpected '{}' inside '{}' block, expected {}",
                                tag.name,
                                opener.name,
                                until.join(" or ")
                            ),
                            None => format!("unexpected '{}' tag", tag.name),
                        };
                        return Err(ParseError::syntax(tag.span(), message));
                    }
                    if tag.name == "fill" {
                        if !in_component {
                            return Err(ParseError::syntax(
                                tag.span(),
                                "'fill' tag must be placed directly inside a component block",
                            ));
                        }
                        nodes.push(self.parse_fill(tag)?);
                        continue;
                    }
                    if let Some(node) = self.parse_tag(tag)? {
                        nodes.push(node);
                    }
                }
            }
        }
        Ok((nodes, None))
    }

    /// Parse a block body that must be closed by one of `until`
    fn parse_until(
        &mut self,
        opener: &Tag,
        until: &[&str],
        in_component: bool,
    ) -> Result<(Vec<Spanned<Node>>, Tag), ParseError> {
        let (nodes, end) = self.parse_block(Some(opener), until, in_component)?;
        let end = end.ok_or_else(|| {
            ParseError::syntax(
                opener.span(),
                format!(
                    "unclosed '{}' tag, expected {}",
                    opener.name,
                    until.join(" or ")
                ),
            )
        })?;
        Ok((nodes, end))
    }

    fn args_of(&self, tag: &Tag) -> Result<TagArgs, ParseError> {
        let (src, offset) = tag.args_source(self.src);
        grammar::parse_args(src, offset, self.opts)
    }

    fn expr_of(&self, tag: &Tag) -> Result<Spanned<Expr>, ParseError> {
        if tag.args.is_empty() {
            return Err(ParseError::syntax(
                tag.span(),
                format!("'{}' tag requires a condition", tag.name),
            ));
        }
        let (src, offset) = tag.args_source(self.src);
        grammar::parse_expr(src, offset, self.opts)
    }

    fn no_args(&self, tag: &Tag) -> Result<(), ParseError> {
        match tag.args.first() {
            Some(arg) => Err(ParseError::syntax(
                arg.span.clone(),
                format!("'{}' tag takes no arguments", tag.name),
            )),
            None => Ok(()),
        }
    }

    fn parse_tag(&mut self, tag: Tag) -> Result<Option<Spanned<Node>>, ParseError> {
        let name = tag.name.clone();
        let node = match name.as_str() {
            "" => return Err(ParseError::syntax(tag.span(), "empty block tag")),
            "if" => self.parse_if(tag)?,
            "for" => self.parse_for(tag)?,
            "with" => self.parse_with(tag)?,
            "component" => self.parse_component(tag)?,
            "slot" => self.parse_slot(tag)?,
            "html_attrs" => self.parse_html_attrs(tag)?,
            "provide" => self.parse_provide(tag)?,
            "lorem" => self.parse_lorem(tag)?,
            "comment" => {
                self.skip_comment(tag)?;
                return Ok(None);
            }
            "component_css_dependencies" => {
                self.no_args(&tag)?;
                Spanned::new(Node::Dependencies(DepsKind::Css), tag.span())
            }
            "component_js_dependencies" => {
                self.no_args(&tag)?;
                Spanned::new(Node::Dependencies(DepsKind::Js), tag.span())
            }
            other => {
                return Err(ParseError::syntax(
                    tag.name_span.clone(),
                    format!("unknown tag '{}'", other),
                ))
            }
        };
        Ok(Some(node))
    }

    fn parse_if(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let start = tag.name_span.start;
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut current = tag;

        let end = loop {
            let condition = self.expr_of(&current)?;
            let (body, end) = self.parse_until(&current, &["elif", "else", "endif"], false)?;
            branches.push((condition, Body::from(body)));
            match end.name.as_str() {
                "elif" => current = end,
                "else" => {
                    self.no_args(&end)?;
                    let (body, endif) = self.parse_until(&end, &["endif"], false)?;
                    otherwise = Some(Body::from(body));
                    break endif;
                }
                _ => break end,
            }
        };
        self.no_args(&end)?;

        Ok(Spanned::new(
            Node::If {
                branches,
                otherwise,
            },
            start..end.end_span.end,
        ))
    }

    fn parse_for(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let (src, offset) = tag.args_source(self.src);
        let header = grammar::parse_for(src, offset, self.opts)?;
        let (body, end) = self.parse_until(&tag, &["empty", "endfor"], false)?;
        let (empty, end) = if end.name == "empty" {
            let (empty, endfor) = self.parse_until(&end, &["endfor"], false)?;
            (Some(Body::from(empty)), endfor)
        } else {
            (None, end)
        };

        Ok(Spanned::new(
            Node::For {
                vars: header.vars,
                iterable: header.iterable,
                reversed: header.reversed,
                body: body.into(),
                empty,
            },
            tag.name_span.start..end.end_span.end,
        ))
    }

    fn parse_with(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        if let Some(arg) = args.positional.first() {
            return Err(ParseError::syntax(
                arg.span.clone(),
                "'with' only accepts key=value arguments",
            ));
        }
        if args.kwargs.is_empty() {
            return Err(ParseError::syntax(tag.span(), "'with' tag requires at least one binding"));
        }
        let (body, end) = self.parse_until(&tag, &["endwith"], false)?;
        Ok(Spanned::new(
            Node::With {
                bindings: args.kwargs,
                body: body.into(),
            },
            tag.name_span.start..end.end_span.end,
        ))
    }

    fn parse_component(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        let mut positional = args.positional.into_iter();
        let name = positional.next().ok_or_else(|| {
            ParseError::syntax(tag.span(), "'component' tag requires a component name")
        })?;
        let mut rest: Vec<_> = positional.collect();
        let only = rest.last().and_then(|e| e.node.as_flag()) == Some("only");
        if only {
            rest.pop();
        }

        let (fills, end) = if args.self_closing {
            (Fills::empty(), tag.end_span.end)
        } else {
            let (body, end) = self.parse_until(&tag, &["endcomponent"], true)?;
            self.no_args(&end)?;
            (component_fills(body)?, end.end_span.end)
        };

        Ok(Spanned::new(
            Node::Component(Arc::new(ComponentNode {
                name,
                args: rest,
                kwargs: args.kwargs,
                only,
                fills,
            })),
            tag.name_span.start..end,
        ))
    }

    fn parse_fill(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        if args.positional.len() != 1 {
            return Err(ParseError::syntax(
                tag.span(),
                "'fill' tag requires exactly one slot name",
            ));
        }
        let mut data_var = None;
        for kwarg in args.kwargs {
            match kwarg.name.node.as_str() {
                "data" => {
                    let var = kwarg.value.node.as_literal_str().ok_or_else(|| {
                        ParseError::syntax(
                            kwarg.value.span.clone(),
                            "'data' must be a string naming a variable",
                        )
                    })?;
                    data_var = Some(var.to_string());
                }
                other => {
                    return Err(ParseError::syntax(
                        kwarg.name.span.clone(),
                        format!("unknown 'fill' option '{}'", other),
                    ))
                }
            }
        }

        let (body, end) = if args.self_closing {
            (Vec::new(), tag.end_span.end)
        } else {
            let (body, end) = self.parse_until(&tag, &["endfill"], false)?;
            (body, end.end_span.end)
        };

        let name = args.positional.into_iter().next().ok_or_else(|| {
            ParseError::syntax(tag.span(), "'fill' tag requires exactly one slot name")
        })?;
        Ok(Spanned::new(
            Node::Fill(Arc::new(FillNode {
                name,
                data_var,
                body: body.into(),
            })),
            tag.name_span.start..end,
        ))
    }

    fn parse_slot(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        let mut positional = args.positional.into_iter();
        let name = positional
            .next()
            .ok_or_else(|| ParseError::syntax(tag.span(), "'slot' tag requires a name"))?;

        let mut is_default = false;
        let mut required = false;
        for flag in positional {
            match flag.node.as_flag() {
                Some("default") => is_default = true,
                Some("required") => required = true,
                _ => {
                    return Err(ParseError::syntax(
                        flag.span,
                        "unexpected 'slot' argument, expected 'default' or 'required'",
                    ))
                }
            }
        }

        let (body, end) = if args.self_closing {
            (Vec::new(), tag.end_span.end)
        } else {
            let (body, end) = self.parse_until(&tag, &["endslot"], false)?;
            (body, end.end_span.end)
        };

        Ok(Spanned::new(
            Node::Slot(Arc::new(SlotNode {
                name,
                is_default,
                required,
                kwargs: args.kwargs,
                body: body.into(),
            })),
            tag.name_span.start..end,
        ))
    }

    fn parse_html_attrs(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        if args.positional.len() > 2 {
            return Err(ParseError::syntax(
                args.positional[2].span.clone(),
                "'html_attrs' accepts at most two positional arguments",
            ));
        }
        let mut positional = args.positional.into_iter();
        Ok(Spanned::new(
            Node::HtmlAttrs {
                attrs: positional.next(),
                defaults: positional.next(),
                kwargs: args.kwargs,
            },
            tag.span(),
        ))
    }

    fn parse_provide(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        if args.positional.len() != 1 {
            return Err(ParseError::syntax(
                tag.span(),
                "'provide' tag requires exactly one key",
            ));
        }
        let (body, end) = self.parse_until(&tag, &["endprovide"], false)?;
        let key = args.positional.into_iter().next().ok_or_else(|| {
            ParseError::syntax(tag.span(), "'provide' tag requires exactly one key")
        })?;
        Ok(Spanned::new(
            Node::Provide {
                key,
                values: args.kwargs,
                body: body.into(),
            },
            tag.name_span.start..end.end_span.end,
        ))
    }

    fn parse_lorem(&mut self, tag: Tag) -> Result<Spanned<Node>, ParseError> {
        let args = self.args_of(&tag)?;
        let mut positional = args.positional;

        let random = positional.last().and_then(|e| e.node.as_flag()) == Some("random");
        if random {
            positional.pop();
        }
        let method = match positional.last().and_then(|e| e.node.as_flag()) {
            Some("w") => Some(LoremMethod::Words),
            Some("p") => Some(LoremMethod::Paragraphs),
            Some("b") => Some(LoremMethod::Blocks),
            _ => None,
        };
        if method.is_some() {
            positional.pop();
        }
        let count = positional
            .pop()
            .unwrap_or_else(|| Spanned::new(Expr::Literal(Value::Int(1)), tag.span()));

        if let Some(extra) = positional.first().or(args.kwargs.first().map(|k| &k.value)) {
            return Err(ParseError::syntax(
                extra.span.clone(),
                "too many arguments to 'lorem'",
            ));
        }

        Ok(Spanned::new(
            Node::Lorem {
                count,
                method: method.unwrap_or(LoremMethod::Blocks),
                random,
            },
            tag.span(),
        ))
    }

    /// Skip everything up to `{% endcomment %}` without parsing it
    fn skip_comment(&mut self, tag: Tag) -> Result<(), ParseError> {
        while let Some(item) = self.next_item()? {
            if let Item::Tag(end) = item {
                if end.name == "endcomment" {
                    return Ok(());
                }
            }
        }
        Err(ParseError::syntax(
            tag.span(),
            "unclosed 'comment' tag, expected endcomment",
        ))
    }
}

/// Split a component body into explicit fills or an implicit default fill
fn component_fills(body: Vec<Spanned<Node>>) -> Result<Fills, ParseError> {
    if !body.iter().any(|n| matches!(n.node, Node::Fill(_))) {
        return Ok(Fills::Implicit(body.into()));
    }

    let mut fills = Vec::new();
    let mut seen = HashSet::new();
    for node in body {
        match node.node {
            Node::Fill(fill) => {
                if let Some(name) = fill.name.node.as_literal_str() {
                    if !seen.insert(name.to_string()) {
                        return Err(ParseError::syntax(
                            fill.name.span.clone(),
                            format!("duplicate fill '{}' in component block", name),
                        ));
                    }
                }
                fills.push(fill);
            }
            Node::Text(ref text) if text.trim().is_empty() => {}
            _ => {
                return Err(ParseError::syntax(
                    node.span,
                    "content outside 'fill' tags is not allowed when a component uses fills",
                ))
            }
        }
    }
    Ok(Fills::Explicit(fills))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn single(src: &str) -> Node {
        let template = parse(src).unwrap();
        assert_eq!(template.nodes.len(), 1, "{:?}", template.nodes);
        template.nodes[0].node.clone()
    }

    #[test]
    fn test_if_elif_else() {
        match single("{% if a %}1{% elif b %}2{% else %}3{% endif %}") {
            Node::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(otherwise.is_some());
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_empty() {
        match single("{% for x in xs %}{{ x }}{% empty %}none{% endfor %}") {
            Node::For { vars, empty, .. } => {
                assert_eq!(vars, vec!["x".to_string()]);
                assert_eq!(empty.map(|b| b.len()), Some(1));
            }
            other => panic!("Expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_component_self_closing() {
        match single(r#"{% component "card" 1 title="x" only / %}"#) {
            Node::Component(c) => {
                assert_eq!(c.name.node.as_literal_str(), Some("card"));
                assert_eq!(c.args.len(), 1);
                assert_eq!(c.kwargs.len(), 1);
                assert!(c.only);
                assert_eq!(c.fills, Fills::empty());
            }
            other => panic!("Expected component, got {:?}", other),
        }
    }

    #[test]
    fn test_component_explicit_fills() {
        let src = r#"{% component "card" %}
            {% fill "header" %}H{% endfill %}
            {% fill "body" data="d" %}{{ d.x }}{% endfill %}
        {% endcomponent %}"#;
        match single(src) {
            Node::Component(c) => match &c.fills {
                Fills::Explicit(fills) => {
                    assert_eq!(fills.len(), 2);
                    assert_eq!(fills[1].data_var.as_deref(), Some("d"));
                }
                other => panic!("Expected explicit fills, got {:?}", other),
            },
            other => panic!("Expected component, got {:?}", other),
        }
    }

    #[test]
    fn test_component_implicit_body() {
        match single(r#"{% component "card" %}Hello {{ name }}{% endcomponent %}"#) {
            Node::Component(c) => {
                assert!(matches!(&c.fills, Fills::Implicit(body) if body.len() == 2))
            }
            other => panic!("Expected component, got {:?}", other),
        }
    }

    #[test]
    fn test_text_mixed_with_fills_is_error() {
        let err = parse(r#"{% component "c" %}oops{% fill "a" %}{% endfill %}{% endcomponent %}"#)
            .unwrap_err();
        assert!(err.message().contains("outside 'fill' tags"));
    }

    #[test]
    fn test_duplicate_fill_is_error() {
        let err = parse(
            r#"{% component "c" %}{% fill "a" %}{% endfill %}{% fill "a" %}{% endfill %}{% endcomponent %}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("duplicate fill 'a'"));
    }

    #[test]
    fn test_fill_outside_component_is_error() {
        let err = parse(r#"{% fill "a" %}x{% endfill %}"#).unwrap_err();
        assert!(err.message().contains("directly inside a component"));
    }

    #[test]
    fn test_unknown_tag_span() {
        let src = "ab {% frob x %}";
        let err = parse(src).unwrap_err();
        assert_eq!(&src[err.span().clone()], "frob");
        assert_eq!(err.message(), "unknown tag 'frob'");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = parse("{% if a %}x{% endfor %}").unwrap_err();
        assert_eq!(
            err.message(),
            "unexpected 'endfor' inside 'if' block, expected elif or else or endif"
        );
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("{% with a=1 %}x").unwrap_err();
        assert!(err.message().contains("unclosed 'with'"));
    }

    #[test]
    fn test_slot_flags() {
        match single(r#"{% slot "body" default required size=2 / %}"#) {
            Node::Slot(slot) => {
                assert!(slot.is_default);
                assert!(slot.required);
                assert_eq!(slot.kwargs.len(), 1);
                assert!(slot.body.is_empty());
            }
            other => panic!("Expected slot, got {:?}", other),
        }
    }

    #[test]
    fn test_slot_unknown_flag_is_error() {
        assert!(parse(r#"{% slot "body" sometimes %}{% endslot %}"#).is_err());
    }

    #[test]
    fn test_lorem_arguments() {
        match single("{% lorem 3 w random %}") {
            Node::Lorem {
                count,
                method,
                random,
            } => {
                assert_eq!(count.node, Expr::Literal(Value::Int(3)));
                assert_eq!(method, LoremMethod::Words);
                assert!(random);
            }
            other => panic!("Expected lorem, got {:?}", other),
        }
    }

    #[test]
    fn test_comment_block_is_skipped() {
        let template = parse("a{% comment %}{% frob %}{{ x }}{% endcomment %}b").unwrap();
        assert_eq!(template.nodes.len(), 2);
    }

    #[test]
    fn test_nested_template_argument() {
        match single(r#"{% component "card" title="{% lorem 2 w %}" / %}"#) {
            Node::Component(c) => match &c.kwargs[0].value.node {
                Expr::Template(t) => assert!(matches!(t.nodes[0].node, Node::Lorem { .. })),
                other => panic!("Expected nested template, got {:?}", other),
            },
            other => panic!("Expected component, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_variable_tag_is_error() {
        assert!(parse("{{ }}").is_err());
    }
}
