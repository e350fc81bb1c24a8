//! Token and syntax tree types for trellis templates

use std::sync::Arc;

use crate::value::Value;

pub use crate::error::Span;

/// Node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Top-level template token produced by the tokenizers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text between tags
    Text(String),
    /// Trimmed contents of a `{{ ... }}` tag
    VarRef(String),
    /// Name of a `{% ... %}` tag
    TagStart(String),
    /// One whitespace-separated argument of the preceding tag
    TagArg(String),
    /// Closing `%}` of a block tag
    TagEnd,
}

/// A compiled template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Body,
}

impl Template {
    pub fn new(nodes: Vec<Spanned<Node>>) -> Self {
        Self {
            nodes: nodes.into(),
        }
    }

    /// True when the template has no renderable content
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Shared, immutable list of nodes
pub type Body = Arc<[Spanned<Node>]>;

/// Template tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw text
    Text(String),
    /// `{{ expr }}`
    Output(Expr),
    /// `{% if %}` / `{% elif %}` / `{% else %}`
    If {
        branches: Vec<(Spanned<Expr>, Body)>,
        otherwise: Option<Body>,
    },
    /// `{% for a, b in items reversed %}` with optional `{% empty %}`
    For {
        vars: Vec<String>,
        iterable: Spanned<Expr>,
        reversed: bool,
        body: Body,
        empty: Option<Body>,
    },
    /// `{% with key=value %}`
    With { bindings: Vec<Kwarg>, body: Body },
    /// `{% component "name" ... %}`
    Component(Arc<ComponentNode>),
    /// `{% fill "name" %}`; only valid directly inside a component body
    Fill(Arc<FillNode>),
    /// `{% slot "name" default required key=value %}`
    Slot(Arc<SlotNode>),
    /// `{% html_attrs attrs defaults key=value %}`
    HtmlAttrs {
        attrs: Option<Spanned<Expr>>,
        defaults: Option<Spanned<Expr>>,
        kwargs: Vec<Kwarg>,
    },
    /// `{% provide "key" name=value %}`
    Provide {
        key: Spanned<Expr>,
        values: Vec<Kwarg>,
        body: Body,
    },
    /// `{% lorem 3 w random %}`
    Lorem {
        count: Spanned<Expr>,
        method: LoremMethod,
        random: bool,
    },
    /// `{% component_css_dependencies %}` / `{% component_js_dependencies %}`
    Dependencies(DepsKind),
}

/// Keyword argument `name=expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Kwarg {
    pub name: Spanned<String>,
    pub value: Spanned<Expr>,
}

/// Parsed `{% component %}` tag
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub name: Spanned<Expr>,
    pub args: Vec<Spanned<Expr>>,
    pub kwargs: Vec<Kwarg>,
    /// `only` flag: render with an isolated context regardless of settings
    pub only: bool,
    pub fills: Fills,
}

/// Content passed between `{% component %}` and `{% endcomponent %}`
#[derive(Debug, Clone, PartialEq)]
pub enum Fills {
    /// Body without fill tags; fills the default slot
    Implicit(Body),
    /// One or more `{% fill %}` tags
    Explicit(Vec<Arc<FillNode>>),
}

impl Fills {
    pub fn empty() -> Self {
        Fills::Implicit(Arc::from(Vec::new()))
    }
}

/// Parsed `{% fill %}` tag
#[derive(Debug, Clone, PartialEq)]
pub struct FillNode {
    pub name: Spanned<Expr>,
    /// Variable that receives the slot's keyword arguments
    pub data_var: Option<String>,
    pub body: Body,
}

/// Parsed `{% slot %}` tag
#[derive(Debug, Clone, PartialEq)]
pub struct SlotNode {
    pub name: Spanned<Expr>,
    pub is_default: bool,
    pub required: bool,
    pub kwargs: Vec<Kwarg>,
    pub body: Body,
}

/// Output style of `{% lorem %}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoremMethod {
    /// Words
    Words,
    /// HTML paragraphs wrapped in `<p>`
    Paragraphs,
    /// Plain-text paragraphs separated by blank lines
    Blocks,
}

/// Which dependency placeholder a tag emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepsKind {
    Css,
    Js,
}

/// Expression in variable tags and tag arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Variable lookup with attribute/index access: `a.b.0`
    Path {
        root: String,
        segments: Vec<PathSegment>,
    },
    /// String literal containing template syntax
    Template(Arc<Template>),
    Filter {
        input: Box<Expr>,
        filter: Filter,
        arg: Option<Box<Expr>>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Bare identifier without attribute access, e.g. a flag like `required`
    pub fn as_flag(&self) -> Option<&str> {
        match self {
            Expr::Path { root, segments } if segments.is_empty() => Some(root),
            _ => None,
        }
    }

    /// String literal value
    pub fn as_literal_str(&self) -> Option<&str> {
        match self {
            Expr::Literal(Value::Str(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// Built-in filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Default,
    DefaultIfNone,
    Upper,
    Lower,
    Title,
    Capfirst,
    Length,
    Add,
    Join,
    Safe,
    Escape,
    First,
    Last,
    Slugify,
}

impl Filter {
    /// Look up a filter by its template name
    pub fn from_name(name: &str) -> Option<Self> {
        let filter = match name {
            "default" => Filter::Default,
            "default_if_none" => Filter::DefaultIfNone,
            "upper" => Filter::Upper,
            "lower" => Filter::Lower,
            "title" => Filter::Title,
            "capfirst" => Filter::Capfirst,
            "length" => Filter::Length,
            "add" => Filter::Add,
            "join" => Filter::Join,
            "safe" => Filter::Safe,
            "escape" => Filter::Escape,
            "first" => Filter::First,
            "last" => Filter::Last,
            "slugify" => Filter::Slugify,
            _ => return None,
        };
        Some(filter)
    }
}
