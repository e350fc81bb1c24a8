//! Template tokenizer and parser

pub mod args;
pub mod ast;
pub mod grammar;
pub mod lexer;
pub mod tree;

pub use ast::*;
pub use grammar::{ForHeader, TagArgs};
pub use lexer::{tokenize, tokenize_baseline};

use crate::error::ParseError;

/// Options that change how source text is tokenized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Allow tags to span several lines
    pub multiline_tags: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            multiline_tags: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_multiline_tags(mut self, multiline: bool) -> Self {
        self.multiline_tags = multiline;
        self
    }
}

/// Parse template source with default options
pub fn parse(src: &str) -> Result<Template, ParseError> {
    parse_with(src, ParseOptions::default())
}

/// Parse template source
pub fn parse_with(src: &str, opts: ParseOptions) -> Result<Template, ParseError> {
    let tokens = lexer::tokenize(src, opts.multiline_tags)?;
    tree::build(src, tokens, opts)
}
