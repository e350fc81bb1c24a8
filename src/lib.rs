//! Trellis - reusable server-rendered UI components
//!
//! This library provides a template parser, a component registry, and a
//! render engine that fills slots, merges HTML attributes and gathers each
//! rendered component's JS and CSS into the final document.
//!
//! # Example
//!
//! ```rust
//! use trellis::{Engine, SimpleComponent};
//!
//! let engine = Engine::default();
//! engine
//!     .register_component(
//!         "badge",
//!         SimpleComponent::new("badge", r#"<span {% html_attrs attrs class="badge" %}>{{ label }}</span>"#),
//!     )
//!     .unwrap();
//!
//! let html = engine
//!     .render_str(
//!         r#"{% component "badge" label="new" / %}"#,
//!         Default::default(),
//!     )
//!     .unwrap();
//! assert!(html.contains("new</span>"));
//! ```

pub mod attrs;
pub mod cache;
pub mod component;
pub mod deps;
pub mod error;
pub mod extension;
pub mod loader;
pub mod parser;
pub mod renderer;
pub mod settings;
pub mod value;
pub mod views;

use std::sync::Arc;

use thiserror::Error;

pub use attrs::{merge_attrs, render_attrs, AttrValue};
pub use component::{
    Component, ComponentClass, ComponentManifest, ComponentRegistry, Field, FieldKind, Media,
    RegistryError, RenderInput, Schema, SimpleComponent, Slots, ValidationError,
};
pub use deps::{DependencyCollector, DepsStrategy, MarkerFormat};
pub use error::{BoxError, ParseError};
pub use extension::Extension;
pub use loader::{TemplateError, TemplateSource};
pub use parser::{parse, parse_with, tokenize, tokenize_baseline, ParseOptions, Template};
pub use renderer::{
    ComponentRef, Context, Engine, RenderArgs, RenderOutcome, SlotContent, SlotError,
};
pub use settings::{ConfigError, ContextBehavior, Settings};
pub use value::{Map, Value};
pub use views::{Request, Response};

/// Errors that can occur while rendering
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to parse
    #[error("syntax error in {template}: {error}")]
    Syntax {
        template: String,
        text: Arc<str>,
        #[source]
        error: ParseError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("component '{name}' is not registered")]
    UnknownComponent { name: String },

    /// A component hook or slot closure returned an error
    #[error("component '{component}' failed: {source}")]
    Component {
        component: String,
        #[source]
        source: BoxError,
    },

    /// Component names must evaluate to strings
    #[error("component name must be a string, got {found}")]
    InvalidName { found: String },

    #[error("invalid argument to '{tag}': {message}")]
    InvalidArgument { tag: &'static str, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RenderError {
    /// Render the error for a terminal, with source context for syntax errors
    pub fn report(&self) -> String {
        match self {
            RenderError::Syntax {
                template,
                text,
                error,
            } => error.format(text, template),
            other => other.to_string(),
        }
    }
}
