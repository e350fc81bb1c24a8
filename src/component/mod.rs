//! Component definitions
//!
//! A component bundles a template with optional inline CSS and JS, media
//! URLs, a keyword-argument schema and lifecycle hooks. Implement
//! [`Component`] for a type and wrap it in a [`ComponentClass`] to register
//! it, or use [`SimpleComponent`] for template-only components.
//!
//! ```rust
//! use trellis::{Engine, RenderArgs, SimpleComponent};
//!
//! let engine = Engine::default();
//! engine
//!     .register_component("greeting", SimpleComponent::new("greeting", "Hello {{ name }}!"))
//!     .unwrap();
//! let html = engine
//!     .render("greeting", RenderArgs::new().with_kwarg("name", "World"))
//!     .unwrap();
//! assert!(html.starts_with("Hello World!"));
//! ```

pub mod manifest;
pub mod registry;
pub mod schema;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::error::BoxError;
use crate::loader::TemplateSource;
use crate::renderer::context::Context;
use crate::value::{Map, Value};
use crate::RenderError;

pub use manifest::{load_manifest, ComponentManifest, ManifestEntry};
pub use registry::{ComponentRegistry, RegistryError};
pub use schema::{Field, FieldKind, Schema, ValidationError};

/// External script and stylesheet URLs of a component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Media {
    pub js: Vec<String>,
    pub css: Vec<String>,
}

/// Behaviour of a component
///
/// Only [`Component::template`] is required. Hooks run once per rendered
/// instance; `on_render_before` and `on_render_after` only observe.
pub trait Component: Send + Sync + 'static {
    /// Template rendered for each instance
    fn template(&self) -> TemplateSource;

    /// Name used for the class id; defaults to the Rust type name
    fn class_name(&self) -> Option<&str> {
        None
    }

    /// Inline script collected once per page
    fn js(&self) -> Option<&str> {
        None
    }

    /// Inline stylesheet collected once per page
    fn css(&self) -> Option<&str> {
        None
    }

    fn media(&self) -> Media {
        Media::default()
    }

    fn schema(&self) -> Schema {
        Schema::default()
    }

    /// Whether the component is served at its public URL
    fn is_public(&self) -> bool {
        false
    }

    /// Variables exposed to the template; defaults to the validated kwargs
    fn get_template_data(&self, input: &RenderInput) -> Result<Map, BoxError> {
        Ok(input.kwargs.clone())
    }

    fn on_render_before(&self, _input: &RenderInput) {}

    fn on_render_after(
        &self,
        _input: &RenderInput,
        _output: Option<&str>,
        _error: Option<&RenderError>,
    ) {
    }
}

/// Distinguishes classes built from equal definitions
static NEXT_CLASS: AtomicU64 = AtomicU64::new(0);

/// A registered component definition
///
/// Every class gets its own id, even when two classes are built from the same
/// component value.
pub struct ComponentClass {
    id: String,
    name: String,
    template: TemplateSource,
    schema: Schema,
    media: Media,
    public: bool,
    component: Box<dyn Component>,
}

impl ComponentClass {
    pub fn new<C: Component>(component: C) -> Self {
        let template = component.template();
        let type_name = std::any::type_name::<C>();
        let name = component
            .class_name()
            .map(str::to_string)
            .unwrap_or_else(|| short_type_name(type_name).to_string());

        let template_key = match &template {
            TemplateSource::Inline(text) => text.to_string(),
            TemplateSource::File(path) => path.display().to_string(),
        };
        let serial = NEXT_CLASS.fetch_add(1, Ordering::Relaxed);
        let identity = format!("{}::{}::{}::{}", type_name, name, template_key, serial);
        let id = class_id(&name, &identity);

        Self {
            id,
            name,
            schema: component.schema(),
            media: component.media(),
            public: component.is_public(),
            template,
            component: Box::new(component),
        }
    }

    /// Id used in dependency markers and public URLs
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &TemplateSource {
        &self.template
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn media(&self) -> &Media {
        &self.media
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn js(&self) -> Option<&str> {
        self.component.js()
    }

    pub fn css(&self) -> Option<&str> {
        self.component.css()
    }

    pub fn component(&self) -> &dyn Component {
        self.component.as_ref()
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("id", &self.id)
            .field("template", &self.template)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// `<Name>_<6 hex>` from a SHA-256 of the class identity
fn class_id(name: &str, identity: &str) -> String {
    let short: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let digest = Sha256::digest(identity.as_bytes());
    let hash: String = digest[..3].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", short, hash)
}

/// Names of the fills passed to a component instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    names: Vec<String>,
}

impl Slots {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Suffixes of fill names in `group`: `grouped("field")` on
    /// `field:a`, `label:a`, `field:b` yields `a`, `b`
    pub fn grouped(&self, group: &str) -> Vec<&str> {
        self.names
            .iter()
            .filter_map(|name| {
                let (prefix, rest) = name.split_once(':')?;
                (prefix == group).then_some(rest)
            })
            .collect()
    }
}

/// Input of one component instance, passed to its hooks
#[derive(Debug, Clone)]
pub struct RenderInput {
    /// Name the component was invoked by
    pub name: String,
    pub args: Vec<Value>,
    /// Keyword arguments after schema validation
    pub kwargs: Map,
    pub slots: Slots,
    context: Context,
}

impl RenderInput {
    pub(crate) fn new(
        name: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map,
        slots: Slots,
        context: Context,
    ) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs,
            slots,
            context,
        }
    }

    /// Context at the component tag
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Values provided by an enclosing `{% provide %}`
    pub fn inject(&self, key: &str) -> Option<&Map> {
        self.context.inject(key)
    }

    /// Deserialize the keyword arguments into a typed struct
    pub fn kwargs_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Map(self.kwargs.clone()).to_json())
    }
}

/// Template-only component built at runtime
#[derive(Debug, Clone)]
pub struct SimpleComponent {
    name: String,
    template: TemplateSource,
    js: Option<String>,
    css: Option<String>,
    media: Media,
    schema: Schema,
    public: bool,
}

impl SimpleComponent {
    /// Component with an inline template
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::from_source(name, TemplateSource::inline(template))
    }

    pub fn from_source(name: impl Into<String>, template: TemplateSource) -> Self {
        Self {
            name: name.into(),
            template,
            js: None,
            css: None,
            media: Media::default(),
            schema: Schema::default(),
            public: false,
        }
    }

    pub fn with_js(mut self, js: impl Into<String>) -> Self {
        self.js = Some(js.into());
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = media;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }
}

impl Component for SimpleComponent {
    fn template(&self) -> TemplateSource {
        self.template.clone()
    }

    fn class_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn js(&self) -> Option<&str> {
        self.js.as_deref()
    }

    fn css(&self) -> Option<&str> {
        self.css.as_deref()
    }

    fn media(&self) -> Media {
        self.media.clone()
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn is_public(&self) -> bool {
        self.public
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Card;

    impl Component for Card {
        fn template(&self) -> TemplateSource {
            TemplateSource::inline("<div>{{ title }}</div>")
        }
    }

    #[test]
    fn test_class_id_shape() {
        let a = ComponentClass::new(Card);
        let b = ComponentClass::new(Card);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "Card");
        let (name, hash) = a.id().rsplit_once('_').unwrap();
        assert_eq!(name, "Card");
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_simple_components_differ_by_name_and_template() {
        let a = ComponentClass::new(SimpleComponent::new("my-card", "x"));
        let b = ComponentClass::new(SimpleComponent::new("my-card", "y"));
        let c = ComponentClass::new(SimpleComponent::new("other", "x"));
        assert!(a.id().starts_with("my_card_"));
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_classes_differing_only_in_css_have_distinct_ids() {
        let a = ComponentClass::new(SimpleComponent::new("btn", "<b>x</b>").with_css(".a{}"));
        let b = ComponentClass::new(SimpleComponent::new("btn", "<b>x</b>").with_css(".b{}"));
        assert_ne!(a.id(), b.id());
        assert_eq!(b.css(), Some(".b{}"));
    }

    #[test]
    fn test_grouped_slot_names() {
        let slots = Slots::new(vec![
            "field:a".to_string(),
            "label:a".to_string(),
            "default".to_string(),
            "field:b".to_string(),
        ]);
        assert_eq!(slots.grouped("field"), vec!["a", "b"]);
        assert!(slots.contains("default"));
    }

    #[test]
    fn test_kwargs_as_struct() {
        #[derive(serde::Deserialize)]
        struct Props {
            title: String,
            count: i64,
        }
        let mut kwargs = Map::new();
        kwargs.insert("title".to_string(), "Hi".into());
        kwargs.insert("count".to_string(), Value::Int(3));
        let input = RenderInput::new("card", Vec::new(), kwargs, Slots::default(), Context::new());
        let props: Props = input.kwargs_as().unwrap();
        assert_eq!(props.title, "Hi");
        assert_eq!(props.count, 3);
    }
}
