//! Template-only components declared in TOML
//!
//! ```toml
//! [[component]]
//! name = "card"
//! template = "<div class=\"card\">{{ title }}</div>"
//! css = ".card { padding: 1em; }"
//! public = true
//!
//! [component.kwargs.title]
//! type = "str"
//! required = true
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use super::schema::{Field, FieldKind, Schema};
use super::{Media, SimpleComponent};
use crate::loader::TemplateSource;
use crate::settings::ConfigError;
use crate::value::Value;

/// The `[[component]]` tables of a configuration file
#[derive(Debug, Default, Deserialize)]
pub struct ComponentManifest {
    #[serde(default, rename = "component")]
    pub components: Vec<ManifestEntry>,
}

/// One declared component
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Inline template text
    pub template: Option<String>,
    /// Template path resolved against the template directories
    pub template_file: Option<PathBuf>,
    pub js: Option<String>,
    pub css: Option<String>,
    #[serde(default)]
    pub js_urls: Vec<String>,
    #[serde(default)]
    pub css_urls: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub kwargs: IndexMap<String, FieldSpec>,
    /// Reject keywords not listed under `kwargs`
    #[serde(default)]
    pub strict: bool,
}

/// Declared type and default of one keyword argument
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    pub default: Option<toml::Value>,
}

impl ComponentManifest {
    /// Parse the manifest from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Build the declared components, keyed by registry name
    pub fn components(&self) -> Result<Vec<(String, SimpleComponent)>, ConfigError> {
        self.components
            .iter()
            .map(|entry| Ok((entry.name.clone(), entry.to_component()?)))
            .collect()
    }
}

impl ManifestEntry {
    pub fn to_component(&self) -> Result<SimpleComponent, ConfigError> {
        let source = match (&self.template, &self.template_file) {
            (Some(text), None) => TemplateSource::inline(text.clone()),
            (None, Some(path)) => TemplateSource::file(path.clone()),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "template",
                    value: format!(
                        "component '{}' needs exactly one of template or template_file",
                        self.name
                    ),
                })
            }
        };

        let mut schema = Schema::new();
        for (name, spec) in &self.kwargs {
            let mut field = Field::new(name.clone(), spec.kind);
            field.required = spec.required;
            field.default = spec.default.clone().map(Value::from);
            schema = schema.with_field(field);
        }
        if self.strict {
            schema = schema.strict();
        }

        let mut component = SimpleComponent::from_source(self.name.clone(), source)
            .with_schema(schema)
            .with_media(Media {
                js: self.js_urls.clone(),
                css: self.css_urls.clone(),
            });
        if let Some(js) = &self.js {
            component = component.with_js(js.clone());
        }
        if let Some(css) = &self.css {
            component = component.with_css(css.clone());
        }
        if self.public {
            component = component.public();
        }
        Ok(component)
    }
}

/// Parse `[[component]]` tables from a TOML string
pub fn load_manifest(content: &str) -> Result<Vec<(String, SimpleComponent)>, ConfigError> {
    ComponentManifest::from_str(content)?.components()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentClass};

    const MANIFEST: &str = r#"
[settings]
context_behavior = "isolated"

[[component]]
name = "card"
template = "<div>{{ title }}</div>"
css = ".card {}"
css_urls = ["/static/card.css"]
public = true

[component.kwargs.title]
type = "str"
required = true

[component.kwargs.count]
type = "int"
default = 3

[[component]]
name = "page"
template_file = "page.html"
"#;

    #[test]
    fn test_manifest_components() {
        let components = load_manifest(MANIFEST).unwrap();
        assert_eq!(components.len(), 2);

        let (name, card) = &components[0];
        assert_eq!(name, "card");
        assert_eq!(card.css(), Some(".card {}"));
        assert!(card.is_public());
        assert_eq!(card.media().css, vec!["/static/card.css".to_string()]);

        let schema = card.schema();
        let title = schema.field("title").unwrap();
        assert!(title.required);
        assert_eq!(title.kind, FieldKind::Str);
        assert_eq!(schema.field("count").unwrap().default, Some(Value::Int(3)));

        let (_, page) = &components[1];
        assert_eq!(page.template(), TemplateSource::file("page.html"));
        assert!(ComponentClass::new(page.clone()).id().starts_with("page_"));
    }

    #[test]
    fn test_template_and_file_conflict() {
        let err = load_manifest(
            r#"
[[component]]
name = "bad"
template = "x"
template_file = "x.html"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "template", .. }));
    }

    #[test]
    fn test_no_components() {
        assert!(load_manifest("[settings]\n").unwrap().is_empty());
    }
}
