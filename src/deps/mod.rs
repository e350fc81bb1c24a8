//! Dependency collection: turn rendered markers into script and style tags
//!
//! Rendering leaves one marker per component instance in the output. The
//! collector deduplicates them by class id, resolves each class's inline
//! CSS/JS and media URLs through the registry and places the resulting tags
//! according to a [`DepsStrategy`].

pub mod marker;

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use indexmap::IndexSet;
use memchr::memmem;
use serde::Deserialize;

use crate::component::ComponentRegistry;
use crate::parser::DepsKind;
use crate::settings::ConfigError;
use crate::value::escape_html;

pub use marker::{Marker, MarkerFormat, MarkerKind};

/// Where collected dependencies are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepsStrategy {
    /// Placeholders, else before `</head>` and `</body>`; error when neither exists
    #[default]
    Document,
    /// Like `Document` but appends when there is no insertion point
    Simple,
    /// Append a JSON payload for a client-side loader
    Fragment,
    /// Insert all tags at the start
    Prepend,
    /// Insert all tags at the end
    Append,
    /// Strip markers without emitting anything
    Ignore,
    /// Leave markers in place
    Raw,
}

impl FromStr for DepsStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let strategy = match s {
            "document" => DepsStrategy::Document,
            "simple" => DepsStrategy::Simple,
            "fragment" => DepsStrategy::Fragment,
            "prepend" => DepsStrategy::Prepend,
            "append" => DepsStrategy::Append,
            "ignore" => DepsStrategy::Ignore,
            "raw" => DepsStrategy::Raw,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "deps_strategy",
                    value: other.to_string(),
                })
            }
        };
        Ok(strategy)
    }
}

impl fmt::Display for DepsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DepsStrategy::Document => "document",
            DepsStrategy::Simple => "simple",
            DepsStrategy::Fragment => "fragment",
            DepsStrategy::Prepend => "prepend",
            DepsStrategy::Append => "append",
            DepsStrategy::Ignore => "ignore",
            DepsStrategy::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Tags for the classes seen in one document
#[derive(Debug, Default, PartialEq)]
struct Tags {
    css: Vec<String>,
    js: Vec<String>,
}

impl Tags {
    fn is_empty(&self) -> bool {
        self.css.is_empty() && self.js.is_empty()
    }

    fn css_block(&self) -> String {
        self.css.concat()
    }

    fn js_block(&self) -> String {
        self.js.concat()
    }

    fn fragment_payload(&self) -> String {
        let encode = |tags: &[String]| -> Vec<String> {
            tags.iter()
                .map(|tag| base64::engine::general_purpose::STANDARD.encode(tag))
                .collect()
        };
        let payload = serde_json::json!({
            "css": encode(&self.css),
            "js": encode(&self.js),
        });
        format!(
            "<script type=\"application/json\" data-trellis-deps>{}</script>",
            payload
        )
    }
}

/// Collects dependencies for markers written with one [`MarkerFormat`]
pub struct DependencyCollector<'a> {
    registry: &'a ComponentRegistry,
    markers: &'a MarkerFormat,
}

impl<'a> DependencyCollector<'a> {
    pub fn new(registry: &'a ComponentRegistry, markers: &'a MarkerFormat) -> Self {
        Self { registry, markers }
    }

    /// Replace markers in `html` with the dependency tags they stand for
    ///
    /// Input without markers or placeholders is returned unchanged, so
    /// collecting an already collected document is a no-op.
    pub fn collect(&self, html: &str, strategy: DepsStrategy) -> Result<String, ConfigError> {
        if strategy == DepsStrategy::Raw {
            return Ok(html.to_string());
        }
        let found = self.markers.scan(html);
        if found.is_empty() {
            return Ok(html.to_string());
        }

        let mut out = String::with_capacity(html.len());
        let mut class_ids: IndexSet<&str> = IndexSet::new();
        let mut css_at = None;
        let mut js_at = None;
        let mut last = 0;
        for marker in &found {
            out.push_str(&html[last..marker.range.start]);
            last = marker.range.end;
            match marker.kind {
                MarkerKind::Rendered(id) => {
                    class_ids.insert(id);
                }
                MarkerKind::Placeholder(DepsKind::Css) => {
                    css_at.get_or_insert(out.len());
                }
                MarkerKind::Placeholder(DepsKind::Js) => {
                    js_at.get_or_insert(out.len());
                }
            }
        }
        out.push_str(&html[last..]);

        if strategy == DepsStrategy::Ignore {
            return Ok(out);
        }
        let tags = self.resolve(&class_ids);
        tracing::debug!(
            classes = class_ids.len(),
            css = tags.css.len(),
            js = tags.js.len(),
            %strategy,
            "collected component dependencies"
        );

        match strategy {
            DepsStrategy::Document | DepsStrategy::Simple => {
                let relaxed = strategy == DepsStrategy::Simple;
                let css_block = tags.css_block();
                let js_block = tags.js_block();
                let css_at = match css_at.or_else(|| find_ascii_ci(&out, "</head>")) {
                    Some(pos) => Some(pos),
                    None if css_block.is_empty() => None,
                    None if relaxed => Some(out.len()),
                    None => {
                        return Err(ConfigError::MissingInsertionPoint {
                            kind: "css",
                            tag: "head",
                        })
                    }
                };
                let js_at = match js_at.or_else(|| rfind_ascii_ci(&out, "</body>")) {
                    Some(pos) => Some(pos),
                    None if js_block.is_empty() => None,
                    None if relaxed => Some(out.len()),
                    None => {
                        return Err(ConfigError::MissingInsertionPoint {
                            kind: "js",
                            tag: "body",
                        })
                    }
                };
                Ok(insert_blocks(out, [(css_at, css_block), (js_at, js_block)]))
            }
            DepsStrategy::Fragment => {
                if !tags.is_empty() {
                    out.push_str(&tags.fragment_payload());
                }
                Ok(out)
            }
            DepsStrategy::Prepend => Ok(format!("{}{}{}", tags.css_block(), tags.js_block(), out)),
            DepsStrategy::Append => Ok(format!("{}{}{}", out, tags.css_block(), tags.js_block())),
            DepsStrategy::Ignore | DepsStrategy::Raw => Ok(out),
        }
    }

    /// Build tags for `class_ids`; URLs are deduplicated across classes
    fn resolve(&self, class_ids: &IndexSet<&str>) -> Tags {
        let classes: Vec<_> = class_ids
            .iter()
            .filter_map(|id| {
                let class = self.registry.get_by_id(id);
                if class.is_none() {
                    tracing::warn!(class_id = %id, "dependency marker names an unknown component class");
                }
                class
            })
            .collect();

        let mut css_urls: IndexSet<&str> = IndexSet::new();
        let mut js_urls: IndexSet<&str> = IndexSet::new();
        let mut inline_css = Vec::new();
        let mut inline_js = Vec::new();

        for class in &classes {
            css_urls.extend(class.media().css.iter().map(String::as_str));
            js_urls.extend(class.media().js.iter().map(String::as_str));
            if let Some(css) = class.css() {
                inline_css.push(format!(
                    "<style data-trellis-class=\"{}\">{}</style>",
                    class.id(),
                    css
                ));
            }
            if let Some(js) = class.js() {
                inline_js.push(format!(
                    "<script data-trellis-class=\"{}\">{}</script>",
                    class.id(),
                    js
                ));
            }
        }

        let mut tags = Tags::default();
        tags.css.extend(css_urls.iter().map(|url| {
            format!(
                "<link href=\"{}\" media=\"all\" rel=\"stylesheet\">",
                escape_html(url)
            )
        }));
        tags.css.extend(inline_css);
        tags.js.extend(
            js_urls
                .iter()
                .map(|url| format!("<script src=\"{}\"></script>", escape_html(url))),
        );
        tags.js.extend(inline_js);
        tags
    }
}

/// Insert blocks at byte positions, keeping the given order for equal positions
fn insert_blocks(mut out: String, blocks: [(Option<usize>, String); 2]) -> String {
    let mut blocks: Vec<(usize, String)> = blocks
        .into_iter()
        .filter_map(|(pos, block)| pos.map(|p| (p, block)))
        .filter(|(_, block)| !block.is_empty())
        .collect();
    blocks.sort_by_key(|(pos, _)| *pos);
    for (pos, block) in blocks.into_iter().rev() {
        out.insert_str(pos, &block);
    }
    out
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    memmem::find(haystack.to_ascii_lowercase().as_bytes(), needle.as_bytes())
}

fn rfind_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    memmem::rfind(haystack.to_ascii_lowercase().as_bytes(), needle.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentClass, Media, SimpleComponent};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Fixture {
        registry: ComponentRegistry,
        markers: MarkerFormat,
        card: String,
        icon: String,
    }

    fn fixture() -> Fixture {
        let mut registry = ComponentRegistry::new();
        let card = Arc::new(ComponentClass::new(
            SimpleComponent::new("card", "x")
                .with_css(".card{}")
                .with_js("card()")
                .with_media(Media {
                    js: vec![],
                    css: vec!["/shared.css".to_string()],
                }),
        ));
        let icon = Arc::new(ComponentClass::new(
            SimpleComponent::new("icon", "y").with_media(Media {
                js: vec![],
                css: vec!["/shared.css".to_string(), "/icon.css".to_string()],
            }),
        ));
        let (card_id, icon_id) = (card.id().to_string(), icon.id().to_string());
        registry.register("card", card).unwrap();
        registry.register("icon", icon).unwrap();
        Fixture {
            registry,
            markers: MarkerFormat::new("n0nce"),
            card: card_id,
            icon: icon_id,
        }
    }

    impl Fixture {
        fn collect(&self, html: &str, strategy: DepsStrategy) -> Result<String, ConfigError> {
            DependencyCollector::new(&self.registry, &self.markers).collect(html, strategy)
        }
    }

    #[test]
    fn test_document_strategy_uses_head_and_body() {
        let f = fixture();
        let html = format!(
            "<html><head></head><BODY>{}{}{}</BODY></html>",
            f.markers.rendered(&f.card),
            f.markers.rendered(&f.icon),
            f.markers.rendered(&f.card),
        );
        let out = f.collect(&html, DepsStrategy::Document).unwrap();
        let css = format!(
            "<link href=\"/shared.css\" media=\"all\" rel=\"stylesheet\"><link href=\"/icon.css\" media=\"all\" rel=\"stylesheet\"><style data-trellis-class=\"{}\">.card{{}}</style>",
            f.card
        );
        let js = format!("<script data-trellis-class=\"{}\">card()</script>", f.card);
        assert_eq!(
            out,
            format!("<html><head>{}</head><BODY>{}</BODY></html>", css, js)
        );
    }

    #[test]
    fn test_placeholders_take_precedence() {
        let f = fixture();
        let html = format!(
            "<head></head>{}<main>{}</main>{}{}<body></body>",
            f.markers.placeholder(DepsKind::Js),
            f.markers.rendered(&f.card),
            f.markers.placeholder(DepsKind::Css),
            f.markers.placeholder(DepsKind::Css),
        );
        let out = f.collect(&html, DepsStrategy::Document).unwrap();
        let js = format!("<script data-trellis-class=\"{}\">card()</script>", f.card);
        assert!(out.starts_with(&format!("<head></head>{}<main></main><link", js)));
        assert!(out.ends_with("</style><body></body>"));
    }

    #[test]
    fn test_document_without_insertion_point_is_error() {
        let f = fixture();
        let html = format!("<div>{}</div>", f.markers.rendered(&f.card));
        let err = f.collect(&html, DepsStrategy::Document).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingInsertionPoint { kind: "css", tag: "head" }
        ));
        let out = f.collect(&html, DepsStrategy::Simple).unwrap();
        assert!(out.starts_with("<div></div><link"));
        assert!(out.ends_with("card()</script>"));
    }

    #[test]
    fn test_no_deps_needs_no_insertion_point() {
        let mut f = fixture();
        let plain = Arc::new(ComponentClass::new(SimpleComponent::new("plain", "z")));
        let id = plain.id().to_string();
        f.registry.register("plain", plain).unwrap();
        let html = format!("<p>{}</p>", f.markers.rendered(&id));
        assert_eq!(f.collect(&html, DepsStrategy::Document).unwrap(), "<p></p>");
    }

    #[test]
    fn test_collection_is_idempotent() {
        let f = fixture();
        let html = format!("<head></head><body>{}</body>", f.markers.rendered(&f.card));
        let once = f.collect(&html, DepsStrategy::Document).unwrap();
        let twice = f.collect(&once, DepsStrategy::Document).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_raw_ignore_prepend_append() {
        let f = fixture();
        let html = format!("<p>{}</p>", f.markers.rendered(&f.icon));
        assert_eq!(f.collect(&html, DepsStrategy::Raw).unwrap(), html);
        assert_eq!(f.collect(&html, DepsStrategy::Ignore).unwrap(), "<p></p>");

        let links = "<link href=\"/shared.css\" media=\"all\" rel=\"stylesheet\"><link href=\"/icon.css\" media=\"all\" rel=\"stylesheet\">";
        assert_eq!(
            f.collect(&html, DepsStrategy::Prepend).unwrap(),
            format!("{}<p></p>", links)
        );
        assert_eq!(
            f.collect(&html, DepsStrategy::Append).unwrap(),
            format!("<p></p>{}", links)
        );
    }

    #[test]
    fn test_fragment_payload_is_base64() {
        let f = fixture();
        let html = format!("<p>{}</p>", f.markers.rendered(&f.card));
        let out = f.collect(&html, DepsStrategy::Fragment).unwrap();
        let json = out
            .strip_prefix("<p></p><script type=\"application/json\" data-trellis-deps>")
            .and_then(|rest| rest.strip_suffix("</script>"))
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(json).unwrap();
        let first_js = payload["js"][0].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(first_js)
            .unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            format!("<script data-trellis-class=\"{}\">card()</script>", f.card)
        );
    }

    #[test]
    fn test_unknown_class_is_skipped() {
        let f = fixture();
        let html = format!("<p>{}</p>", f.markers.rendered("Gone_abcdef"));
        assert_eq!(f.collect(&html, DepsStrategy::Append).unwrap(), "<p></p>");
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("fragment".parse::<DepsStrategy>().unwrap(), DepsStrategy::Fragment);
        assert_eq!(DepsStrategy::Prepend.to_string(), "prepend");
        assert!("everywhere".parse::<DepsStrategy>().is_err());
    }
}
