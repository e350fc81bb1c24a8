//! HTML attribute merging for `{% html_attrs %}`
//!
//! Layers are applied in order. Ordinary keys are overwritten by later
//! layers, `class` values accumulate and `style` declarations merge per
//! property. A `None` value removes whatever the key held so far.

use indexmap::IndexMap;

use crate::value::{escape_html, Map, Value};

/// A merged attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Rendered as `name="value"`
    Text { value: String, safe: bool },
    /// `true` renders the bare name, `false` omits the attribute
    Flag(bool),
}

impl AttrValue {
    fn text(value: impl Into<String>) -> Self {
        AttrValue::Text {
            value: value.into(),
            safe: false,
        }
    }

    fn from_value(key: &str, value: &Value) -> Option<Self> {
        let attr = match value {
            Value::None => return None,
            Value::Bool(b) => AttrValue::Flag(*b),
            Value::Safe(s) => AttrValue::Text {
                value: s.clone(),
                safe: true,
            },
            Value::List(items) if key == "class" => AttrValue::text(
                items
                    .iter()
                    .map(|item| item.to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            other => AttrValue::text(other.to_string()),
        };
        Some(attr)
    }
}

/// Merge `base` with each of `overrides` in turn
pub fn merge_attrs(base: &Map, overrides: &[&Map]) -> Vec<(String, AttrValue)> {
    let mut merged: IndexMap<String, AttrValue> = IndexMap::new();
    for layer in std::iter::once(base).chain(overrides.iter().copied()) {
        for (key, value) in layer {
            apply(&mut merged, key, value);
        }
    }
    merged.into_iter().collect()
}

fn apply(merged: &mut IndexMap<String, AttrValue>, key: &str, value: &Value) {
    let Some(incoming) = AttrValue::from_value(key, value) else {
        merged.shift_remove(key);
        return;
    };

    let combined = match merged.get(key) {
        Some(AttrValue::Text {
            value: old,
            safe: old_safe,
        }) if key == "class" || key == "style" => match incoming {
            AttrValue::Text { value: new, safe } => AttrValue::Text {
                value: if key == "class" {
                    join_classes(old, &new)
                } else {
                    merge_styles(old, &new)
                },
                safe: *old_safe && safe,
            },
            flag => flag,
        },
        _ => incoming,
    };
    merged.insert(key.to_string(), combined);
}

fn join_classes(old: &str, new: &str) -> String {
    match (old.trim().is_empty(), new.trim().is_empty()) {
        (true, _) => new.trim().to_string(),
        (_, true) => old.trim().to_string(),
        _ => format!("{} {}", old.trim(), new.trim()),
    }
}

fn parse_styles(style: &str) -> IndexMap<String, String> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            if prop.is_empty() {
                return None;
            }
            Some((prop.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Merge two `style` attribute values; later properties replace earlier ones in place
pub fn merge_styles(old: &str, new: &str) -> String {
    let mut decls = parse_styles(old);
    for (prop, value) in parse_styles(new) {
        decls.insert(prop, value);
    }
    decls
        .iter()
        .map(|(prop, value)| format!("{}: {};", prop, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render merged attributes as `name="value"` pairs separated by spaces
pub fn render_attrs(attrs: &[(String, AttrValue)]) -> String {
    let mut parts = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        match value {
            AttrValue::Flag(false) => {}
            AttrValue::Flag(true) => parts.push(escape_html(name)),
            AttrValue::Text { value, safe } => {
                let value = if *safe {
                    value.clone()
                } else {
                    escape_html(value)
                };
                parts.push(format!("{}=\"{}\"", escape_html(name), value));
            }
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(pairs: &[(&str, Value)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn render(base: &Map, overrides: &[&Map]) -> String {
        render_attrs(&merge_attrs(base, overrides))
    }

    #[test]
    fn test_class_values_concatenate() {
        let base = map(&[("class", "a".into())]);
        let over = map(&[("class", "b".into())]);
        assert_eq!(render(&base, &[&over]), r#"class="a b""#);
    }

    #[test]
    fn test_class_is_not_deduplicated() {
        let base = map(&[("class", "a".into())]);
        let over = map(&[("class", "a".into())]);
        assert_eq!(render(&base, &[&over]), r#"class="a a""#);
    }

    #[test]
    fn test_none_removes_key() {
        let base = map(&[("id", "x".into()), ("title", "t".into())]);
        let over = map(&[("id", Value::None)]);
        assert_eq!(render(&base, &[&over]), r#"title="t""#);
    }

    #[test]
    fn test_later_layer_overwrites() {
        let base = map(&[("type", "button".into()), ("name", "n".into())]);
        let over = map(&[("type", "submit".into())]);
        assert_eq!(render(&base, &[&over]), r#"type="submit" name="n""#);
    }

    #[test]
    fn test_boolean_attributes() {
        let base = map(&[("disabled", true.into()), ("hidden", false.into())]);
        assert_eq!(render(&base, &[]), "disabled");
    }

    #[test]
    fn test_style_declarations_merge() {
        let base = map(&[("style", "color: red; width: 10px".into())]);
        let over = map(&[("style", "color: blue;margin:0".into())]);
        assert_eq!(
            render(&base, &[&over]),
            r#"style="color: blue; width: 10px; margin: 0;""#
        );
    }

    #[test]
    fn test_values_are_escaped_unless_safe() {
        let base = map(&[
            ("title", "a\"b".into()),
            ("data-x", Value::Safe("&amp;".into())),
        ]);
        assert_eq!(render(&base, &[]), r#"title="a&quot;b" data-x="&amp;""#);
    }

    #[test]
    fn test_class_list_value() {
        let base = map(&[("class", Value::from(vec!["a", "", "b"]))]);
        assert_eq!(render(&base, &[]), r#"class="a b""#);
    }
}
