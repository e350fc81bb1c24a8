//! Built-in filters
//!
//! Filters never fail: input they don't understand produces a neutral value.

use crate::parser::Filter;
use crate::value::{escape_html, Value};

pub fn apply(filter: Filter, value: Value, arg: Option<Value>) -> Value {
    match filter {
        Filter::Default => {
            if value.is_truthy() {
                value
            } else {
                arg.unwrap_or_default()
            }
        }
        Filter::DefaultIfNone => {
            if value.is_none() {
                arg.unwrap_or_default()
            } else {
                value
            }
        }
        Filter::Upper => map_text(value, |s| s.to_uppercase()),
        Filter::Lower => map_text(value, |s| s.to_lowercase()),
        Filter::Title => map_text(value, title),
        Filter::Capfirst => map_text(value, capfirst),
        Filter::Length => Value::from(value.len().unwrap_or(0)),
        Filter::Add => add(value, arg.unwrap_or_default()),
        Filter::Join => join(value, arg),
        Filter::Safe => match value {
            Value::Safe(_) => value,
            other => Value::Safe(other.to_string()),
        },
        Filter::Escape => match value {
            Value::Safe(_) => value,
            other => Value::Safe(escape_html(&other.to_string())),
        },
        Filter::First => match value {
            Value::List(items) => items.into_iter().next().unwrap_or_default(),
            Value::Str(s) => s.chars().next().map(|c| Value::Str(c.to_string())).unwrap_or_default(),
            _ => Value::None,
        },
        Filter::Last => match value {
            Value::List(items) => items.into_iter().last().unwrap_or_default(),
            Value::Str(s) => s.chars().last().map(|c| Value::Str(c.to_string())).unwrap_or_default(),
            _ => Value::None,
        },
        Filter::Slugify => Value::Str(slugify(&value.to_string())),
    }
}

/// Apply a string transform, keeping markup safe if it was
fn map_text(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Safe(s) => Value::Safe(f(&s)),
        Value::None => Value::None,
        other => Value::Str(f(&other.to_string())),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = c != '\'';
        }
    }
    out
}

fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer addition when both sides are integers, otherwise concatenation
fn add(value: Value, arg: Value) -> Value {
    if let (Some(a), Some(b)) = (as_integer(&value), as_integer(&arg)) {
        return a.checked_add(b).map(Value::Int).unwrap_or_default();
    }
    match (value, arg) {
        (Value::Float(a), b) | (b, Value::Float(a)) if b.as_float().is_some() => {
            Value::Float(a + b.as_float().unwrap_or_default())
        }
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Value::List(a)
        }
        (Value::Safe(a), Value::Safe(b)) => Value::Safe(a + &b),
        (a, b) if a.as_str().is_some() && b.as_str().is_some() => {
            Value::Str(format!("{}{}", a, b))
        }
        _ => Value::None,
    }
}

fn join(value: Value, sep: Option<Value>) -> Value {
    let sep = sep.map(|s| s.to_string()).unwrap_or_default();
    match value {
        Value::List(items) => Value::Str(
            items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(&sep),
        ),
        other => other,
    }
}

fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_numbers_and_strings() {
        assert_eq!(apply(Filter::Add, Value::Int(1), Some(Value::Int(2))), Value::Int(3));
        assert_eq!(apply(Filter::Add, "4".into(), Some(Value::Int(1))), Value::Int(5));
        assert_eq!(
            apply(Filter::Add, "label:".into(), Some("name".into())),
            Value::Str("label:name".into())
        );
        assert_eq!(apply(Filter::Add, Value::Float(0.5), Some(Value::Int(1))), Value::Float(1.5));
        assert_eq!(apply(Filter::Add, Value::Bool(true), Some(Value::Map(Default::default()))), Value::None);
    }

    #[test]
    fn test_default_filters() {
        assert_eq!(apply(Filter::Default, "".into(), Some("x".into())), Value::from("x"));
        assert_eq!(apply(Filter::DefaultIfNone, "".into(), Some("x".into())), Value::from(""));
        assert_eq!(apply(Filter::DefaultIfNone, Value::None, Some("x".into())), Value::from("x"));
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(apply(Filter::Title, "hello wORLD".into(), None), Value::from("Hello World"));
        assert_eq!(apply(Filter::Capfirst, "hello".into(), None), Value::from("Hello"));
        assert_eq!(apply(Filter::Slugify, " Hello,  World! ".into(), None), Value::from("hello-world"));
        assert_eq!(apply(Filter::Upper, Value::Safe("<b>".into()), None), Value::Safe("<B>".into()));
    }

    #[test]
    fn test_list_filters() {
        let list = Value::from(vec!["a", "b", "c"]);
        assert_eq!(apply(Filter::Join, list.clone(), Some(", ".into())), Value::from("a, b, c"));
        assert_eq!(apply(Filter::First, list.clone(), None), Value::from("a"));
        assert_eq!(apply(Filter::Last, list.clone(), None), Value::from("c"));
        assert_eq!(apply(Filter::Length, list, None), Value::Int(3));
        assert_eq!(apply(Filter::Length, Value::None, None), Value::Int(0));
    }

    #[test]
    fn test_escape_and_safe() {
        assert_eq!(apply(Filter::Escape, "<i>".into(), None), Value::Safe("&lt;i&gt;".into()));
        assert_eq!(apply(Filter::Safe, "<i>".into(), None), Value::Safe("<i>".into()));
    }
}
