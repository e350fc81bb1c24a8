//! Keyword-argument schemas: validation and coercion of component input

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::value::{Map, Value};

/// Component input that does not match the component's schema
#[derive(Debug, Error, Clone, PartialEq)]
#[error("invalid input for component '{component}': field '{field}' {reason}")]
pub struct ValidationError {
    pub component: String,
    pub field: String,
    pub reason: String,
}

/// Accepted type of a keyword argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    Str,
    Int,
    Float,
    Bool,
    List,
    Map,
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(FieldKind::Any),
            "str" => Ok(FieldKind::Str),
            "int" => Ok(FieldKind::Int),
            "float" => Ok(FieldKind::Float),
            "bool" => Ok(FieldKind::Bool),
            "list" => Ok(FieldKind::List),
            "map" => Ok(FieldKind::Map),
            other => Err(format!("unknown field type '{}'", other)),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Any => "any",
            FieldKind::Str => "str",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
            FieldKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// One declared keyword argument
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl Field {
    /// Optional field of the given kind
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Coerce `value` to this field's kind
    fn coerce(&self, value: Value) -> Result<Value, String> {
        let coerced = match (self.kind, value) {
            (FieldKind::Any, v) => v,
            (FieldKind::Str, v @ (Value::Str(_) | Value::Safe(_))) => v,
            (FieldKind::Int, Value::Int(n)) => Value::Int(n),
            (FieldKind::Int, Value::Str(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => return Err(format!("expected int, got '{}'", s)),
            },
            (FieldKind::Float, Value::Float(f)) => Value::Float(f),
            (FieldKind::Float, Value::Int(n)) => Value::Float(n as f64),
            (FieldKind::Float, Value::Str(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => return Err(format!("expected float, got '{}'", s)),
            },
            (FieldKind::Bool, Value::Bool(b)) => Value::Bool(b),
            (FieldKind::Bool, Value::Str(s)) => match s.trim() {
                "true" | "True" | "1" => Value::Bool(true),
                "false" | "False" | "0" => Value::Bool(false),
                _ => return Err(format!("expected bool, got '{}'", s)),
            },
            (FieldKind::List, v @ Value::List(_)) => v,
            (FieldKind::Map, v @ Value::Map(_)) => v,
            (kind, other) => {
                return Err(format!("expected {}, got {}", kind, other.type_name()));
            }
        };
        Ok(coerced)
    }
}

/// Declared keyword arguments of a component
///
/// The default schema is permissive: no declared fields and unknown
/// keywords pass through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
    strict: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Reject keywords that are not declared
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate `kwargs`, returning them coerced with defaults filled in
    pub fn validate(&self, component: &str, kwargs: &Map) -> Result<Map, ValidationError> {
        let error = |field: &str, reason: String| ValidationError {
            component: component.to_string(),
            field: field.to_string(),
            reason,
        };

        let mut validated = Map::with_capacity(kwargs.len());
        for (key, value) in kwargs {
            match self.field(key) {
                Some(field) if field.kind == FieldKind::Any || !value.is_none() => {
                    let coerced = field.coerce(value.clone()).map_err(|reason| error(key, reason))?;
                    validated.insert(key.clone(), coerced);
                }
                Some(_) => {}
                None if self.strict => {
                    return Err(error(key, "is not a declared argument".to_string()));
                }
                None => {
                    validated.insert(key.clone(), value.clone());
                }
            }
        }

        for field in &self.fields {
            if validated.contains_key(&field.name) {
                continue;
            }
            match &field.default {
                Some(default) => {
                    validated.insert(field.name.clone(), default.clone());
                }
                None if field.required => {
                    return Err(error(&field.name, "is required".to_string()));
                }
                None => {}
            }
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kwargs(pairs: &[(&str, Value)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_permissive_schema_passes_everything() {
        let input = kwargs(&[("anything", Value::Int(1))]);
        assert_eq!(Schema::new().validate("c", &input).unwrap(), input);
    }

    #[test]
    fn test_defaults_and_coercion() {
        let schema = Schema::new()
            .with_field(Field::new("depth", FieldKind::Int).with_default(0))
            .with_field(Field::new("ratio", FieldKind::Float))
            .with_field(Field::new("open", FieldKind::Bool));
        let input = kwargs(&[("ratio", Value::Int(2)), ("open", "true".into())]);
        let out = schema.validate("c", &input).unwrap();
        assert_eq!(out.get("depth"), Some(&Value::Int(0)));
        assert_eq!(out.get("ratio"), Some(&Value::Float(2.0)));
        assert_eq!(out.get("open"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_string_to_int() {
        let schema = Schema::new().with_field(Field::new("n", FieldKind::Int));
        let out = schema.validate("c", &kwargs(&[("n", "42".into())])).unwrap();
        assert_eq!(out.get("n"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_error_names_field() {
        let schema = Schema::new().with_field(Field::new("n", FieldKind::Int));
        let err = schema.validate("counter", &kwargs(&[("n", "abc".into())])).unwrap_err();
        assert_eq!(err.component, "counter");
        assert_eq!(err.field, "n");
        assert_eq!(
            err.to_string(),
            "invalid input for component 'counter': field 'n' expected int, got 'abc'"
        );
    }

    #[test]
    fn test_required_field_missing() {
        let schema = Schema::new().with_field(Field::new("title", FieldKind::Str).required());
        let err = schema.validate("card", &Map::new()).unwrap_err();
        assert_eq!(err.field, "title");
        assert_eq!(err.reason, "is required");
        let err = schema
            .validate("card", &kwargs(&[("title", Value::None)]))
            .unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn test_strict_rejects_unknown() {
        let schema = Schema::new().strict();
        let err = schema.validate("c", &kwargs(&[("x", Value::Int(1))])).unwrap_err();
        assert_eq!(err.field, "x");
    }
}
