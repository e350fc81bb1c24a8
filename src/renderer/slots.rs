//! Slot/fill resolution for one component instance

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::error::BoxError;
use crate::parser::Body;
use crate::renderer::context::Context;
use crate::value::Map;

/// Fill name that targets the slot marked `default`
pub const DEFAULT_FILL: &str = "default";

/// Errors raised while resolving slots
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SlotError {
    /// `label:<x>` fills whose `field:<x>` slot never rendered
    #[error("component '{component}': label fills without a rendered field slot: {}", .labels.join(", "))]
    UnusedLabels {
        component: String,
        labels: Vec<String>,
    },

    /// A `required` slot received no fill
    #[error("component '{component}': required slot '{slot}' was not filled")]
    MissingRequired { component: String, slot: String },

    /// Two different slots marked `default` in one template
    #[error("component '{component}': only one slot may be marked default, found '{first}' and '{second}'")]
    DuplicateDefault {
        component: String,
        first: String,
        second: String,
    },

    /// Slot or fill name did not evaluate to a string
    #[error("slot name must be a string, got {found}")]
    InvalidName { found: String },
}

/// Closure producing slot content from the slot's keyword arguments
pub type SlotFn = Arc<dyn Fn(&Map) -> Result<String, BoxError> + Send + Sync>;

/// Slot content supplied from Rust
#[derive(Clone)]
pub enum SlotContent {
    /// Plain text, escaped on output
    Text(String),
    /// Markup emitted verbatim
    Html(String),
    Func(SlotFn),
}

impl SlotContent {
    pub fn func(f: impl Fn(&Map) -> Result<String, BoxError> + Send + Sync + 'static) -> Self {
        SlotContent::Func(Arc::new(f))
    }
}

impl fmt::Debug for SlotContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotContent::Text(text) => f.debug_tuple("Text").field(text).finish(),
            SlotContent::Html(html) => f.debug_tuple("Html").field(html).finish(),
            SlotContent::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<&str> for SlotContent {
    fn from(text: &str) -> Self {
        SlotContent::Text(text.to_string())
    }
}

impl From<String> for SlotContent {
    fn from(text: String) -> Self {
        SlotContent::Text(text)
    }
}

/// Template nodes captured together with the scope that supplied them
#[derive(Debug)]
pub struct TemplateFill {
    pub body: Body,
    pub ctx: Context,
    /// Slot state of the template the fill was written in
    pub slots: Option<Rc<RefCell<SlotState>>>,
    /// Data of the component whose template the fill was written in
    pub data: Option<Rc<Map>>,
    pub data_var: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SlotFill {
    Content(SlotContent),
    Template(Rc<TemplateFill>),
}

/// Outcome of resolving one slot tag
#[derive(Debug, Clone)]
pub enum Resolution {
    Fill(SlotFill),
    /// Text synthesized from a `label:<x>` slot name
    Label(String),
    /// Render the slot's own body
    Default,
}

/// Fills passed to one component instance and what its template consumed
#[derive(Debug, Default)]
pub struct SlotState {
    component: String,
    fills: IndexMap<String, SlotFill>,
    resolved: HashSet<String>,
    default_slot: Option<String>,
}

impl SlotState {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Self::default()
        }
    }

    /// Name of the component the fills were passed to
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn insert(&mut self, name: impl Into<String>, fill: SlotFill) {
        self.fills.insert(name.into(), fill);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fills.contains_key(name)
    }

    /// Fill names in the order they were supplied
    pub fn names(&self) -> Vec<String> {
        self.fills.keys().cloned().collect()
    }

    /// Decide what a slot tag renders
    pub fn resolve(
        &mut self,
        name: &str,
        is_default: bool,
        required: bool,
    ) -> Result<Resolution, SlotError> {
        if is_default {
            match &self.default_slot {
                Some(first) if first != name => {
                    return Err(SlotError::DuplicateDefault {
                        component: self.component.clone(),
                        first: first.clone(),
                        second: name.to_string(),
                    });
                }
                Some(_) => {}
                None => self.default_slot = Some(name.to_string()),
            }
        }
        self.resolved.insert(name.to_string());

        let fill = self.fills.get(name).or_else(|| {
            if is_default {
                self.fills.get(DEFAULT_FILL)
            } else {
                None
            }
        });
        if let Some(fill) = fill {
            return Ok(Resolution::Fill(fill.clone()));
        }

        if let Some(field) = name.strip_prefix("label:") {
            if self.fills.contains_key(&format!("field:{}", field)) {
                return Ok(Resolution::Label(synthesize_label(field)));
            }
        }

        if required {
            return Err(SlotError::MissingRequired {
                component: self.component.clone(),
                slot: name.to_string(),
            });
        }
        Ok(Resolution::Default)
    }

    /// Check label fills once the component's render is complete
    pub fn finish(&self) -> Result<(), SlotError> {
        let labels: Vec<String> = self
            .fills
            .keys()
            .filter_map(|name| name.strip_prefix("label:"))
            .filter(|field| !self.resolved.contains(&format!("field:{}", field)))
            .map(|field| format!("label:{}", field))
            .collect();
        if labels.is_empty() {
            Ok(())
        } else {
            Err(SlotError::UnusedLabels {
                component: self.component.clone(),
                labels,
            })
        }
    }
}

/// Turn a field name into label text: `first_name` becomes `First Name`
pub fn synthesize_label(field: &str) -> String {
    field
        .split(['_', '-', '.'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> SlotFill {
        SlotFill::Content(SlotContent::Text(s.to_string()))
    }

    fn filled(resolution: Resolution) -> Option<String> {
        match resolution {
            Resolution::Fill(SlotFill::Content(SlotContent::Text(s))) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn test_synthesized_labels() {
        assert_eq!(synthesize_label("first_name"), "First Name");
        assert_eq!(synthesize_label("user.e-mail"), "User E Mail");
        assert_eq!(synthesize_label("AGE"), "Age");
    }

    #[test]
    fn test_explicit_fill_beats_label() {
        let mut state = SlotState::new("form");
        state.insert("label:name", text("Your name"));
        state.insert("field:name", text("<input>"));
        let resolution = state.resolve("label:name", false, false).unwrap();
        assert_eq!(filled(resolution), Some("Your name".to_string()));
    }

    #[test]
    fn test_label_synthesized_from_field_fill() {
        let mut state = SlotState::new("form");
        state.insert("field:first_name", text("<input>"));
        match state.resolve("label:first_name", false, false).unwrap() {
            Resolution::Label(label) => assert_eq!(label, "First Name"),
            other => panic!("Expected label, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_fill_uses_default() {
        let mut state = SlotState::new("card");
        assert!(matches!(
            state.resolve("footer", false, false).unwrap(),
            Resolution::Default
        ));
    }

    #[test]
    fn test_required_slot_without_fill() {
        let mut state = SlotState::new("card");
        let err = state.resolve("title", false, true).unwrap_err();
        assert_eq!(
            err,
            SlotError::MissingRequired {
                component: "card".to_string(),
                slot: "title".to_string()
            }
        );
    }

    #[test]
    fn test_default_slot_receives_implicit_body() {
        let mut state = SlotState::new("card");
        state.insert(DEFAULT_FILL, text("body"));
        let resolution = state.resolve("content", true, false).unwrap();
        assert_eq!(filled(resolution), Some("body".to_string()));
        // Rendering the same default slot again is fine
        assert!(state.resolve("content", true, false).is_ok());
        assert!(matches!(
            state.resolve("other", true, false),
            Err(SlotError::DuplicateDefault { .. })
        ));
    }

    #[test]
    fn test_unused_labels_reported_together_in_fill_order() {
        let mut state = SlotState::new("form");
        state.insert("label:y", text("Y"));
        state.insert("field:x", text("x"));
        state.insert("label:x", text("X"));
        state.insert("label:a", text("A"));
        state.resolve("field:x", false, false).unwrap();

        let err = state.finish().unwrap_err();
        assert_eq!(
            err,
            SlotError::UnusedLabels {
                component: "form".to_string(),
                labels: vec!["label:y".to_string(), "label:a".to_string()],
            }
        );
        assert!(err.to_string().contains("label:y, label:a"));
    }
}
