//! Component registry: names, class ids and public routes

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use thiserror::Error;

use super::ComponentClass;

/// Errors that can occur during registry operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    /// Name already bound to a different class
    #[error("component name '{name}' is already registered to {existing}")]
    AlreadyRegistered { name: String, existing: String },

    /// Another class already holds this class id
    #[error("class id '{id}' is already taken by another class")]
    IdConflict { id: String },

    /// Name or class id not in the registry
    #[error("component '{name}' is not registered")]
    NotRegistered { name: String },
}

/// Registered components by name and by class id
///
/// One class may be registered under several names. Public classes also get
/// a route keyed by class id; routes hold weak references and are retracted
/// as soon as the last name bound to the class is removed.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: IndexMap<String, Arc<ComponentClass>>,
    classes: HashMap<String, Arc<ComponentClass>>,
    routes: HashMap<String, Weak<ComponentClass>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `class`
    ///
    /// Returns `Ok(false)` when the name is already bound to this very class.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        class: Arc<ComponentClass>,
    ) -> Result<bool, RegistryError> {
        let name = name.into();
        if let Some(existing) = self.components.get(&name) {
            if Arc::ptr_eq(existing, &class) {
                return Ok(false);
            }
            return Err(RegistryError::AlreadyRegistered {
                name,
                existing: existing.id().to_string(),
            });
        }
        if let Some(existing) = self.classes.get(class.id()) {
            if !Arc::ptr_eq(existing, &class) {
                return Err(RegistryError::IdConflict {
                    id: class.id().to_string(),
                });
            }
        }

        self.classes.insert(class.id().to_string(), class.clone());
        if class.is_public() {
            self.routes
                .insert(class.id().to_string(), Arc::downgrade(&class));
        }
        self.components.insert(name, class);
        Ok(true)
    }

    /// Remove a name, returning the class it was bound to
    pub fn unregister(&mut self, name: &str) -> Result<Arc<ComponentClass>, RegistryError> {
        let class = self
            .components
            .shift_remove(name)
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })?;
        if !self.components.values().any(|c| c.id() == class.id()) {
            self.classes.remove(class.id());
            self.routes.remove(class.id());
        }
        Ok(class)
    }

    /// Remove every name bound to the class with `class_id`
    pub fn unregister_class(
        &mut self,
        class_id: &str,
    ) -> Result<(Arc<ComponentClass>, Vec<String>), RegistryError> {
        let class = self
            .classes
            .remove(class_id)
            .ok_or_else(|| RegistryError::NotRegistered {
                name: class_id.to_string(),
            })?;
        let names: Vec<String> = self.names_of(class_id).map(str::to_string).collect();
        self.components.retain(|_, c| c.id() != class_id);
        self.routes.remove(class_id);
        Ok((class, names))
    }

    /// Get a component by name
    pub fn get(&self, name: &str) -> Option<Arc<ComponentClass>> {
        self.components.get(name).cloned()
    }

    /// Get a component by class id
    pub fn get_by_id(&self, class_id: &str) -> Option<Arc<ComponentClass>> {
        self.classes.get(class_id).cloned()
    }

    /// Public component served under `class_id`
    pub fn route(&self, class_id: &str) -> Option<Arc<ComponentClass>> {
        self.routes.get(class_id).and_then(Weak::upgrade)
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(|s| s.as_str())
    }

    /// Names bound to the class with `class_id`
    pub fn names_of<'a>(&'a self, class_id: &'a str) -> impl Iterator<Item = &'a str> {
        self.components
            .iter()
            .filter(move |(_, c)| c.id() == class_id)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
