//! Render context: dynamically scoped template variables
//!
//! A context is a persistent chain of frames, so cloning it is cheap and a
//! clone captured by a fill or a pending component never observes later
//! changes. Block tags open a frame through [`Context::scope`]; the returned
//! guard restores the previous state when dropped, including on early
//! return with an error.

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::value::{Map, Value};

#[derive(Debug, Clone)]
struct Frame {
    vars: Map,
    parent: Option<Rc<Frame>>,
}

/// Values published by `{% provide %}`
#[derive(Debug)]
struct Provided {
    key: String,
    values: Map,
    parent: Option<Rc<Provided>>,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    head: Option<Rc<Frame>>,
    provided: Option<Rc<Provided>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with a single frame holding `vars`
    pub fn from_map(vars: Map) -> Self {
        Self::new().pushed(vars)
    }

    /// Look a variable up, innermost frame first
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.vars.get(name) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a variable in the innermost frame
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        match &mut self.head {
            Some(head) => {
                Rc::make_mut(head).vars.insert(name.into(), value);
            }
            None => {
                let mut vars = Map::new();
                vars.insert(name.into(), value);
                self.push_frame(vars);
            }
        }
    }

    /// Permanently push a frame onto this context
    pub fn push_frame(&mut self, vars: Map) {
        let parent = self.head.take();
        self.head = Some(Rc::new(Frame { vars, parent }));
    }

    /// A copy of this context with an extra frame on top
    pub fn pushed(&self, vars: Map) -> Context {
        let mut ctx = self.clone();
        ctx.push_frame(vars);
        ctx
    }

    /// Open a frame that lives until the returned guard is dropped
    pub fn scope(&mut self, vars: Map) -> ScopeGuard<'_> {
        let saved = self.clone();
        self.push_frame(vars);
        ScopeGuard { ctx: self, saved }
    }

    /// Publish `values` under `key` until the returned guard is dropped
    pub fn provide(&mut self, key: impl Into<String>, values: Map) -> ScopeGuard<'_> {
        let saved = self.clone();
        let parent = self.provided.take();
        self.provided = Some(Rc::new(Provided {
            key: key.into(),
            values,
            parent,
        }));
        ScopeGuard { ctx: self, saved }
    }

    /// Nearest values provided under `key`
    pub fn inject(&self, key: &str) -> Option<&Map> {
        let mut provided = self.provided.as_deref();
        while let Some(current) = provided {
            if current.key == key {
                return Some(&current.values);
            }
            provided = current.parent.as_deref();
        }
        None
    }

    /// A context without variables that keeps provided values
    pub fn isolated(&self) -> Context {
        Context {
            head: None,
            provided: self.provided.clone(),
        }
    }

    /// This context's variables with `other`'s provided values
    pub fn with_provided_from(&self, other: &Context) -> Context {
        Context {
            head: self.head.clone(),
            provided: other.provided.clone(),
        }
    }

    /// Merge all frames into one map, inner values shadowing outer ones
    pub fn flatten(&self) -> Map {
        let mut frames = Vec::new();
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            frames.push(&current.vars);
            frame = current.parent.as_deref();
        }
        let mut flat = Map::new();
        for vars in frames.into_iter().rev() {
            for (k, v) in vars {
                flat.insert(k.clone(), v.clone());
            }
        }
        flat
    }
}

/// Restores the context it was created from when dropped
pub struct ScopeGuard<'c> {
    ctx: &'c mut Context,
    saved: Context,
}

impl Deref for ScopeGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        *self.ctx = std::mem::take(&mut self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, i64)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn test_inner_frame_shadows_outer() {
        let mut ctx = Context::from_map(vars(&[("a", 1), ("b", 2)]));
        {
            let scope = ctx.scope(vars(&[("a", 10)]));
            assert_eq!(scope.get("a"), Some(&Value::Int(10)));
            assert_eq!(scope.get("b"), Some(&Value::Int(2)));
        }
        assert_eq!(ctx.get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_scope_restored_on_error_path() {
        fn fails(ctx: &mut Context) -> Result<(), ()> {
            let mut scope = ctx.scope(Map::new());
            scope.set("temp", Value::Int(1));
            Err(())
        }
        let mut ctx = Context::new();
        assert!(fails(&mut ctx).is_err());
        assert!(!ctx.contains("temp"));
    }

    #[test]
    fn test_clones_are_isolated_from_later_writes() {
        let mut ctx = Context::from_map(vars(&[("a", 1)]));
        let snapshot = ctx.clone();
        ctx.set("a", Value::Int(2));
        assert_eq!(snapshot.get("a"), Some(&Value::Int(1)));
        assert_eq!(ctx.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_provide_and_inject() {
        let mut ctx = Context::new();
        {
            let scope = ctx.provide("theme", vars(&[("dark", 1)]));
            let isolated = scope.isolated();
            assert_eq!(
                isolated.inject("theme").and_then(|m| m.get("dark")),
                Some(&Value::Int(1))
            );
        }
        assert!(ctx.inject("theme").is_none());
    }

    #[test]
    fn test_flatten() {
        let ctx = Context::from_map(vars(&[("a", 1), ("b", 2)])).pushed(vars(&[("a", 3)]));
        let flat = ctx.flatten();
        assert_eq!(flat.get("a"), Some(&Value::Int(3)));
        assert_eq!(flat.len(), 2);
    }
}
