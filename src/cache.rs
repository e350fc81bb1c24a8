//! Compiled template cache

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::loader::TemplateSource;
use crate::parser::Template;

/// LRU cache of compiled templates keyed by source
///
/// Compilation runs outside the lock. When two callers compile the same
/// source concurrently, the entry inserted first stays canonical.
pub struct TemplateCache {
    entries: Option<Mutex<LruCache<TemplateSource, Arc<Template>>>>,
}

impl TemplateCache {
    /// Create a cache holding up to `capacity` templates; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, key: &TemplateSource) -> Option<Arc<Template>> {
        self.entries.as_ref()?.lock().get(key).cloned()
    }

    /// Insert a compiled template, returning the canonical entry
    pub fn insert(&self, key: TemplateSource, template: Arc<Template>) -> Arc<Template> {
        let Some(entries) = &self.entries else {
            return template;
        };
        let mut entries = entries.lock();
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }
        entries.put(key, template.clone());
        template
    }

    /// Return the cached template for `key`, compiling it on a miss
    pub fn get_or_compile<E>(
        &self,
        key: &TemplateSource,
        compile: impl FnOnce() -> Result<Template, E>,
    ) -> Result<Arc<Template>, E> {
        if let Some(template) = self.get(key) {
            tracing::debug!(template = %key, "template cache hit");
            return Ok(template);
        }
        tracing::debug!(template = %key, "template cache miss");
        let template = Arc::new(compile()?);
        Ok(self.insert(key.clone(), template))
    }

    pub fn evict(&self, key: &TemplateSource) {
        if let Some(entries) = &self.entries {
            entries.lock().pop(key);
        }
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
