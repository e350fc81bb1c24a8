//! Component render engine
//!
//! Templates execute against a [`Context`]; component tags are deferred to
//! jobs that the engine completes bottom-up, and each completed component
//! leaves a dependency marker in the output for the collector.

pub mod context;
pub mod engine;
pub mod filters;
pub mod lorem;
mod nodes;
pub mod output;
pub mod slots;

pub use context::{Context, ScopeGuard};
pub use engine::{ComponentRef, Engine, RenderArgs, RenderOutcome};
pub use slots::{SlotContent, SlotError, SlotFn};
