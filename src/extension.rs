//! Extension events
//!
//! Extensions observe the component lifecycle. All methods default to
//! no-ops; an extension overrides only the events it cares about.

use crate::component::ComponentClass;
use crate::value::Map;
use crate::RenderError;

pub trait Extension: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn on_component_registered(&self, _name: &str, _class: &ComponentClass) {}

    fn on_component_unregistered(&self, _name: &str, _class: &ComponentClass) {}

    /// Validated keyword arguments of a component about to render
    fn on_component_input(&self, _name: &str, _kwargs: &Map) {}

    /// Template data returned by the component's data hook
    fn on_component_data(&self, _name: &str, _data: &Map) {}

    /// A component finished, with either its output or its error
    fn on_component_rendered(
        &self,
        _name: &str,
        _output: Option<&str>,
        _error: Option<&RenderError>,
    ) {
    }
}
