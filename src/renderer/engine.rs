//! Render engine: component registration and the render loop
//!
//! A render call never recurses into child components. A `{% component %}`
//! tag evaluates its arguments, captures its fills and records a pending
//! job; the parent's output keeps a placeholder for the child. A slot tag that
//! resolves to a template fill defers the fill body the same way. The loop in
//! [`RenderRun::run`] executes pending jobs until none are left and then
//! completes them bottom-up, so nesting depth is limited only by memory.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::cache::TemplateCache;
use crate::component::manifest::ComponentManifest;
use crate::component::{
    Component, ComponentClass, ComponentRegistry, RegistryError, RenderInput, Slots,
};
use crate::deps::{DependencyCollector, DepsStrategy, MarkerFormat};
use crate::extension::Extension;
use crate::loader::TemplateSource;
use crate::parser::{parse_with, Template};
use crate::renderer::context::Context;
use crate::renderer::output::{JobId, Output};
use crate::renderer::slots::{SlotContent, SlotFill, SlotState, TemplateFill};
use crate::settings::{ConfigError, ContextBehavior, Settings};
use crate::value::{Map, Value};
use crate::views::{Request, Response};
use crate::RenderError;

/// Component to render: a registered name or a class
#[derive(Debug, Clone)]
pub enum ComponentRef {
    Name(String),
    Class(Arc<ComponentClass>),
}

impl From<&str> for ComponentRef {
    fn from(name: &str) -> Self {
        ComponentRef::Name(name.to_string())
    }
}

impl From<String> for ComponentRef {
    fn from(name: String) -> Self {
        ComponentRef::Name(name)
    }
}

impl From<Arc<ComponentClass>> for ComponentRef {
    fn from(class: Arc<ComponentClass>) -> Self {
        ComponentRef::Class(class)
    }
}

/// Input for rendering a component from Rust
#[derive(Debug, Clone, Default)]
pub struct RenderArgs {
    pub args: Vec<Value>,
    pub kwargs: Map,
    pub slots: IndexMap<String, SlotContent>,
    /// Variables of the outer context
    pub context: Map,
    /// Overrides the configured dependency strategy
    pub strategy: Option<DepsStrategy>,
}

impl RenderArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map) -> Self {
        self.kwargs.extend(kwargs);
        self
    }

    pub fn with_slot(mut self, name: impl Into<String>, content: impl Into<SlotContent>) -> Self {
        self.slots.insert(name.into(), content.into());
        self
    }

    pub fn with_context(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(name.into(), value.into());
        self
    }

    pub fn with_strategy(mut self, strategy: DepsStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Result of a render on the request path
#[derive(Debug)]
pub struct RenderOutcome {
    pub output: String,
    pub had_error: bool,
    pub error: Option<RenderError>,
}

/// Component registry, template cache and render entry points
///
/// An engine is shared across threads; each render call runs on the
/// calling thread.
pub struct Engine {
    settings: Settings,
    registry: RwLock<ComponentRegistry>,
    cache: TemplateCache,
    markers: MarkerFormat,
    extensions: RwLock<Vec<Arc<dyn Extension>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            cache: TemplateCache::new(settings.template_cache_size),
            settings,
            registry: RwLock::new(ComponentRegistry::new()),
            markers: MarkerFormat::random(),
            extensions: RwLock::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Marker format of this engine's rendered output
    pub fn markers(&self) -> &MarkerFormat {
        &self.markers
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn add_extension(&self, extension: impl Extension + 'static) {
        tracing::debug!(extension = extension.name(), "extension added");
        self.extensions.write().push(Arc::new(extension));
    }

    pub(crate) fn emit(&self, event: impl Fn(&dyn Extension)) {
        let extensions = self.extensions.read().clone();
        for extension in &extensions {
            event(extension.as_ref());
        }
    }

    /// Bind `name` to `class`; idempotent for the same class
    pub fn register(
        &self,
        name: impl Into<String>,
        class: Arc<ComponentClass>,
    ) -> Result<Arc<ComponentClass>, RegistryError> {
        let name = name.into();
        let added = self.registry.write().register(name.clone(), class.clone())?;
        if added {
            tracing::debug!(component = %name, class_id = class.id(), "component registered");
            self.emit(|ext| ext.on_component_registered(&name, &class));
        }
        Ok(class)
    }

    pub fn register_component<C: Component>(
        &self,
        name: impl Into<String>,
        component: C,
    ) -> Result<Arc<ComponentClass>, RegistryError> {
        self.register(name, Arc::new(ComponentClass::new(component)))
    }

    /// Register every component declared in a manifest
    pub fn register_manifest(&self, manifest: &ComponentManifest) -> Result<(), RenderError> {
        for (name, component) in manifest.components()? {
            self.register_component(name, component)?;
        }
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<ComponentClass>, RegistryError> {
        let (class, retired) = {
            let mut registry = self.registry.write();
            let class = registry.unregister(name)?;
            let retired = registry.get_by_id(class.id()).is_none();
            (class, retired)
        };
        if retired {
            self.cache.evict(class.template());
        }
        self.emit(|ext| ext.on_component_unregistered(name, &class));
        Ok(class)
    }

    /// Remove every name bound to a class, returning the names
    pub fn unregister_class(&self, class_id: &str) -> Result<Vec<String>, RegistryError> {
        let (class, names) = self.registry.write().unregister_class(class_id)?;
        self.cache.evict(class.template());
        for name in &names {
            self.emit(|ext| ext.on_component_unregistered(name, &class));
        }
        Ok(names)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ComponentClass>> {
        self.registry.read().get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Load and compile a template through the cache
    pub fn compile(&self, source: &TemplateSource) -> Result<Arc<Template>, RenderError> {
        self.cache.get_or_compile(source, || {
            let text = source.load(&self.settings.dirs)?;
            parse_with(&text, self.settings.parse_options()).map_err(|error| {
                RenderError::Syntax {
                    template: source.display_name(),
                    text: text.clone(),
                    error,
                }
            })
        })
    }

    /// Render a component and collect its dependencies
    pub fn render(
        &self,
        component: impl Into<ComponentRef>,
        args: RenderArgs,
    ) -> Result<String, RenderError> {
        let (name, class) = match component.into() {
            ComponentRef::Name(name) => {
                let class = self
                    .get(&name)
                    .ok_or_else(|| RenderError::UnknownComponent { name: name.clone() })?;
                (name, class)
            }
            ComponentRef::Class(class) => {
                let name = self
                    .registry
                    .read()
                    .names_of(class.id())
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| class.name().to_string());
                (name, class)
            }
        };

        let mut slots = SlotState::new(name.clone());
        for (slot, content) in args.slots {
            slots.insert(slot, SlotFill::Content(content));
        }

        let mut run = RenderRun::new(self);
        let root = run.push_component(ComponentJob::new(
            name,
            class,
            args.args,
            args.kwargs,
            slots,
            Context::from_map(args.context),
            false,
        ));
        let html = run.run(root)?;
        let strategy = args.strategy.unwrap_or(self.settings.deps_strategy);
        Ok(self.collect(&html, strategy)?)
    }

    /// Render for the request path: errors are logged and flagged
    pub fn render_outcome(
        &self,
        component: impl Into<ComponentRef>,
        args: RenderArgs,
    ) -> RenderOutcome {
        match self.render(component, args) {
            Ok(output) => RenderOutcome {
                output,
                had_error: false,
                error: None,
            },
            Err(error) => {
                tracing::error!(%error, "component render failed");
                RenderOutcome {
                    output: String::new(),
                    had_error: true,
                    error: Some(error),
                }
            }
        }
    }

    /// Render a page template that may contain component tags
    pub fn render_template(
        &self,
        source: &TemplateSource,
        context: Map,
        strategy: Option<DepsStrategy>,
    ) -> Result<String, RenderError> {
        let template = self.compile(source)?;
        let html = self.render_raw(template, Context::from_map(context))?;
        let strategy = strategy.unwrap_or(self.settings.deps_strategy);
        Ok(self.collect(&html, strategy)?)
    }

    /// Render inline template text with the configured strategy
    pub fn render_str(&self, template: &str, context: Map) -> Result<String, RenderError> {
        self.render_template(&TemplateSource::inline(template), context, None)
    }

    /// Render a compiled template, leaving dependency markers in place
    pub(crate) fn render_raw(
        &self,
        template: Arc<Template>,
        ctx: Context,
    ) -> Result<String, RenderError> {
        let mut run = RenderRun::new(self);
        let root = run.push_job(None, JobKind::Root { template, ctx });
        run.run(root)
    }

    /// Replace this engine's markers in `html` with dependency tags
    pub fn collect(&self, html: &str, strategy: DepsStrategy) -> Result<String, ConfigError> {
        let registry = self.registry.read();
        DependencyCollector::new(&registry, &self.markers).collect(html, strategy)
    }

    /// URL of a public component
    pub fn component_url(&self, name: &str) -> Result<String, RenderError> {
        let class = self
            .get(name)
            .ok_or_else(|| RenderError::UnknownComponent {
                name: name.to_string(),
            })?;
        if !class.is_public() {
            return Err(ConfigError::NotPublic {
                name: name.to_string(),
            }
            .into());
        }
        Ok(format!(
            "{}/{}/",
            self.settings.url_prefix.trim_end_matches('/'),
            class.id()
        ))
    }

    /// Serve a public component; `None` when no route matches
    pub fn handle(&self, request: &Request) -> Option<Response> {
        let prefix = self.settings.url_prefix.trim_end_matches('/');
        let rest = request.path.strip_prefix(prefix)?.strip_prefix('/')?;
        let class_id = rest.strip_suffix('/').unwrap_or(rest);
        if class_id.is_empty() || class_id.contains('/') {
            return None;
        }
        let class = self.registry.read().route(class_id)?;
        if !request.method.eq_ignore_ascii_case("GET") {
            return Some(Response::error(405, "method not allowed"));
        }

        let args = RenderArgs::new().with_kwargs(request.query.clone());
        let outcome = self.render_outcome(class, args);
        if outcome.had_error {
            Some(Response::error(500, "internal server error"))
        } else {
            Some(Response::html(outcome.output))
        }
    }
}

/// A component instance waiting to render
pub(super) struct ComponentJob {
    pub(super) name: String,
    pub(super) class: Arc<ComponentClass>,
    args: Vec<Value>,
    kwargs: Map,
    pub(super) slots: Rc<RefCell<SlotState>>,
    /// Context at the component tag
    ctx: Context,
    only: bool,
    /// Set once hooks have started running
    input: Option<RenderInput>,
}

impl ComponentJob {
    pub(super) fn new(
        name: String,
        class: Arc<ComponentClass>,
        args: Vec<Value>,
        kwargs: Map,
        slots: SlotState,
        ctx: Context,
        only: bool,
    ) -> Self {
        Self {
            name,
            class,
            args,
            kwargs,
            slots: Rc::new(RefCell::new(slots)),
            ctx,
            only,
            input: None,
        }
    }
}

pub(super) enum JobKind {
    Root { template: Arc<Template>, ctx: Context },
    Component(ComponentJob),
    /// Template fill body resolved by a slot tag
    Fill { fill: Rc<TemplateFill>, ctx: Context },
}

struct Job {
    parent: Option<JobId>,
    kind: JobKind,
    output: Output,
    result: Option<String>,
    /// Set once the output has been assembled
    done: bool,
}

/// What the template being executed can see besides its context
#[derive(Clone)]
pub(super) struct Scope {
    /// Job whose output receives placeholders for spawned children
    pub(super) job: JobId,
    /// Slot state of the component whose template is executing
    pub(super) slots: Option<Rc<RefCell<SlotState>>>,
    /// That component's template data
    pub(super) data: Option<Rc<Map>>,
}

/// State of one render call
pub(crate) struct RenderRun<'e> {
    pub(super) engine: &'e Engine,
    pub(super) behavior: ContextBehavior,
    jobs: Vec<Job>,
    pending: Vec<JobId>,
    /// Jobs spawned by the job currently executing
    spawned: Vec<JobId>,
    /// Markers lifted out of nested template strings, flushed after each node
    pub(super) carried: Vec<String>,
}

impl<'e> RenderRun<'e> {
    pub(super) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            behavior: engine.settings.context_behavior,
            jobs: Vec::new(),
            pending: Vec::new(),
            spawned: Vec::new(),
            carried: Vec::new(),
        }
    }

    fn push_job(&mut self, parent: Option<JobId>, kind: JobKind) -> JobId {
        let id = self.jobs.len();
        self.jobs.push(Job {
            parent,
            kind,
            output: Output::new(),
            result: None,
            done: false,
        });
        id
    }

    fn push_component(&mut self, job: ComponentJob) -> JobId {
        self.push_job(None, JobKind::Component(job))
    }

    /// Record a child component of `parent`; it runs after the current job
    pub(super) fn spawn(&mut self, parent: JobId, job: ComponentJob) -> JobId {
        self.spawn_kind(parent, JobKind::Component(job))
    }

    /// Record a fill body of `parent`; it runs after the current job
    pub(super) fn spawn_fill(
        &mut self,
        parent: JobId,
        fill: Rc<TemplateFill>,
        ctx: Context,
    ) -> JobId {
        self.spawn_kind(parent, JobKind::Fill { fill, ctx })
    }

    fn spawn_kind(&mut self, parent: JobId, kind: JobKind) -> JobId {
        let id = self.push_job(Some(parent), kind);
        self.spawned.push(id);
        id
    }

    /// Execute `root` and everything it spawns, then assemble the output
    pub(super) fn run(mut self, root: JobId) -> Result<String, RenderError> {
        self.pending.push(root);
        while let Some(id) = self.pending.pop() {
            if let Err(error) = self.execute(id) {
                return Err(self.fail(error));
            }
            let spawned = std::mem::take(&mut self.spawned);
            self.pending.extend(spawned.into_iter().rev());
        }

        // Children always have higher ids than their parents
        for id in (root..self.jobs.len()).rev() {
            if let Err(error) = self.complete(id) {
                return Err(self.fail(error));
            }
        }
        Ok(self.jobs[root].result.take().unwrap_or_default())
    }

    fn execute(&mut self, id: JobId) -> Result<(), RenderError> {
        let (body, mut ctx, scope) = match &mut self.jobs[id].kind {
            JobKind::Root { template, ctx } => (
                template.nodes.clone(),
                ctx.clone(),
                Scope {
                    job: id,
                    slots: None,
                    data: None,
                },
            ),
            JobKind::Component(job) => {
                let kwargs = job.class.schema().validate(&job.name, &job.kwargs)?;
                let slot_names = Slots::new(job.slots.borrow().names());
                let input = RenderInput::new(
                    job.name.clone(),
                    std::mem::take(&mut job.args),
                    kwargs,
                    slot_names,
                    job.ctx.clone(),
                );
                job.input = Some(input.clone());
                let (name, class, slots) = (job.name.clone(), job.class.clone(), job.slots.clone());
                let isolated = job.only || self.behavior == ContextBehavior::Isolated;
                let outer = job.ctx.clone();

                tracing::debug!(component = %name, class_id = class.id(), "rendering component");
                self.engine
                    .emit(|ext| ext.on_component_input(&name, &input.kwargs));
                class.component().on_render_before(&input);
                let data = class
                    .component()
                    .get_template_data(&input)
                    .map_err(|source| RenderError::Component {
                        component: name.clone(),
                        source,
                    })?;
                self.engine.emit(|ext| ext.on_component_data(&name, &data));

                let template = self.engine.compile(class.template())?;
                let mut vars = data.clone();
                vars.insert("component_vars".to_string(), component_vars(&input));
                let ctx = if isolated {
                    outer.isolated().pushed(vars)
                } else {
                    outer.pushed(vars)
                };
                (
                    template.nodes.clone(),
                    ctx,
                    Scope {
                        job: id,
                        slots: Some(slots),
                        data: Some(Rc::new(data)),
                    },
                )
            }
            JobKind::Fill { fill, ctx } => (
                fill.body.clone(),
                ctx.clone(),
                Scope {
                    job: id,
                    slots: fill.slots.clone(),
                    data: fill.data.clone(),
                },
            ),
        };

        let mut out = Output::new();
        self.render_body(&body, &mut ctx, &scope, &mut out)?;
        self.jobs[id].output = out;
        Ok(())
    }

    /// Assemble a job's output once all its children are complete
    fn complete(&mut self, id: JobId) -> Result<(), RenderError> {
        let output = std::mem::take(&mut self.jobs[id].output);
        let jobs = &mut self.jobs;
        let mut html = output.assemble(|child| jobs[child].result.take().unwrap_or_default());

        if let JobKind::Component(job) = &self.jobs[id].kind {
            job.slots.borrow().finish()?;
            if let Some(input) = &job.input {
                job.class
                    .component()
                    .on_render_after(input, Some(&html), None);
                self.engine
                    .emit(|ext| ext.on_component_rendered(&job.name, Some(&html), None));
            }
            html.push_str(&self.engine.markers.rendered(job.class.id()));
        }
        self.jobs[id].result = Some(html);
        self.jobs[id].done = true;
        Ok(())
    }

    /// Run failure hooks for every started component that has not completed
    ///
    /// Newest first, so children are reported before their parents.
    fn fail(&self, error: RenderError) -> RenderError {
        for job in self.jobs.iter().rev().filter(|job| !job.done) {
            let JobKind::Component(component) = &job.kind else {
                continue;
            };
            if let Some(input) = &component.input {
                component
                    .class
                    .component()
                    .on_render_after(input, None, Some(&error));
                self.engine
                    .emit(|ext| ext.on_component_rendered(&component.name, None, Some(&error)));
            }
        }
        error
    }
}

impl Drop for RenderRun<'_> {
    fn drop(&mut self) {
        // Newest first: each job releases only its own link of shared chains
        while self.jobs.pop().is_some() {}
    }
}

/// `component_vars` exposed to component templates
fn component_vars(input: &RenderInput) -> Value {
    let is_filled: Map = input
        .slots
        .names()
        .iter()
        .map(|name| (name.clone(), Value::Bool(true)))
        .collect();
    let mut vars = Map::new();
    vars.insert("is_filled".to_string(), Value::Map(is_filled));
    Value::Map(vars)
}
