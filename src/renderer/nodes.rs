//! Node execution and expression evaluation

use std::cmp::Ordering;
use std::sync::Arc;

use crate::attrs::{merge_attrs, render_attrs};
use crate::parser::{
    Body, CmpOp, ComponentNode, Expr, Fills, Kwarg, Node, PathSegment, SlotNode, Spanned,
    Template,
};
use crate::renderer::context::Context;
use crate::renderer::engine::{ComponentJob, RenderRun, Scope};
use crate::renderer::output::Output;
use crate::renderer::slots::{
    Resolution, SlotContent, SlotError, SlotFill, SlotState, TemplateFill, DEFAULT_FILL,
};
use crate::renderer::{filters, lorem};
use crate::settings::ContextBehavior;
use crate::value::{escape_html, Map, Value};
use crate::RenderError;

impl RenderRun<'_> {
    pub(super) fn render_body(
        &mut self,
        nodes: &[Spanned<Node>],
        ctx: &mut Context,
        scope: &Scope,
        out: &mut Output,
    ) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(&node.node, ctx, scope, out)?;
            if !self.carried.is_empty() {
                for marker in self.carried.drain(..) {
                    out.push_str(&marker);
                }
            }
        }
        Ok(())
    }

    fn render_node(
        &mut self,
        node: &Node,
        ctx: &mut Context,
        scope: &Scope,
        out: &mut Output,
    ) -> Result<(), RenderError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let value = self.eval(expr, ctx)?;
                out.push_str(&display(&value));
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(&cond.node, ctx)?.is_truthy() {
                        return self.render_body(body, ctx, scope, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.render_body(body, ctx, scope, out)?;
                }
            }
            Node::For {
                vars,
                iterable,
                reversed,
                body,
                empty,
            } => {
                let value = self.eval(&iterable.node, ctx)?;
                let mut items = iter_items(value, vars.len())?;
                if items.is_empty() {
                    if let Some(empty) = empty {
                        self.render_body(empty, ctx, scope, out)?;
                    }
                    return Ok(());
                }
                if *reversed {
                    items.reverse();
                }
                let len = items.len();
                let parentloop = ctx.get("forloop").cloned().unwrap_or_default();
                for (i, item) in items.into_iter().enumerate() {
                    let mut frame = bind_loop_vars(vars, item);
                    frame.insert(
                        "forloop".to_string(),
                        forloop(i, len, parentloop.clone()),
                    );
                    let mut inner = ctx.scope(frame);
                    self.render_body(body, &mut inner, scope, out)?;
                }
            }
            Node::With { bindings, body } => {
                let frame = self.eval_kwargs(bindings, ctx)?;
                let mut inner = ctx.scope(frame);
                self.render_body(body, &mut inner, scope, out)?;
            }
            Node::Component(component) => self.render_component(component, ctx, scope, out)?,
            // Fills are consumed by their component tag
            Node::Fill(_) => {}
            Node::Slot(slot) => self.render_slot(slot, ctx, scope, out)?,
            Node::HtmlAttrs {
                attrs,
                defaults,
                kwargs,
            } => {
                let attrs = self.eval_attr_map(attrs.as_ref(), ctx)?;
                let defaults = self.eval_attr_map(defaults.as_ref(), ctx)?;
                let kwargs = self.eval_kwargs(kwargs, ctx)?;
                out.push_str(&render_attrs(&merge_attrs(&defaults, &[&attrs, &kwargs])));
            }
            Node::Provide { key, values, body } => {
                let key = match self.eval(&key.node, ctx)? {
                    Value::Str(s) | Value::Safe(s) => s,
                    other => {
                        return Err(RenderError::InvalidArgument {
                            tag: "provide",
                            message: format!("key must be a string, got {}", other.type_name()),
                        })
                    }
                };
                let values = self.eval_kwargs(values, ctx)?;
                let mut inner = ctx.provide(key, values);
                self.render_body(body, &mut inner, scope, out)?;
            }
            Node::Lorem {
                count,
                method,
                random,
            } => {
                let value = self.eval(&count.node, ctx)?;
                let count = match &value {
                    Value::Int(n) => (*n).max(0) as usize,
                    Value::Str(s) => s.trim().parse::<usize>().map_err(|_| {
                        RenderError::InvalidArgument {
                            tag: "lorem",
                            message: format!("count must be an integer, got '{}'", s),
                        }
                    })?,
                    other => {
                        return Err(RenderError::InvalidArgument {
                            tag: "lorem",
                            message: format!("count must be an integer, got {}", other.type_name()),
                        })
                    }
                };
                out.push_str(&lorem::generate(count, *method, *random));
            }
            Node::Dependencies(kind) => out.push_str(&self.engine.markers().placeholder(*kind)),
        }
        Ok(())
    }

    /// Evaluate a component tag and defer the component itself
    fn render_component(
        &mut self,
        node: &ComponentNode,
        ctx: &Context,
        scope: &Scope,
        out: &mut Output,
    ) -> Result<(), RenderError> {
        let name = match self.eval(&node.name.node, ctx)? {
            Value::Str(s) | Value::Safe(s) => s,
            other => {
                return Err(RenderError::InvalidName {
                    found: other.type_name().to_string(),
                })
            }
        };
        let class = self
            .engine
            .get(&name)
            .ok_or_else(|| RenderError::UnknownComponent { name: name.clone() })?;

        let args = node
            .args
            .iter()
            .map(|arg| self.eval(&arg.node, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let kwargs = self.eval_kwargs(&node.kwargs, ctx)?;

        let capture = |body: Body, data_var: Option<String>| {
            SlotFill::Template(std::rc::Rc::new(TemplateFill {
                body,
                ctx: ctx.clone(),
                slots: scope.slots.clone(),
                data: scope.data.clone(),
                data_var,
            }))
        };
        let mut slots = SlotState::new(name.clone());
        match &node.fills {
            Fills::Implicit(body) => {
                if !is_blank(body) {
                    slots.insert(DEFAULT_FILL, capture(body.clone(), None));
                }
            }
            Fills::Explicit(fills) => {
                for fill in fills {
                    let fill_name = match self.eval(&fill.name.node, ctx)? {
                        Value::Str(s) | Value::Safe(s) => s,
                        other => {
                            return Err(SlotError::InvalidName {
                                found: other.type_name().to_string(),
                            }
                            .into())
                        }
                    };
                    slots.insert(fill_name, capture(fill.body.clone(), fill.data_var.clone()));
                }
            }
        }

        let job = ComponentJob::new(name, class, args, kwargs, slots, ctx.clone(), node.only);
        let id = self.spawn(scope.job, job);
        out.push_child(id);
        Ok(())
    }

    fn render_slot(
        &mut self,
        node: &SlotNode,
        ctx: &mut Context,
        scope: &Scope,
        out: &mut Output,
    ) -> Result<(), RenderError> {
        let name = match self.eval(&node.name.node, ctx)? {
            Value::Str(s) | Value::Safe(s) => s,
            other => {
                return Err(SlotError::InvalidName {
                    found: other.type_name().to_string(),
                }
                .into())
            }
        };
        let Some(slots) = &scope.slots else {
            return self.render_body(&node.body, ctx, scope, out);
        };
        let kwargs = self.eval_kwargs(&node.kwargs, ctx)?;
        let resolution = slots
            .borrow_mut()
            .resolve(&name, node.is_default, node.required)?;

        match resolution {
            Resolution::Default => self.render_body(&node.body, ctx, scope, out)?,
            Resolution::Label(text) => out.push_str(&escape_html(&text)),
            Resolution::Fill(SlotFill::Content(content)) => match content {
                SlotContent::Text(text) => out.push_str(&escape_html(&text)),
                SlotContent::Html(html) => out.push_str(&html),
                SlotContent::Func(func) => {
                    let html = func(&kwargs).map_err(|source| RenderError::Component {
                        component: slots.borrow().component().to_string(),
                        source,
                    })?;
                    out.push_str(&html);
                }
            },
            Resolution::Fill(SlotFill::Template(fill)) => {
                let base = match (self.behavior, &scope.data) {
                    (ContextBehavior::Django, Some(data)) => fill.ctx.pushed((**data).clone()),
                    _ => fill.ctx.clone(),
                };
                let mut fill_ctx = base.with_provided_from(ctx);
                if let Some(var) = &fill.data_var {
                    let mut frame = Map::new();
                    frame.insert(var.clone(), Value::Map(kwargs));
                    fill_ctx.push_frame(frame);
                }
                let id = self.spawn_fill(scope.job, fill, fill_ctx);
                out.push_child(id);
            }
        }
        Ok(())
    }

    pub(super) fn eval(&mut self, expr: &Expr, ctx: &Context) -> Result<Value, RenderError> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Path { root, segments } => lookup(ctx, root, segments),
            Expr::Template(template) => self.render_nested(template, ctx)?,
            Expr::Filter { input, filter, arg } => {
                let input = self.eval(input, ctx)?;
                let arg = match arg {
                    Some(arg) => Some(self.eval(arg, ctx)?),
                    None => None,
                };
                filters::apply(*filter, input, arg)
            }
            Expr::Not(inner) => Value::Bool(!self.eval(inner, ctx)?.is_truthy()),
            Expr::And(left, right) => {
                Value::Bool(self.eval(left, ctx)?.is_truthy() && self.eval(right, ctx)?.is_truthy())
            }
            Expr::Or(left, right) => {
                Value::Bool(self.eval(left, ctx)?.is_truthy() || self.eval(right, ctx)?.is_truthy())
            }
            Expr::Compare { op, left, right } => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                Value::Bool(compare(*op, &left, &right))
            }
        };
        Ok(value)
    }

    fn eval_kwargs(&mut self, kwargs: &[Kwarg], ctx: &Context) -> Result<Map, RenderError> {
        let mut map = Map::with_capacity(kwargs.len());
        for kwarg in kwargs {
            let value = self.eval(&kwarg.value.node, ctx)?;
            map.insert(kwarg.name.node.clone(), value);
        }
        Ok(map)
    }

    fn eval_attr_map(
        &mut self,
        expr: Option<&Spanned<Expr>>,
        ctx: &Context,
    ) -> Result<Map, RenderError> {
        let Some(expr) = expr else {
            return Ok(Map::new());
        };
        match self.eval(&expr.node, ctx)? {
            Value::Map(map) => Ok(map),
            Value::None => Ok(Map::new()),
            other => Err(RenderError::InvalidArgument {
                tag: "html_attrs",
                message: format!("expected a map of attributes, got {}", other.type_name()),
            }),
        }
    }

    /// Render a template string argument in its own run
    fn render_nested(&mut self, template: &Arc<Template>, ctx: &Context) -> Result<Value, RenderError> {
        let html = self.engine.render_raw(template.clone(), ctx.clone())?;
        let (clean, markers) = self.engine.markers().strip_rendered(&html);
        self.carried
            .extend(markers.into_iter().map(str::to_string));
        Ok(Value::Safe(clean))
    }
}

/// Text of a value as it appears in output
fn display(value: &Value) -> String {
    match value {
        Value::Safe(html) => html.clone(),
        other => escape_html(&other.to_string()),
    }
}

fn lookup(ctx: &Context, root: &str, segments: &[PathSegment]) -> Value {
    let mut current = ctx.get(root);
    for segment in segments {
        current = current.and_then(|value| match segment {
            PathSegment::Key(key) => value.get(key),
            PathSegment::Index(index) => value.get_index(*index),
        });
    }
    current.cloned().unwrap_or_default()
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    match op {
        CmpOp::Eq => left.loose_eq(right),
        CmpOp::Ne => !left.loose_eq(right),
        CmpOp::Lt => left.compare(right) == Some(Ordering::Less),
        CmpOp::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => left.compare(right) == Some(Ordering::Greater),
        CmpOp::Ge => matches!(
            left.compare(right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CmpOp::In => right.contains(left),
        CmpOp::NotIn => !right.contains(left),
    }
}

fn iter_items(value: Value, arity: usize) -> Result<Vec<Value>, RenderError> {
    let items = match value {
        Value::None => Vec::new(),
        Value::List(items) => items,
        Value::Map(map) if arity >= 2 => map
            .into_iter()
            .map(|(k, v)| Value::List(vec![Value::Str(k), v]))
            .collect(),
        Value::Map(map) => map.into_keys().map(Value::Str).collect(),
        Value::Str(s) | Value::Safe(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
        other => {
            return Err(RenderError::InvalidArgument {
                tag: "for",
                message: format!("cannot iterate over {}", other.type_name()),
            })
        }
    };
    Ok(items)
}

fn bind_loop_vars(vars: &[String], item: Value) -> Map {
    let mut frame = Map::with_capacity(vars.len() + 1);
    match (vars, item) {
        ([single], item) => {
            frame.insert(single.clone(), item);
        }
        (vars, Value::List(parts)) => {
            let mut parts = parts.into_iter();
            for var in vars {
                frame.insert(var.clone(), parts.next().unwrap_or_default());
            }
        }
        (vars, item) => {
            let mut item = Some(item);
            for var in vars {
                frame.insert(var.clone(), item.take().unwrap_or_default());
            }
        }
    }
    frame
}

fn forloop(index: usize, len: usize, parentloop: Value) -> Value {
    let mut vars = Map::new();
    vars.insert("counter".to_string(), Value::from(index + 1));
    vars.insert("counter0".to_string(), Value::from(index));
    vars.insert("revcounter".to_string(), Value::from(len - index));
    vars.insert("revcounter0".to_string(), Value::from(len - index - 1));
    vars.insert("first".to_string(), Value::Bool(index == 0));
    vars.insert("last".to_string(), Value::Bool(index + 1 == len));
    vars.insert("length".to_string(), Value::from(len));
    vars.insert("parentloop".to_string(), parentloop);
    Value::Map(vars)
}

/// Whitespace-only implicit bodies do not fill the default slot
fn is_blank(body: &[Spanned<Node>]) -> bool {
    body.iter().all(|node| match &node.node {
        Node::Text(text) => text.trim().is_empty(),
        _ => false,
    })
}
