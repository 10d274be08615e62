use crate::Result;
use crate::config::Config;
use crate::environment::Environment;
use crate::error::{Error, Position};
use crate::tpl::ast::{Macro, Node, Template, Wrapper};
use crate::tpl::render_context::{Context, MacroClosure, Scope};
use crate::value::{Args, Map, Value, ValueKind};
use log::{debug, trace};
use std::fmt::{self, Write as _};
use std::mem;
use std::sync::Arc;

/// Everything that changes when rendering crosses into another template
/// (include) or into a macro body.
struct Frame {
    origin: Arc<Template>,
    chain: Vec<Arc<Template>>,
    ctx: Context,
    globals: Arc<Scope>,
    blocks: Vec<(String, usize)>,
    autoescape: bool,
}

/// Tree-walking executor for one render call.
///
/// The renderer owns the variable context and writes into the caller's sink.
/// Output produced while capturing (macro bodies, `set` blocks, `super()`)
/// goes to an internal buffer instead, and output of templates that extend
/// another one is discarded, since only the root of an inheritance chain
/// prints its top-level nodes.
pub struct Renderer<'a> {
    pub(crate) env: &'a Environment,
    pub(crate) config: Arc<Config>,
    autoescape: bool,
    /// Template whose nodes are executing; relative names resolve against it.
    origin: Arc<Template>,
    /// Inheritance chain of the template being rendered, entry first.
    chain: Vec<Arc<Template>>,
    pub ctx: Context,
    /// Scope visible to macros reached through the macro namespace.
    globals: Arc<Scope>,
    /// Blocks being rendered with the chain index of the definition in use.
    blocks: Vec<(String, usize)>,
    /// Capture buffers, each with the discard level it was opened at.
    captures: Vec<(String, usize)>,
    discard: usize,
    pub(crate) lenient: bool,
    depth: usize,
    out: &'a mut dyn fmt::Write,
}

impl<'a> Renderer<'a> {
    pub fn new(
        env: &'a Environment,
        template: &Arc<Template>,
        ctx: Context,
        out: &'a mut dyn fmt::Write,
    ) -> Self {
        let config = template.config.clone();
        Self {
            env,
            autoescape: config.autoescape.enabled_for(&template.name),
            config,
            origin: template.clone(),
            chain: template.chain(),
            globals: ctx.base().clone(),
            ctx,
            blocks: Vec::new(),
            captures: Vec::new(),
            discard: 0,
            lenient: false,
            depth: 0,
            out,
        }
    }

    /// Renders the template the renderer was created for.
    pub fn render(&mut self) -> Result<()> {
        trace!("Rendering template '{}'", self.origin.name);
        self.render_chain()?;
        trace!("Finished template '{}'", self.origin.name);
        Ok(())
    }

    /// Executes every template of the chain. Templates that extend another
    /// run with their output discarded so their top-level `set`, `import`
    /// and `macro` tags still take effect; the root prints.
    fn render_chain(&mut self) -> Result<()> {
        let chain = self.chain.clone();
        let Some((root, children)) = chain.split_last() else {
            return Ok(());
        };
        self.discard += 1;
        let result = children
            .iter()
            .try_for_each(|t| self.with_origin(t.clone(), |r| r.render_nodes(&t.nodes)));
        self.discard -= 1;
        result?;
        self.with_origin(root.clone(), |r| r.render_nodes(&root.nodes))
    }

    pub fn render_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Data {
                    text,
                    trim_left,
                    trim_right,
                    ..
                } => {
                    let mut text = text.as_str();
                    if *trim_left {
                        text = text.trim_start();
                    }
                    if *trim_right {
                        text = text.trim_end();
                    }
                    self.write_str(text)?;
                }
                Node::Output { expr, .. } => {
                    let value = self.evaluate(expr)?;
                    let text = value.render(self.autoescape);
                    self.write_str(&text)?;
                }
                Node::Comment { .. } => {}
                Node::Control(block) => block.statement.execute(self)?,
            }
        }
        Ok(())
    }

    pub fn render_wrapper(&mut self, wrapper: &Wrapper) -> Result<()> {
        self.render_nodes(&wrapper.nodes)
    }

    /// Runs `f` with its output collected into a string.
    pub fn capture(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<String> {
        self.captures.push((String::new(), self.discard));
        let result = f(self);
        let text = self.captures.pop().map(|(text, _)| text).unwrap_or_default();
        result.map(|_| text)
    }

    /// True while executing the top level of a template that extends
    /// another, relative to the innermost capture.
    pub fn is_discarding(&self) -> bool {
        let floor = self.captures.last().map_or(0, |(_, level)| *level);
        self.discard > floor
    }

    pub fn is_strict(&self) -> bool {
        self.config.strict && !self.lenient
    }

    /// The template whose nodes are executing.
    pub fn template(&self) -> &Arc<Template> {
        &self.origin
    }

    fn with_origin<T>(
        &mut self,
        origin: Arc<Template>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = mem::replace(&mut self.origin, origin);
        let result = f(self);
        self.origin = saved;
        result
    }

    fn swap_frame(&mut self, frame: Frame) -> Frame {
        Frame {
            origin: mem::replace(&mut self.origin, frame.origin),
            chain: mem::replace(&mut self.chain, frame.chain),
            ctx: mem::replace(&mut self.ctx, frame.ctx),
            globals: mem::replace(&mut self.globals, frame.globals),
            blocks: mem::replace(&mut self.blocks, frame.blocks),
            autoescape: mem::replace(&mut self.autoescape, frame.autoescape),
        }
    }

    /// Runs `f` inside `frame`, one level deeper.
    fn in_frame<T>(
        &mut self,
        frame: Frame,
        pos: Position,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.depth >= self.config.max_depth {
            return Err(Error::eval(
                pos,
                format!("maximum recursion depth of {} exceeded", self.config.max_depth),
            ));
        }
        self.depth += 1;
        let saved = self.swap_frame(frame);
        let result = f(self);
        self.swap_frame(saved);
        self.depth -= 1;
        result
    }

    /// Renders the nearest definition of block `name` along the chain.
    pub fn render_block(&mut self, name: &str, pos: Position) -> Result<()> {
        let Some(index) = self.chain.iter().position(|t| t.blocks.contains_key(name)) else {
            return Err(Error::eval(pos, format!("block '{}' is not defined", name)));
        };
        self.render_block_at(name, index, pos)
    }

    fn render_block_at(&mut self, name: &str, index: usize, pos: Position) -> Result<()> {
        let template = self.chain[index].clone();
        let Some(body) = template.blocks.get(name).cloned() else {
            return Err(Error::eval(pos, format!("block '{}' is not defined", name)));
        };
        trace!("Rendering block '{}' from '{}'", name, template.name);
        self.blocks.push((name.to_string(), index));
        self.ctx.push();
        let result = self.with_origin(template, |r| r.render_wrapper(&body));
        self.ctx.pop();
        self.blocks.pop();
        result
    }

    /// `super()`: the next definition of the current block after the one
    /// rendering, as a safe string.
    pub(crate) fn super_block(&mut self, pos: Position) -> Result<Value> {
        let Some((name, index)) = self.blocks.last().cloned() else {
            return Err(Error::eval(pos, "super() is only available inside a block"));
        };
        let Some(next) = (index + 1..self.chain.len()).find(|&i| self.chain[i].blocks.contains_key(&name))
        else {
            return Err(Error::eval(
                pos,
                format!("block '{}' has no parent definition", name),
            ));
        };
        let text = self.capture(|r| r.render_block_at(&name, next, pos))?;
        Ok(Value::safe_string(text))
    }

    /// Closes `def` over the current scope.
    pub fn bind_macro(&self, def: &Arc<Macro>) -> Value {
        Value::from_macro(MacroClosure {
            def: def.clone(),
            captured: self.ctx.snapshot(),
            template: self.origin.clone(),
        })
    }

    /// A macro of the current template or of the inheritance chain that was
    /// not bound by executing its tag.
    pub(crate) fn find_macro(&self, name: &str) -> Option<Value> {
        let found = self.origin.find_macro(name).or_else(|| {
            self.chain
                .iter()
                .find_map(|t| t.macros.get(name).map(|m| (m.clone(), t.clone())))
        })?;
        let (def, template) = found;
        Some(Value::from_macro(MacroClosure {
            def,
            captured: self.globals.clone(),
            template,
        }))
    }

    /// Calls a macro: positional arguments in order, then keywords by name,
    /// then defaults evaluated in the scope the macro was defined in.
    pub(crate) fn call_macro(
        &mut self,
        closure: &Arc<MacroClosure>,
        args: Args,
        pos: Position,
    ) -> Result<Value> {
        let def = &closure.def;
        trace!("Calling macro '{}'", def.name);
        if args.positional.len() > def.params.len() {
            return Err(Error::invalid_call(
                &def.name,
                format!(
                    "takes at most {} argument(s), {} given",
                    def.params.len(),
                    args.positional.len()
                ),
            ));
        }
        let mut bound: Vec<Option<Value>> = vec![None; def.params.len()];
        for (slot, value) in bound.iter_mut().zip(args.positional) {
            *slot = Some(value);
        }
        for (key, value) in args.kwargs {
            let Some(index) = def.params.iter().position(|p| p.name == key) else {
                return Err(Error::invalid_call(
                    &def.name,
                    format!("unexpected keyword argument '{}'", key),
                ));
            };
            if bound[index].is_some() {
                return Err(Error::invalid_call(
                    &def.name,
                    format!("got multiple values for argument '{}'", key),
                ));
            }
            bound[index] = Some(value);
        }

        let frame = Frame {
            origin: closure.template.clone(),
            chain: self.chain.clone(),
            ctx: Context::layered(closure.captured.clone()),
            globals: self.globals.clone(),
            blocks: self.blocks.clone(),
            autoescape: self.autoescape,
        };
        let text = self.in_frame(frame, pos, |r| {
            let mut values = Vec::with_capacity(bound.len());
            for (param, value) in def.params.iter().zip(bound) {
                let value = match value {
                    Some(value) => value,
                    None => r.evaluate(&param.default)?,
                };
                values.push((param.name.clone(), value));
            }
            r.ctx
                .set(def.name.clone(), Value::new(ValueKind::Macro(closure.clone())));
            for (name, value) in values {
                r.ctx.set(name, value);
            }
            r.capture(|r| r.render_wrapper(&def.body))
        })?;
        Ok(Value::safe_string(text))
    }

    /// Renders another template into this renderer's output.
    pub fn include(
        &mut self,
        names: &Value,
        ignore_missing: bool,
        with_context: bool,
        pos: Position,
    ) -> Result<()> {
        let candidates = template_names(names, pos)?;
        let loader = self.origin.loader.inherit(&self.origin.name)?;
        let mut resolved = None;
        for name in &candidates {
            match loader.resolve(name) {
                Ok(id) => {
                    resolved = Some(id);
                    break;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        let Some(id) = resolved else {
            if ignore_missing {
                debug!(
                    "Ignoring missing include {} in '{}'",
                    names.repr(),
                    self.origin.name
                );
                return Ok(());
            }
            return Err(Error::TemplateNotFound(candidates.join(", ")));
        };

        let template = self.env.load(&id, loader, &self.config, &[])?;
        let ctx = if with_context {
            Context::layered(self.ctx.snapshot())
        } else {
            Context::new()
        };
        let frame = Frame {
            autoescape: self.config.autoescape.enabled_for(&template.name),
            chain: template.chain(),
            origin: template,
            globals: ctx.base().clone(),
            ctx,
            blocks: Vec::new(),
        };
        self.in_frame(frame, pos, |r| r.render_chain())
    }

    /// Loads a template and returns its macros, bound to a snapshot of the
    /// current scope (`with context`) or to an empty one.
    pub fn import(&mut self, name: &Value, with_context: bool, pos: Position) -> Result<Map> {
        let Some(path) = name.as_str() else {
            return Err(Error::eval(
                pos,
                format!("template name must be a string, got {}", name.type_name()),
            ));
        };
        let loader = self.origin.loader.inherit(&self.origin.name)?;
        let id = loader.resolve(path)?;
        let template = self.env.load(&id, loader, &self.config, &[])?;
        let captured = if with_context {
            self.ctx.snapshot()
        } else {
            Arc::new(Scope::new())
        };
        let mut exports = Map::new();
        for t in template.chain().iter().rev() {
            for (name, def) in &t.macros {
                let closure = MacroClosure {
                    def: def.clone(),
                    captured: captured.clone(),
                    template: t.clone(),
                };
                exports.insert(name.clone(), Value::from_macro(closure));
            }
        }
        debug!("Imported {} macro(s) from '{}'", exports.len(), id);
        Ok(exports)
    }
}

fn template_names(names: &Value, pos: Position) -> Result<Vec<String>> {
    let not_a_name = |v: &Value| {
        Error::eval(
            pos,
            format!("template name must be a string, got {}", v.type_name()),
        )
    };
    match names.kind() {
        ValueKind::Str(s) => Ok(vec![s.clone()]),
        ValueKind::Seq(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| not_a_name(v)))
            .collect(),
        _ => Err(not_a_name(names)),
    }
}

impl fmt::Write for Renderer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.is_discarding() {
            Ok(())
        } else if let Some((buffer, _)) = self.captures.last_mut() {
            buffer.push_str(s);
            Ok(())
        } else {
            self.out.write_str(s)
        }
    }
}
