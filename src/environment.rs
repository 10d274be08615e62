use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};

use crate::Result;
use crate::builtins::{Filters, Methods, Tests};
use crate::config::Config;
use crate::loader::{Loader, MemoryLoader, read_source};
use crate::tpl::ast::Template;
use crate::tpl::parser;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::render_context::Context;
use crate::tpl::statements::{Statement, StatementRegistry};
use crate::tpl::stream::TokenStream;
use crate::value::{Args, ToValue, Value};

/// The entry point of the engine.
///
/// An `Environment` holds the configuration, the loader templates are read
/// through, the tag/filter/test/method registries, and a cache of compiled
/// templates keyed by loader id. It is `Send + Sync`; share it behind an
/// `Arc` to render from several threads.
pub struct Environment {
    config: Arc<Config>,
    loader: Arc<dyn Loader>,
    statements: StatementRegistry,
    filters: Filters,
    tests: Tests,
    methods: Methods,
    /// Compiled templates by id.
    cache: DashMap<String, Arc<Template>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(MemoryLoader::new())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Environment {
    /// Creates an environment with the default configuration and the builtin
    /// tags, filters, tests and methods.
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self::with_loader(Arc::new(loader))
    }

    pub fn with_loader(loader: Arc<dyn Loader>) -> Self {
        Self {
            config: Arc::new(Config::default()),
            loader,
            statements: StatementRegistry::builtin(),
            filters: Filters::builtin(),
            tests: Tests::builtin(),
            methods: Methods::builtin(),
            cache: DashMap::new(),
        }
    }

    /// Replaces the configuration. Templates compiled under the previous one
    /// are dropped from the cache.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self.cache.clear();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    pub fn statements(&self) -> &StatementRegistry {
        &self.statements
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn tests(&self) -> &Tests {
        &self.tests
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    /// Registers a custom tag. The parse function receives the parser and
    /// a stream over the tag's arguments.
    pub fn add_statement<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Parser<'_>, &mut TokenStream) -> Result<Arc<dyn Statement>>
            + Send
            + Sync
            + 'static,
    {
        self.statements.register(name, f);
        self
    }

    pub fn add_filter<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value, &Args) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.register(name, f);
        self
    }

    pub fn add_test<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value, &Args) -> Result<bool> + Send + Sync + 'static,
    {
        self.tests.register(name, f);
        self
    }

    pub fn add_method<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Value, &Args) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.register(name, f);
        self
    }

    /// Resolves `name` through the loader and returns the compiled template,
    /// parsing it on first use.
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        let id = self.loader.resolve(name)?;
        self.load(&id, self.loader.clone(), &self.config, &[])
    }

    /// Returns the cached template for `id` or reads and compiles it.
    ///
    /// Only templates compiled with the environment's own configuration are
    /// cached.
    pub(crate) fn load(
        &self,
        id: &str,
        loader: Arc<dyn Loader>,
        config: &Arc<Config>,
        ancestry: &[String],
    ) -> Result<Arc<Template>> {
        let cacheable = Arc::ptr_eq(config, &self.config);
        if cacheable && let Some(template) = self.cache.get(id) {
            debug!("Template cache hit: '{}'", id);
            return Ok(template.clone());
        }
        debug!("Template cache miss: '{}'", id);
        let source = read_source(loader.as_ref(), id)?;
        let template = Arc::new(parser::compile(
            self,
            id,
            &source,
            loader,
            config.clone(),
            ancestry,
        )?);
        if cacheable {
            self.cache.insert(id.to_string(), template.clone());
        }
        Ok(template)
    }

    /// Compiles a template from a string. The result is not cached;
    /// `extends`, `include` and `import` inside it resolve through the
    /// environment's loader.
    pub fn compile(&self, name: &str, source: &str) -> Result<Arc<Template>> {
        self.compile_with_config(name, source, self.config.as_ref().clone())
    }

    /// Like [`compile`](Self::compile) with a configuration of its own, e.g.
    /// different delimiters for one template.
    pub fn compile_with_config(
        &self,
        name: &str,
        source: &str,
        config: Config,
    ) -> Result<Arc<Template>> {
        let template = parser::compile(
            self,
            name,
            source,
            self.loader.clone(),
            Arc::new(config),
            &[],
        )?;
        Ok(Arc::new(template))
    }

    /// Renders the template `name` with host data convertible to a mapping.
    pub fn render<T: ToValue + ?Sized>(&self, name: &str, data: &T) -> Result<String> {
        let template = self.get_template(name)?;
        self.render_template(&template, Context::from_data(data)?)
    }

    /// Compiles and renders a template string in one go.
    pub fn render_str<T: ToValue + ?Sized>(&self, source: &str, data: &T) -> Result<String> {
        let template = self.compile("<string>", source)?;
        self.render_template(&template, Context::from_data(data)?)
    }

    pub fn render_template(&self, template: &Arc<Template>, ctx: Context) -> Result<String> {
        let mut out = String::new();
        self.render_to(template, ctx, &mut out)?;
        Ok(out)
    }

    /// Renders into any `fmt::Write` sink.
    ///
    /// On failure, whatever was written before the error stays in `out`.
    pub fn render_to(
        &self,
        template: &Arc<Template>,
        ctx: Context,
        out: &mut dyn fmt::Write,
    ) -> Result<()> {
        Renderer::new(self, template, ctx, out).render()
    }

    /// Parses and caches every template the loader lists for `pattern`.
    /// Templates that fail to compile are logged and skipped; returns the
    /// number cached.
    pub fn preload(&self, pattern: &str) -> Result<usize> {
        let ids = self.loader.list(pattern)?;
        let mut loaded = 0;
        for id in &ids {
            match self.load(id, self.loader.clone(), &self.config, &[]) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Failed to preload template '{}': {}", id, e),
            }
        }
        debug!("Preloaded {} of {} template(s) for '{}'", loaded, ids.len(), pattern);
        Ok(loaded)
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_cache_and_preload() {
        let loader = MemoryLoader::new();
        loader
            .add("a.html", "A")
            .add("b.html", "{% include 'a.html' %}B")
            .add("broken.html", "{% if %}");
        let env = Environment::new(loader);

        assert!(!env.is_cached("a.html"));
        assert_eq!(env.render("b.html", &()).unwrap(), "AB");
        assert!(env.is_cached("a.html"));
        assert!(env.is_cached("b.html"));

        env.clear_cache();
        assert_eq!(env.preload("*.html").unwrap(), 2);
        assert!(!env.is_cached("broken.html"));
    }

    #[test]
    fn test_compiled_strings_are_not_cached() {
        let env = Environment::default();
        env.compile("inline", "x").unwrap();
        assert!(!env.is_cached("inline"));
    }

    #[test]
    fn test_missing_template() {
        let env = Environment::default();
        assert!(matches!(env.render("nope.html", &()), Err(Error::TemplateNotFound(_))));
    }

    #[test]
    fn test_partial_output_is_kept() {
        let env = Environment::default();
        let template = env.compile("t", "before {{ 1 // 0 }} after").unwrap();
        let mut out = String::new();
        assert!(env.render_to(&template, Context::new(), &mut out).is_err());
        assert_eq!(out, "before ");
    }

    #[test]
    fn test_custom_registrations() {
        let mut env = Environment::default();
        env.add_filter("twice", |v, _| Ok(Value::from(format!("{}{}", v, v))))
            .add_test("short", |v, _| Ok(v.len().is_some_and(|n| n < 3)));
        assert_eq!(
            env.render_str("{{ 'ab' | twice }} {{ 'ab' is short }}", &()).unwrap(),
            "abab True"
        );
    }
}
