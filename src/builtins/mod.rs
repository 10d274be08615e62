//! Filter, test and method tables.
//!
//! Each table maps a name to a callable. The environment owns one of each,
//! starting from the builtin set; hosts add their own with `register`.

mod filters;
mod methods;
mod predicates;

use crate::Result;
use crate::value::{Args, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `value | name(args)`
pub type FilterFn = Arc<dyn Fn(&Value, &Args) -> Result<Value> + Send + Sync>;
/// `value is name(args)`
pub type TestFn = Arc<dyn Fn(&Value, &Args) -> Result<bool> + Send + Sync>;
/// `receiver.name(args)`; the receiver may be mutated in place.
pub type MethodFn = Arc<dyn Fn(&mut Value, &Args) -> Result<Value> + Send + Sync>;

pub type Filters = Registry<FilterFn>;
pub type Tests = Registry<TestFn>;
pub type Methods = Registry<MethodFn>;

#[derive(Clone)]
pub struct Registry<T> {
    entries: HashMap<String, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn insert(&mut self, name: &str, entry: T) -> &mut Self {
        self.entries.insert(name.to_string(), entry);
        self
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_list().entries(names).finish()
    }
}

impl Registry<FilterFn> {
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value, &Args) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(f))
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        filters::register_all(&mut registry);
        registry
    }
}

impl Registry<TestFn> {
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value, &Args) -> Result<bool> + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(f))
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        predicates::register_all(&mut registry);
        registry
    }
}

impl Registry<MethodFn> {
    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Value, &Args) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(f))
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        methods::register_all(&mut registry);
        registry
    }
}
