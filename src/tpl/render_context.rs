use crate::Result;
use crate::error::Error;
use crate::tpl::ast::{Macro, Template};
use crate::value::{ToValue, Value, ValueKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type Scope = HashMap<String, Value>;

/// Variables visible to a render: a shared base scope (the host data, or a
/// captured snapshot) under a stack of local scopes.
#[derive(Debug, Clone, Default)]
pub struct Context {
    base: Arc<Scope>,
    scopes: Vec<Scope>,
}

impl Context {
    pub fn new() -> Self {
        Self::layered(Arc::new(Scope::new()))
    }

    /// A fresh local scope on top of `base`.
    pub fn layered(base: Arc<Scope>) -> Self {
        Self {
            base,
            scopes: vec![Scope::new()],
        }
    }

    /// Builds a context from a mapping value; none and undefined give an empty one.
    pub fn from_value(value: Value) -> Result<Self> {
        match value.into_kind() {
            ValueKind::Map(map) => {
                let map = Arc::try_unwrap(map).unwrap_or_else(|m| (*m).clone());
                Ok(Self::layered(Arc::new(map.into_iter().collect())))
            }
            ValueKind::None | ValueKind::Undefined => Ok(Self::new()),
            other => Err(Error::TypeMismatch(format!(
                "render context must be a mapping, got {}",
                Value::new(other).type_name()
            ))),
        }
    }

    pub fn from_data<T: ToValue + ?Sized>(data: &T) -> Result<Self> {
        Self::from_value(data.to_value())
    }

    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Self::from_value(Value::from_serialize(data)?)
    }

    /// Adds a variable to the innermost scope.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.set(name, value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.into(), value);
            }
            None => self.scopes.push(Scope::from([(name.into(), value)])),
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.base.get(name))
    }

    /// The slot holding `name` wherever it lives, so attribute and item
    /// assignment mutate the existing value.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        if let Some(idx) = self.scopes.iter().rposition(|s| s.contains_key(name)) {
            return self.scopes[idx].get_mut(name);
        }
        if self.base.contains_key(name) {
            return Arc::make_mut(&mut self.base).get_mut(name);
        }
        None
    }

    /// Every visible variable in one scope, inner definitions winning.
    pub fn flatten(&self) -> Scope {
        let mut all = (*self.base).clone();
        for scope in &self.scopes {
            all.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        all
    }

    pub fn snapshot(&self) -> Arc<Scope> {
        Arc::new(self.flatten())
    }

    pub fn base(&self) -> &Arc<Scope> {
        &self.base
    }
}

/// A macro bound to the scope it was defined in.
pub struct MacroClosure {
    pub def: Arc<Macro>,
    pub captured: Arc<Scope>,
    /// Template the macro was defined in; includes and imports inside the
    /// body resolve relative to it.
    pub template: Arc<Template>,
}

impl fmt::Debug for MacroClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroClosure")
            .field("name", &self.def.name)
            .field("template", &self.template.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn root() -> Context {
        let mut map = Map::new();
        map.insert("a".to_string(), Value::from(1));
        let mut user = Map::new();
        user.insert("name".to_string(), Value::from("ann"));
        map.insert("user".to_string(), Value::from_map(user));
        Context::from_value(Value::from_map(map)).unwrap()
    }

    #[test]
    fn test_lookup_walks_outward() {
        let mut ctx = root();
        assert_eq!(ctx.lookup("a"), Some(&Value::from(1)));
        assert_eq!(ctx.lookup("b"), None);

        ctx.push();
        ctx.set("a", Value::from(2));
        assert_eq!(ctx.lookup("a"), Some(&Value::from(2)));

        ctx.pop();
        assert_eq!(ctx.lookup("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_lookup_mut_updates_base_without_touching_snapshots() {
        let mut ctx = root();
        let snapshot = ctx.snapshot();
        ctx.push();
        ctx.lookup_mut("user")
            .unwrap()
            .set_attr("name", Value::from("bob"))
            .unwrap();
        ctx.pop();

        let name = |v: &Value| v.get_attr("name").unwrap();
        assert_eq!(name(ctx.lookup("user").unwrap()), Value::from("bob"));
        assert_eq!(name(&snapshot["user"]), Value::from("ann"));
    }

    #[test]
    fn test_non_mapping_data_is_rejected() {
        assert!(Context::from_value(Value::from(3)).is_err());
        assert!(Context::from_value(Value::NONE).unwrap().lookup("x").is_none());
    }
}
