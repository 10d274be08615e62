//! The dynamic value model shared by the parser (literals) and the renderer.
//!
//! A [`Value`] is a tagged variant plus a `safe` flag. Sequences and mappings
//! are reference counted and copied on write, so cloning a value out of a
//! scope is cheap and mutation never leaks into other holders.

pub mod args;
mod convert;
mod object;
pub(crate) mod ops;
pub mod serializer;

use crate::error::{Error, Position};
use crate::tpl::render_context::MacroClosure;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use args::{Args, Bound, Param};
pub use convert::{FromValue, ToValue};
pub use object::Object;
pub use serializer::ValueSerializer;

pub type Map = BTreeMap<String, Value>;

#[derive(Clone)]
pub enum ValueKind {
    None,
    /// A lookup that found nothing in non-strict mode. Prints as nothing and is
    /// falsy like `None`, but `is defined` and `default` can tell them apart.
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Arc<Vec<Value>>),
    Map(Arc<Map>),
    Macro(Arc<MacroClosure>),
    Object(Arc<dyn Object>),
    Error(Arc<Error>),
}

#[derive(Clone)]
pub struct Value {
    kind: ValueKind,
    safe: bool,
}

impl Value {
    pub const NONE: Value = Value {
        kind: ValueKind::None,
        safe: false,
    };

    pub const UNDEFINED: Value = Value {
        kind: ValueKind::Undefined,
        safe: false,
    };

    pub fn new(kind: ValueKind) -> Self {
        Self { kind, safe: false }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ValueKind {
        &mut self.kind
    }

    pub fn into_kind(self) -> ValueKind {
        self.kind
    }

    /// A string exempt from autoescaping.
    pub fn safe_string(s: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Str(s.into()),
            safe: true,
        }
    }

    pub fn mark_safe(mut self) -> Self {
        self.safe = true;
        self
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn from_seq(items: Vec<Value>) -> Self {
        Self::new(ValueKind::Seq(Arc::new(items)))
    }

    pub fn from_map(map: Map) -> Self {
        Self::new(ValueKind::Map(Arc::new(map)))
    }

    pub fn from_object(obj: impl Object + 'static) -> Self {
        Self::new(ValueKind::Object(Arc::new(obj)))
    }

    pub fn from_macro(closure: MacroClosure) -> Self {
        Self::new(ValueKind::Macro(Arc::new(closure)))
    }

    pub fn from_error(err: Error) -> Self {
        Self::new(ValueKind::Error(Arc::new(err)))
    }

    /// Converts any serde-serializable host value.
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        value.serialize(ValueSerializer)
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::None => "none",
            ValueKind::Undefined => "undefined",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::Str(_) => "string",
            ValueKind::Seq(_) => "sequence",
            ValueKind::Map(_) => "mapping",
            ValueKind::Macro(_) => "macro",
            ValueKind::Object(_) => "object",
            ValueKind::Error(_) => "error",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ValueKind::None)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.kind, ValueKind::Undefined)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind, ValueKind::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind, ValueKind::Int(_) | ValueKind::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, ValueKind::Str(_))
    }

    pub fn is_seq(&self) -> bool {
        matches!(self.kind, ValueKind::Seq(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, ValueKind::Map(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ValueKind::Macro(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ValueKind::Error(_))
    }

    pub fn is_iterable(&self) -> bool {
        match &self.kind {
            ValueKind::Seq(_) | ValueKind::Map(_) | ValueKind::Str(_) => true,
            ValueKind::Object(o) => o.iter().is_some(),
            _ => false,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.kind {
            ValueKind::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Converts an error value back into `Err`, keeping the original detail.
    pub fn into_result(self) -> Result<Value, Error> {
        match self.kind {
            ValueKind::Error(e) => Err(Arc::try_unwrap(e).unwrap_or_else(|e| (*e).clone())),
            _ => Ok(self),
        }
    }

    pub fn is_true(&self) -> bool {
        match &self.kind {
            ValueKind::None | ValueKind::Undefined | ValueKind::Error(_) => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Int(n) => *n != 0,
            ValueKind::Float(f) => *f != 0.0,
            ValueKind::Str(s) => !s.is_empty(),
            ValueKind::Seq(s) => !s.is_empty(),
            ValueKind::Map(m) => !m.is_empty(),
            ValueKind::Macro(_) => true,
            ValueKind::Object(o) => o.is_true(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::Int(n) => Some(*n),
            ValueKind::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.kind {
            ValueKind::Int(n) => Some(*n as f64),
            ValueKind::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match &self.kind {
            ValueKind::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match &self.kind {
            ValueKind::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_macro(&self) -> Option<&Arc<MacroClosure>> {
        match &self.kind {
            ValueKind::Macro(m) => Some(m),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match &self.kind {
            ValueKind::Str(s) => Some(s.chars().count()),
            ValueKind::Seq(s) => Some(s.len()),
            ValueKind::Map(m) => Some(m.len()),
            ValueKind::Object(o) => o.len(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Attribute access (`value.name`). Mappings and objects look the name up;
    /// sequences accept numeric names so `items.0` works.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match &self.kind {
            ValueKind::Map(m) => m.get(name).cloned(),
            ValueKind::Object(o) => o.get_attr(name),
            ValueKind::Seq(_) | ValueKind::Str(_) => name
                .parse::<i64>()
                .ok()
                .and_then(|idx| self.get_item(&Value::from(idx))),
            _ => None,
        }
    }

    /// Item access (`value[key]`). Negative indices count from the end.
    pub fn get_item(&self, key: &Value) -> Option<Value> {
        match (&self.kind, &key.kind) {
            (ValueKind::Seq(s), ValueKind::Int(i)) => {
                normalize_index(*i, s.len()).map(|i| s[i].clone())
            }
            (ValueKind::Str(s), ValueKind::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                normalize_index(*i, chars.len()).map(|i| Value::from(chars[i].to_string()))
            }
            (ValueKind::Map(m), ValueKind::Str(k)) => m.get(k).cloned(),
            (ValueKind::Map(m), ValueKind::Int(i)) => m.get(&i.to_string()).cloned(),
            (ValueKind::Object(o), _) => o.get_item(key),
            (_, ValueKind::Str(k)) => self.get_attr(k),
            _ => None,
        }
    }

    /// Python-style slicing over sequences and strings.
    pub fn get_slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, String> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err("slice step cannot be zero".to_string());
        }
        match &self.kind {
            ValueKind::Seq(s) => {
                let picked = slice_indices(s.len(), start, stop, step)
                    .into_iter()
                    .map(|i| s[i].clone())
                    .collect();
                Ok(Value::from_seq(picked))
            }
            ValueKind::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = slice_indices(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                Ok(Value {
                    kind: ValueKind::Str(picked),
                    safe: self.safe,
                })
            }
            ValueKind::Undefined | ValueKind::None => Ok(Value::UNDEFINED),
            _ => Err(format!("'{}' object is not sliceable", self.type_name())),
        }
    }

    pub fn set_attr(&mut self, name: &str, value: Value) -> Result<(), String> {
        match &mut self.kind {
            ValueKind::Map(m) => {
                Arc::make_mut(m).insert(name.to_string(), value);
                Ok(())
            }
            ValueKind::Object(o) => o.set_attr(name, value),
            ValueKind::Seq(_) => match name.parse::<i64>() {
                Ok(idx) => self.set_item(&Value::from(idx), value),
                Err(_) => Err(format!("cannot set attribute '{}' on sequence", name)),
            },
            _ => Err(format!(
                "cannot set attribute '{}' on {}",
                name,
                self.type_name()
            )),
        }
    }

    pub fn set_item(&mut self, key: &Value, value: Value) -> Result<(), String> {
        let type_name = self.type_name();
        match (&mut self.kind, &key.kind) {
            (ValueKind::Seq(s), ValueKind::Int(i)) => {
                let len = s.len();
                let idx = normalize_index(*i, len)
                    .ok_or_else(|| format!("index {} out of range for length {}", i, len))?;
                Arc::make_mut(s)[idx] = value;
                Ok(())
            }
            (ValueKind::Map(m), ValueKind::Str(k)) => {
                Arc::make_mut(m).insert(k.clone(), value);
                Ok(())
            }
            (ValueKind::Map(m), ValueKind::Int(i)) => {
                Arc::make_mut(m).insert(i.to_string(), value);
                Ok(())
            }
            (ValueKind::Object(o), _) => o.set_item(key, value),
            _ => Err(format!(
                "cannot set item of type {} on {}",
                key.type_name(),
                type_name
            )),
        }
    }

    /// Mutable access to a direct child of a native sequence or mapping.
    fn child_mut(&mut self, key: &Value) -> Option<&mut Value> {
        match (&mut self.kind, &key.kind) {
            (ValueKind::Map(m), ValueKind::Str(k)) => Arc::make_mut(m).get_mut(k.as_str()),
            (ValueKind::Map(m), ValueKind::Int(i)) => Arc::make_mut(m).get_mut(&i.to_string()),
            (ValueKind::Seq(s), ValueKind::Int(i)) => {
                let idx = normalize_index(*i, s.len())?;
                Arc::make_mut(s).get_mut(idx)
            }
            (ValueKind::Seq(s), ValueKind::Str(k)) => {
                let idx = normalize_index(k.parse().ok()?, s.len())?;
                Arc::make_mut(s).get_mut(idx)
            }
            _ => None,
        }
    }

    /// Walks a key path through native containers, returning the slot at its end.
    pub fn path_mut(&mut self, path: &[Value]) -> Option<&mut Value> {
        let mut current = self;
        for key in path {
            current = current.child_mut(key)?;
        }
        Some(current)
    }

    /// Assigns `value` at the end of `path`. Intermediate host objects are read,
    /// updated and written back so nested assignment works through them too.
    pub fn set_path(&mut self, path: &[Value], value: Value) -> Result<(), String> {
        let Some((key, rest)) = path.split_first() else {
            *self = value;
            return Ok(());
        };
        if rest.is_empty() {
            return match key.as_str() {
                Some(name) => self.set_attr(name, value),
                None => self.set_item(key, value),
            };
        }
        if let Some(child) = self.child_mut(key) {
            return child.set_path(rest, value);
        }
        if let ValueKind::Object(o) = &self.kind {
            let mut child = o
                .get_item(key)
                .ok_or_else(|| format!("object has no attribute or item {}", key.repr()))?;
            child.set_path(rest, value)?;
            return o.set_item(key, child);
        }
        Err(format!(
            "cannot assign through {} with key {}",
            self.type_name(),
            key.repr()
        ))
    }

    /// `(key, value)` pairs: index keys for sequences and strings, sorted keys for
    /// mappings, whatever the object yields for host objects. `None` when the
    /// value is not iterable.
    pub fn try_iter(&self) -> Option<Vec<(Value, Value)>> {
        match &self.kind {
            ValueKind::Seq(s) => Some(
                s.iter()
                    .enumerate()
                    .map(|(i, v)| (Value::from(i as i64), v.clone()))
                    .collect(),
            ),
            ValueKind::Map(m) => Some(
                m.iter()
                    .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                    .collect(),
            ),
            ValueKind::Str(s) => Some(
                s.chars()
                    .enumerate()
                    .map(|(i, c)| (Value::from(i as i64), Value::from(c.to_string())))
                    .collect(),
            ),
            ValueKind::Undefined => Some(Vec::new()),
            ValueKind::Object(o) => o.iter(),
            _ => None,
        }
    }

    /// The values a `for` loop or a filter sees: elements for sequences and
    /// strings, keys for mappings.
    pub fn iter_values(&self) -> Option<Vec<Value>> {
        let pairs = self.try_iter()?;
        Some(match &self.kind {
            ValueKind::Map(_) => pairs.into_iter().map(|(k, _)| k).collect(),
            _ => pairs.into_iter().map(|(_, v)| v).collect(),
        })
    }

    pub fn contains(&self, needle: &Value) -> Result<bool, String> {
        match &self.kind {
            ValueKind::Seq(s) => Ok(s.iter().any(|v| v == needle)),
            ValueKind::Map(m) => Ok(match &needle.kind {
                ValueKind::Str(k) => m.contains_key(k),
                ValueKind::Int(i) => m.contains_key(&i.to_string()),
                _ => false,
            }),
            ValueKind::Str(s) => match &needle.kind {
                ValueKind::Str(n) => Ok(s.contains(n.as_str())),
                _ => Err(format!(
                    "'in <string>' requires string as left operand, not {}",
                    needle.type_name()
                )),
            },
            ValueKind::Object(o) => match o.iter() {
                Some(items) => Ok(items.iter().any(|(_, v)| v == needle)),
                None => Ok(o.get_item(needle).is_some()),
            },
            _ => Err(format!(
                "argument of type '{}' is not iterable",
                self.type_name()
            )),
        }
    }

    /// Python-like representation used inside containers and for debugging.
    pub fn repr(&self) -> String {
        match &self.kind {
            ValueKind::None => "None".to_string(),
            ValueKind::Undefined => "Undefined".to_string(),
            ValueKind::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            _ => self.to_string(),
        }
    }

    /// The printed form of the value, HTML-escaped when `autoescape` is on and
    /// the value is not marked safe.
    pub fn render(&self, autoescape: bool) -> Cow<'_, str> {
        let text: Cow<'_, str> = match &self.kind {
            ValueKind::Str(s) => Cow::Borrowed(s.as_str()),
            _ => Cow::Owned(self.to_string()),
        };
        if autoescape
            && !self.safe
            && let Cow::Owned(escaped) = escape_html(&text)
        {
            return Cow::Owned(escaped);
        }
        text
    }
}

/// HTML/XML escaping of `& < > ' "`.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if idx < 0 { idx + len } else { idx };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let adjust = |v: i64| if v < 0 { v + len } else { v };
    let mut out = Vec::new();
    if step > 0 {
        let start = start.map(|v| clamp(adjust(v), 0, len)).unwrap_or(0);
        let stop = stop.map(|v| clamp(adjust(v), 0, len)).unwrap_or(len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = start.map(|v| clamp(adjust(v), -1, len - 1)).unwrap_or(len - 1);
        let stop = stop.map(|v| clamp(adjust(v), -1, len - 1)).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::None | ValueKind::Undefined => Ok(()),
            ValueKind::Bool(true) => f.write_str("True"),
            ValueKind::Bool(false) => f.write_str("False"),
            ValueKind::Int(n) => write!(f, "{}", n),
            ValueKind::Float(n) => f.write_str(&format_float(*n)),
            ValueKind::Str(s) => f.write_str(s),
            ValueKind::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
            ValueKind::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{}': {}", k, v.repr())?;
                }
                f.write_str("}")
            }
            ValueKind::Macro(m) => write!(f, "<macro {}>", m.def.name),
            ValueKind::Object(o) => o.render(f),
            ValueKind::Error(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Object(o) => write!(f, "Object({:?})", o),
            ValueKind::Error(e) => write!(f, "Error({:?})", e),
            _ if self.safe => write!(f, "Safe({})", self.repr()),
            _ => f.write_str(&self.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Undefined, ValueKind::Undefined) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Str(a), ValueKind::Str(b)) => a == b,
            (ValueKind::Seq(a), ValueKind::Seq(b)) => a == b,
            (ValueKind::Map(a), ValueKind::Map(b)) => a == b,
            (ValueKind::Macro(a), ValueKind::Macro(b)) => Arc::ptr_eq(a, b),
            (ValueKind::Object(a), ValueKind::Object(b)) => Arc::ptr_eq(a, b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) if self.is_number() && other.is_number() => a == b,
                _ => false,
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (&self.kind, &other.kind) {
            (ValueKind::Int(a), ValueKind::Int(b)) => Some(a.cmp(b)),
            (ValueKind::Str(a), ValueKind::Str(b)) => Some(a.cmp(b)),
            (ValueKind::Bool(a), ValueKind::Bool(b)) => Some(a.cmp(b)),
            (ValueKind::Seq(a), ValueKind::Seq(b)) => a.iter().partial_cmp(b.iter()),
            _ if self.is_number() && other.is_number() => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NONE
    }
}

/// Convenience for building evaluation errors as values.
pub(crate) fn eval_error(pos: Position, message: impl Into<String>) -> Value {
    Value::from_error(Error::eval(pos, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(items: Vec<Value>) -> Value {
        Value::from_seq(items)
    }

    #[test]
    fn test_truthiness_table() {
        let cases = [
            (Value::from(0), false),
            (Value::from(1), true),
            (Value::from(""), false),
            (Value::from("x"), true),
            (seq(vec![]), false),
            (seq(vec![Value::from(1)]), true),
            (Value::NONE, false),
            (Value::UNDEFINED, false),
            (Value::from(0.0), false),
            (Value::from_map(Map::new()), false),
        ];
        for (value, expected) in cases {
            assert_eq!(value.is_true(), expected, "{:?}", value);
        }
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(
            Value::from(1).partial_cmp(&Value::from(1.5)),
            Some(Ordering::Less)
        );
        assert_ne!(Value::from(1), Value::from("1"));
        assert_eq!(Value::from(1).partial_cmp(&Value::from("a")), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::NONE.to_string(), "");
        assert_eq!(Value::from(true).to_string(), "True");
        assert_eq!(Value::from(2.0).to_string(), "2.0");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        let list = seq(vec![Value::from(1), Value::from("a"), Value::NONE]);
        assert_eq!(list.to_string(), "[1, 'a', None]");
    }

    #[test]
    fn test_map_iteration_is_sorted() {
        let mut map = Map::new();
        map.insert("b".into(), Value::from(2));
        map.insert("a".into(), Value::from(1));
        map.insert("c".into(), Value::from(3));
        let keys: Vec<String> = Value::from_map(map)
            .try_iter()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_item_and_slice_access() {
        let list = seq((1..=5).map(Value::from).collect());
        assert_eq!(list.get_item(&Value::from(-1)), Some(Value::from(5)));
        assert_eq!(list.get_attr("0"), Some(Value::from(1)));
        assert_eq!(list.get_item(&Value::from(9)), None);
        let sliced = list.get_slice(Some(1), Some(3), None).unwrap();
        assert_eq!(sliced, seq(vec![Value::from(2), Value::from(3)]));
        let reversed = Value::from("abc").get_slice(None, None, Some(-1)).unwrap();
        assert_eq!(reversed, Value::from("cba"));
    }

    #[test]
    fn test_set_path_copy_on_write() {
        let mut inner = Map::new();
        inner.insert("name".into(), Value::from("old"));
        let mut outer = Map::new();
        outer.insert("user".into(), Value::from_map(inner));
        let original = Value::from_map(outer);

        let mut copy = original.clone();
        copy.set_path(&[Value::from("user"), Value::from("name")], Value::from("new"))
            .unwrap();

        let read = |v: &Value| v.get_attr("user").unwrap().get_attr("name").unwrap();
        assert_eq!(read(&copy), Value::from("new"));
        assert_eq!(read(&original), Value::from("old"));
    }

    #[test]
    fn test_error_round_trip_keeps_detail() {
        let err = Error::eval(Position::new(2, 4), "boom");
        let value = Value::from_error(err.clone());
        assert!(value.is_error());
        assert!(!value.is_true());
        assert_eq!(value.into_result().unwrap_err(), err);
    }

    #[test]
    fn test_render_escapes_unless_safe() {
        let raw = Value::from("<b>");
        assert_eq!(raw.render(true), "&lt;b&gt;");
        assert_eq!(raw.render(false), "<b>");
        assert_eq!(Value::safe_string("<b>").render(true), "<b>");
    }
}
