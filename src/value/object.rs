use crate::value::Value;
use std::fmt;

/// A live host structure exposed to templates without converting it up front.
///
/// Only `get_attr` is required. Mutation goes through `&self`, so implementors
/// that accept `{% set obj.field = ... %}` use interior mutability.
pub trait Object: fmt::Debug + Send + Sync {
    fn get_attr(&self, name: &str) -> Option<Value>;

    fn set_attr(&self, name: &str, _value: Value) -> Result<(), String> {
        Err(format!("object does not support setting attribute '{}'", name))
    }

    fn get_item(&self, key: &Value) -> Option<Value> {
        key.as_str().and_then(|k| self.get_attr(k))
    }

    fn set_item(&self, key: &Value, value: Value) -> Result<(), String> {
        match key.as_str() {
            Some(k) => self.set_attr(k, value),
            None => Err(format!("object does not support item {}", key.repr())),
        }
    }

    fn len(&self) -> Option<usize> {
        None
    }

    /// `(key, value)` pairs for `for` loops; `None` when not iterable.
    fn iter(&self) -> Option<Vec<(Value, Value)>> {
        None
    }

    fn is_true(&self) -> bool {
        true
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Counter {
        hits: Mutex<i64>,
    }

    impl Object for Counter {
        fn get_attr(&self, name: &str) -> Option<Value> {
            (name == "hits").then(|| Value::from(*self.hits.lock().unwrap()))
        }

        fn set_attr(&self, name: &str, value: Value) -> Result<(), String> {
            match (name, value.as_i64()) {
                ("hits", Some(n)) => {
                    *self.hits.lock().unwrap() = n;
                    Ok(())
                }
                _ => Err(format!("cannot set {}", name)),
            }
        }
    }

    #[test]
    fn test_object_access_through_value() {
        let mut value = Value::from_object(Counter::default());
        assert_eq!(value.get_attr("hits"), Some(Value::from(0)));
        assert_eq!(value.get_item(&Value::from("hits")), Some(Value::from(0)));

        let shared = value.clone();
        value.set_attr("hits", Value::from(3)).unwrap();
        assert_eq!(shared.get_attr("hits"), Some(Value::from(3)));
        assert!(value.set_attr("other", Value::from(1)).is_err());
        assert!(!value.is_iterable());
    }
}
