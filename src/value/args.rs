use crate::error::Error;
use crate::value::{FromValue, Map, Value};

/// Arguments handed to a filter, test, method or macro call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub kwargs: Map,
}

/// A declared parameter: a name and, for optional parameters, its default.
#[derive(Debug, Clone)]
pub struct Param {
    name: &'static str,
    default: Option<Value>,
}

impl Param {
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            default: None,
        }
    }

    pub fn optional(name: &'static str, default: impl Into<Value>) -> Self {
        Self {
            name,
            default: Some(default.into()),
        }
    }
}

impl Args {
    pub fn new(positional: Vec<Value>, kwargs: Map) -> Self {
        Self { positional, kwargs }
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            kwargs: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.kwargs.is_empty()
    }

    /// Binds positional arguments in declared order, then keywords by name,
    /// then fills the remaining parameters from their defaults.
    pub fn bind(&self, name: &str, params: &[Param]) -> Result<Bound, Error> {
        if self.positional.len() > params.len() {
            return Err(Error::invalid_call(
                name,
                format!(
                    "takes at most {} argument(s), {} given",
                    params.len(),
                    self.positional.len()
                ),
            ));
        }
        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, value) in slots.iter_mut().zip(&self.positional) {
            *slot = Some(value.clone());
        }
        for (key, value) in &self.kwargs {
            let idx = params
                .iter()
                .position(|p| p.name == key)
                .ok_or_else(|| {
                    Error::invalid_call(name, format!("unexpected keyword argument '{}'", key))
                })?;
            if slots[idx].is_some() {
                return Err(Error::invalid_call(
                    name,
                    format!("got multiple values for argument '{}'", key),
                ));
            }
            slots[idx] = Some(value.clone());
        }
        let mut values = Vec::with_capacity(params.len());
        for (param, slot) in params.iter().zip(slots) {
            let value = match slot.or_else(|| param.default.clone()) {
                Some(v) => v,
                None => {
                    return Err(Error::invalid_call(
                        name,
                        format!("missing required argument '{}'", param.name),
                    ));
                }
            };
            values.push((param.name, value));
        }
        Ok(Bound {
            name: name.to_string(),
            values,
        })
    }
}

/// Arguments after binding, with typed accessors.
#[derive(Debug, Clone)]
pub struct Bound {
    name: String,
    values: Vec<(&'static str, Value)>,
}

impl Bound {
    fn fail(&self, param: &str, e: impl std::fmt::Display) -> Error {
        Error::invalid_call(&self.name, format!("argument '{}': {}", param, e))
    }

    /// The bound value, or undefined for an undeclared name.
    pub fn value(&self, param: &str) -> Value {
        self.values
            .iter()
            .find(|(n, _)| *n == param)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::UNDEFINED)
    }

    pub fn get<T: FromValue>(&self, param: &str) -> Result<T, Error> {
        T::from_value(self.value(param)).map_err(|e| self.fail(param, e))
    }

    pub fn string(&self, param: &str) -> Result<String, Error> {
        self.get(param)
    }

    pub fn opt_string(&self, param: &str) -> Result<Option<String>, Error> {
        self.get(param)
    }

    pub fn int(&self, param: &str) -> Result<i64, Error> {
        self.get(param)
    }

    pub fn float(&self, param: &str) -> Result<f64, Error> {
        self.get(param)
    }

    pub fn bool(&self, param: &str) -> Result<bool, Error> {
        self.get(param)
    }

    pub fn list(&self, param: &str) -> Result<Vec<Value>, Error> {
        let value = self.value(param);
        value
            .iter_values()
            .ok_or_else(|| self.fail(param, format!("expected a sequence, got {}", value.type_name())))
    }

    /// A string restricted to an enumerated set of choices.
    pub fn one_of(&self, param: &str, choices: &[&str]) -> Result<String, Error> {
        let s = self.string(param)?;
        if choices.contains(&s.as_str()) {
            Ok(s)
        } else {
            Err(self.fail(
                param,
                format!("expected one of {}, got '{}'", choices.join(", "), s),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Param> {
        vec![
            Param::required("value"),
            Param::optional("method", "common"),
            Param::optional("precision", 0),
        ]
    }

    #[test]
    fn test_positional_then_keywords_then_defaults() {
        let mut kwargs = Map::new();
        kwargs.insert("method".into(), Value::from("floor"));
        let args = Args::new(vec![Value::from(2.5)], kwargs);
        let bound = args.bind("round", &params()).unwrap();
        assert_eq!(bound.float("value").unwrap(), 2.5);
        assert_eq!(
            bound.one_of("method", &["common", "ceil", "floor"]).unwrap(),
            "floor"
        );
        assert_eq!(bound.int("precision").unwrap(), 0);
    }

    #[test]
    fn test_binding_failures_are_invalid_call() {
        let too_many = Args::positional(vec![Value::from(1); 4]);
        assert!(matches!(
            too_many.bind("round", &params()),
            Err(Error::InvalidCall { .. })
        ));

        let mut kwargs = Map::new();
        kwargs.insert("value".into(), Value::from(1));
        let duplicate = Args::new(vec![Value::from(1)], kwargs);
        assert!(duplicate.bind("round", &params()).is_err());

        let mut kwargs = Map::new();
        kwargs.insert("nope".into(), Value::from(1));
        assert!(Args::new(vec![], kwargs).bind("round", &params()).is_err());

        assert!(Args::default().bind("round", &params()).is_err());
    }

    #[test]
    fn test_typed_extraction_errors() {
        let args = Args::positional(vec![Value::from("x"), Value::from("bogus")]);
        let bound = args.bind("round", &params()).unwrap();
        assert!(matches!(bound.int("value"), Err(Error::InvalidCall { .. })));
        assert!(bound.one_of("method", &["common"]).is_err());
        assert!(bound.list("precision").is_err());
    }
}
