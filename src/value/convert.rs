use crate::error::Error;
use crate::value::{Map, Value, ValueKind};
use std::collections::{BTreeMap, HashMap};

/// Anything that can be handed to a template as a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Anything that can be rebuilt from a [`Value`], e.g. a typed filter argument.
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, Error>;
}

fn mismatch(expected: &str, v: &Value) -> Error {
    Error::TypeMismatch(format!("Expected {}, got {:?}", expected, v))
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::new(ValueKind::Bool(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::new(ValueKind::Int(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::new(ValueKind::Float(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::new(ValueKind::Str(v.to_string()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::new(ValueKind::Str(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::from_seq(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::from_map(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::NONE
    }
}

// --- integer conversions ---
macro_rules! impl_int {
    ($($rust_type:ty),*) => {$(
        impl From<$rust_type> for Value {
            fn from(v: $rust_type) -> Self {
                match i64::try_from(v) {
                    Ok(n) => Value::new(ValueKind::Int(n)),
                    Err(_) => Value::new(ValueKind::Float(v as f64)),
                }
            }
        }

        impl ToValue for $rust_type {
            fn to_value(&self) -> Value {
                Value::from(*self)
            }
        }

        impl FromValue for $rust_type {
            fn from_value(v: Value) -> Result<Self, Error> {
                match v.kind() {
                    ValueKind::Int(n) => <$rust_type>::try_from(*n).map_err(|_| {
                        Error::TypeMismatch(format!(
                            "Value {} out of range for {}",
                            n,
                            stringify!($rust_type)
                        ))
                    }),
                    ValueKind::Float(f) if f.fract() == 0.0 => {
                        <$rust_type>::try_from(*f as i64).map_err(|_| {
                            Error::TypeMismatch(format!(
                                "Value {} out of range for {}",
                                f,
                                stringify!($rust_type)
                            ))
                        })
                    }
                    _ => Err(mismatch("integer", &v)),
                }
            }
        }
    )*};
}

impl_int!(i8, i16, i32, u8, u16, u32, u64, u128, i128, usize, isize);

impl ToValue for i64 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FromValue for i64 {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.kind() {
            ValueKind::Int(n) => Ok(*n),
            ValueKind::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            _ => Err(mismatch("integer", &v)),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::from(v as f64)
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FromValue for f32 {
    fn from_value(v: Value) -> Result<Self, Error> {
        f64::from_value(v).map(|f| f as f32)
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FromValue for f64 {
    fn from_value(v: Value) -> Result<Self, Error> {
        v.as_f64().ok_or_else(|| mismatch("number", &v))
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl FromValue for bool {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.kind() {
            ValueKind::Bool(b) => Ok(*b),
            ValueKind::Int(0) => Ok(false),
            ValueKind::Int(1) => Ok(true),
            _ => Err(mismatch("bool", &v)),
        }
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::from(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl FromValue for String {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.into_kind() {
            ValueKind::Str(s) => Ok(s),
            other => Err(mismatch("string", &Value::new(other))),
        }
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::from(self)
    }
}

// Allow Value to be passed as argument
impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(v: Value) -> Result<Self, Error> {
        Ok(v)
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::NONE
    }
}

impl FromValue for () {
    fn from_value(_v: Value) -> Result<Self, Error> {
        Ok(())
    }
}

// Blanket implementation for references
impl<T> ToValue for &T
where
    T: ToValue + ?Sized,
{
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::NONE,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(v: Value) -> Result<Self, Error> {
        if v.is_none() || v.is_undefined() {
            Ok(None)
        } else {
            Ok(Some(T::from_value(v)?))
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::from_seq(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::from_seq(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.as_seq() {
            Some(items) => items.iter().cloned().map(T::from_value).collect(),
            None => Err(mismatch("sequence", &v)),
        }
    }
}

impl<A: ToValue, B: ToValue> ToValue for (A, B) {
    fn to_value(&self) -> Value {
        Value::from_seq(vec![self.0.to_value(), self.1.to_value()])
    }
}

impl<T: ToValue, S> ToValue for HashMap<String, T, S> {
    fn to_value(&self) -> Value {
        Value::from_map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.as_map() {
            Some(m) => m
                .iter()
                .map(|(k, val)| Ok((k.clone(), T::from_value(val.clone())?)))
                .collect(),
            None => Err(mismatch("mapping", &v)),
        }
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::from_map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(v: Value) -> Result<Self, Error> {
        match v.as_map() {
            Some(m) => m
                .iter()
                .map(|(k, val)| Ok((k.clone(), T::from_value(val.clone())?)))
                .collect(),
            None => Err(mismatch("mapping", &v)),
        }
    }
}
