use super::Filters;
use crate::Result;
use crate::error::Error;
use crate::value::{Args, Param, Value, ValueKind, escape_html};
use std::cmp::Ordering;

fn expect_str<'v>(filter: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        Error::invalid_call(filter, format!("expected a string, got {}", value.type_name()))
    })
}

/// Strings are used as is; anything else through its printed form.
fn text(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn items(filter: &str, value: &Value) -> Result<Vec<Value>> {
    value.iter_values().ok_or_else(|| {
        Error::invalid_call(filter, format!("'{}' object is not iterable", value.type_name()))
    })
}

fn no_args(filter: &str, args: &Args) -> Result<()> {
    args.bind(filter, &[]).map(|_| ())
}

/// Keeps the safe flag of the input on a string result.
fn same_safety(input: &Value, output: String) -> Value {
    if input.is_safe() {
        Value::safe_string(output)
    } else {
        Value::from(output)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if boundary {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(c);
            boundary = true;
        }
    }
    out
}

fn length(value: &Value, args: &Args) -> Result<Value> {
    no_args("length", args)?;
    let len = match value.kind() {
        ValueKind::Str(s) => s.chars().count(),
        _ => value.len().ok_or_else(|| {
            Error::invalid_call("length", format!("{} has no length", value.type_name()))
        })?,
    };
    Ok(Value::from(len))
}

fn default(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind(
        "default",
        &[
            Param::optional("default_value", ""),
            Param::optional("boolean", false),
        ],
    )?;
    let replace = value.is_undefined() || (bound.bool("boolean")? && !value.is_true());
    Ok(if replace {
        bound.value("default_value")
    } else {
        value.clone()
    })
}

fn join(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind(
        "join",
        &[Param::optional("d", ""), Param::optional("attribute", Value::NONE)],
    )?;
    let separator = bound.string("d")?;
    let attribute = bound.opt_string("attribute")?;
    let parts: Vec<String> = items("join", value)?
        .iter()
        .map(|item| match &attribute {
            Some(attr) => item.get_attr(attr).map(|v| text(&v)).unwrap_or_default(),
            None => text(item),
        })
        .collect();
    Ok(Value::from(parts.join(&separator)))
}

fn escape(value: &Value, args: &Args) -> Result<Value> {
    no_args("escape", args)?;
    if value.is_safe() {
        return Ok(value.clone());
    }
    Ok(Value::safe_string(escape_html(&text(value)).into_owned()))
}

fn to_int(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind("int", &[Param::optional("default", 0)])?;
    let converted = match value.kind() {
        ValueKind::Int(n) => Some(*n),
        ValueKind::Bool(b) => Some(i64::from(*b)),
        ValueKind::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        ValueKind::Str(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    };
    Ok(converted.map(Value::from).unwrap_or_else(|| bound.value("default")))
}

fn to_float(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind("float", &[Param::optional("default", 0.0)])?;
    let converted = match value.kind() {
        ValueKind::Str(s) => s.trim().parse::<f64>().ok(),
        ValueKind::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => value.as_f64(),
    };
    Ok(converted.map(Value::from).unwrap_or_else(|| bound.value("default")))
}

fn abs(value: &Value, args: &Args) -> Result<Value> {
    no_args("abs", args)?;
    match value.kind() {
        ValueKind::Int(n) => n
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| Error::invalid_call("abs", "integer overflow")),
        ValueKind::Float(f) => Ok(Value::from(f.abs())),
        _ => Err(Error::invalid_call(
            "abs",
            format!("expected a number, got {}", value.type_name()),
        )),
    }
}

fn first(value: &Value, args: &Args) -> Result<Value> {
    no_args("first", args)?;
    Ok(items("first", value)?.into_iter().next().unwrap_or(Value::UNDEFINED))
}

fn last(value: &Value, args: &Args) -> Result<Value> {
    no_args("last", args)?;
    Ok(items("last", value)?.pop().unwrap_or(Value::UNDEFINED))
}

fn reverse(value: &Value, args: &Args) -> Result<Value> {
    no_args("reverse", args)?;
    if let Some(s) = value.as_str() {
        return Ok(same_safety(value, s.chars().rev().collect()));
    }
    let mut values = items("reverse", value)?;
    values.reverse();
    Ok(Value::from_seq(values))
}

fn sort(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind(
        "sort",
        &[
            Param::optional("reverse", false),
            Param::optional("attribute", Value::NONE),
        ],
    )?;
    let attribute = bound.opt_string("attribute")?;
    let key = |v: &Value| match &attribute {
        Some(attr) => v.get_attr(attr).unwrap_or(Value::UNDEFINED),
        None => v.clone(),
    };
    let mut values = items("sort", value)?;
    let mut failure = None;
    values.sort_by(|a, b| {
        let (a, b) = (key(a), key(b));
        a.partial_cmp(&b).unwrap_or_else(|| {
            failure.get_or_insert_with(|| {
                format!("cannot compare {} with {}", a.type_name(), b.type_name())
            });
            Ordering::Equal
        })
    });
    if let Some(reason) = failure {
        return Err(Error::invalid_call("sort", reason));
    }
    if bound.bool("reverse")? {
        values.reverse();
    }
    Ok(Value::from_seq(values))
}

fn replace(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind(
        "replace",
        &[
            Param::required("old"),
            Param::required("new"),
            Param::optional("count", Value::NONE),
        ],
    )?;
    let s = expect_str("replace", value)?;
    let (old, new) = (bound.string("old")?, bound.string("new")?);
    let replaced = match bound.get::<Option<i64>>("count")? {
        Some(count) => s.replacen(&old, &new, count.max(0) as usize),
        None => s.replace(&old, &new),
    };
    Ok(same_safety(value, replaced))
}

fn round(value: &Value, args: &Args) -> Result<Value> {
    let bound = args.bind(
        "round",
        &[
            Param::optional("precision", 0),
            Param::optional("method", "common"),
        ],
    )?;
    let precision = bound.int("precision")?;
    let method = bound.one_of("method", &["common", "ceil", "floor"])?;
    let number = value.as_f64().filter(|_| value.is_number()).ok_or_else(|| {
        Error::invalid_call("round", format!("expected a number, got {}", value.type_name()))
    })?;
    let factor = 10f64.powi(precision.clamp(-308, 308) as i32);
    let scaled = number * factor;
    let rounded = match method.as_str() {
        "ceil" => scaled.ceil(),
        "floor" => scaled.floor(),
        _ => scaled.round(),
    };
    Ok(Value::from(rounded / factor))
}

fn mapping<'v>(filter: &str, value: &'v Value) -> Result<&'v crate::value::Map> {
    value.as_map().ok_or_else(|| {
        Error::invalid_call(filter, format!("expected a mapping, got {}", value.type_name()))
    })
}

pub(super) fn register_all(registry: &mut Filters) {
    registry
        .register("upper", |v, args| {
            no_args("upper", args)?;
            Ok(same_safety(v, expect_str("upper", v)?.to_uppercase()))
        })
        .register("lower", |v, args| {
            no_args("lower", args)?;
            Ok(same_safety(v, expect_str("lower", v)?.to_lowercase()))
        })
        .register("capitalize", |v, args| {
            no_args("capitalize", args)?;
            Ok(same_safety(v, capitalize(expect_str("capitalize", v)?)))
        })
        .register("title", |v, args| {
            no_args("title", args)?;
            Ok(same_safety(v, title(expect_str("title", v)?)))
        })
        .register("trim", |v, args| {
            let bound = args.bind("trim", &[Param::optional("chars", Value::NONE)])?;
            let s = expect_str("trim", v)?;
            let trimmed = match bound.opt_string("chars")? {
                Some(chars) => s.trim_matches(|c| chars.contains(c)),
                None => s.trim(),
            };
            Ok(same_safety(v, trimmed.to_string()))
        })
        .register("length", length)
        .register("count", length)
        .register("default", default)
        .register("d", default)
        .register("join", join)
        .register("safe", |v, args| {
            no_args("safe", args)?;
            Ok(match v.kind() {
                ValueKind::Str(_) => v.clone().mark_safe(),
                _ => Value::safe_string(v.to_string()),
            })
        })
        .register("escape", escape)
        .register("e", escape)
        .register("string", |v, args| {
            no_args("string", args)?;
            Ok(same_safety(v, text(v)))
        })
        .register("int", to_int)
        .register("float", to_float)
        .register("abs", abs)
        .register("first", first)
        .register("last", last)
        .register("reverse", reverse)
        .register("sort", sort)
        .register("list", |v, args| {
            no_args("list", args)?;
            Ok(Value::from_seq(items("list", v)?))
        })
        .register("replace", replace)
        .register("round", round)
        .register("keys", |v, args| {
            no_args("keys", args)?;
            let keys = mapping("keys", v)?.keys().map(|k| Value::from(k.as_str()));
            Ok(Value::from_seq(keys.collect()))
        })
        .register("items", |v, args| {
            no_args("items", args)?;
            let pairs = mapping("items", v)?
                .iter()
                .map(|(k, v)| Value::from_seq(vec![Value::from(k.as_str()), v.clone()]));
            Ok(Value::from_seq(pairs.collect()))
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn apply(name: &str, value: impl Into<Value>, args: Vec<Value>) -> Result<Value> {
        let filters = Filters::builtin();
        let filter = filters.get(name).unwrap();
        filter(&value.into(), &Args::positional(args))
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(apply("upper", "abc", vec![]).unwrap(), Value::from("ABC"));
        assert_eq!(apply("capitalize", "hELLO", vec![]).unwrap(), Value::from("Hello"));
        assert_eq!(apply("title", "hello big-world", vec![]).unwrap(), Value::from("Hello Big-World"));
        assert_eq!(apply("trim", "  x ", vec![]).unwrap(), Value::from("x"));
        assert_eq!(
            apply("replace", "aaa", vec![Value::from("a"), Value::from("b"), Value::from(2)]).unwrap(),
            Value::from("bba")
        );
        assert!(matches!(apply("upper", 3, vec![]), Err(Error::InvalidCall { .. })));
    }

    #[test]
    fn test_default_only_replaces_undefined_unless_boolean() {
        assert_eq!(apply("default", Value::UNDEFINED, vec![Value::from("x")]).unwrap(), Value::from("x"));
        assert_eq!(apply("d", Value::NONE, vec![Value::from("x")]).unwrap(), Value::NONE);
        assert_eq!(
            apply("default", "", vec![Value::from("x"), Value::from(true)]).unwrap(),
            Value::from("x")
        );
    }

    #[test]
    fn test_sequence_filters() {
        let seq = Value::from_seq(vec![Value::from(3), Value::from(1), Value::from(2)]);
        assert_eq!(apply("length", seq.clone(), vec![]).unwrap(), Value::from(3));
        assert_eq!(apply("first", seq.clone(), vec![]).unwrap(), Value::from(3));
        assert_eq!(apply("last", seq.clone(), vec![]).unwrap(), Value::from(2));
        assert_eq!(apply("sort", seq.clone(), vec![]).unwrap().to_string(), "[1, 2, 3]");
        assert_eq!(
            apply("sort", seq.clone(), vec![Value::from(true)]).unwrap().to_string(),
            "[3, 2, 1]"
        );
        assert_eq!(apply("join", seq, vec![Value::from("-")]).unwrap(), Value::from("3-1-2"));

        let mixed = Value::from_seq(vec![Value::from(1), Value::from("a")]);
        assert!(apply("sort", mixed, vec![]).is_err());
    }

    #[test]
    fn test_numeric_filters() {
        assert_eq!(apply("int", "42", vec![]).unwrap(), Value::from(42));
        assert_eq!(apply("int", "4.7", vec![]).unwrap(), Value::from(4));
        assert_eq!(apply("int", "x", vec![Value::from(-1)]).unwrap(), Value::from(-1));
        assert_eq!(apply("float", "2.5", vec![]).unwrap(), Value::from(2.5));
        assert_eq!(apply("abs", -3, vec![]).unwrap(), Value::from(3));
        assert_eq!(apply("round", 2.567, vec![Value::from(2)]).unwrap(), Value::from(2.57));
        assert_eq!(
            apply("round", 2.1, vec![Value::from(0), Value::from("ceil")]).unwrap(),
            Value::from(3.0)
        );
        assert!(apply("round", 2.1, vec![Value::from(0), Value::from("up")]).is_err());
    }

    #[test]
    fn test_escape_and_safe() {
        let escaped = apply("escape", "<b>", vec![]).unwrap();
        assert!(escaped.is_safe());
        assert_eq!(escaped.as_str(), Some("&lt;b&gt;"));
        let safe = apply("safe", "<b>", vec![]).unwrap();
        assert!(safe.is_safe());
        assert_eq!(apply("e", safe.clone(), vec![]).unwrap(), safe);
    }

    #[test]
    fn test_mapping_filters() {
        let mut map = Map::new();
        map.insert("b".into(), Value::from(2));
        map.insert("a".into(), Value::from(1));
        let map = Value::from_map(map);
        assert_eq!(apply("keys", map.clone(), vec![]).unwrap().to_string(), "['a', 'b']");
        assert_eq!(
            apply("items", map, vec![]).unwrap().to_string(),
            "[['a', 1], ['b', 2]]"
        );
    }
}
