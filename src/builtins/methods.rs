use super::Methods;
use crate::Result;
use crate::error::Error;
use crate::value::{Args, Map, Param, Value, ValueKind};
use std::sync::Arc;

fn unsupported(method: &str, receiver: &Value) -> Error {
    Error::invalid_call(
        method,
        format!("{} has no method '{}'", receiver.type_name(), method),
    )
}

fn seq_mut<'v>(method: &str, receiver: &'v mut Value) -> Result<&'v mut Vec<Value>> {
    let type_name = receiver.type_name();
    match receiver.kind_mut() {
        ValueKind::Seq(items) => Ok(Arc::make_mut(items)),
        _ => Err(Error::invalid_call(
            method,
            format!("{} has no method '{}'", type_name, method),
        )),
    }
}

fn map_mut<'v>(method: &str, receiver: &'v mut Value) -> Result<&'v mut Map> {
    let type_name = receiver.type_name();
    match receiver.kind_mut() {
        ValueKind::Map(map) => Ok(Arc::make_mut(map)),
        _ => Err(Error::invalid_call(
            method,
            format!("{} has no method '{}'", type_name, method),
        )),
    }
}

fn as_list<'v>(method: &str, receiver: &'v Value) -> Result<&'v [Value]> {
    receiver.as_seq().ok_or_else(|| unsupported(method, receiver))
}

fn as_map<'v>(method: &str, receiver: &'v Value) -> Result<&'v Map> {
    receiver.as_map().ok_or_else(|| unsupported(method, receiver))
}

fn map_key(method: &str, key: &Value) -> Result<String> {
    match key.kind() {
        ValueKind::Str(s) => Ok(s.clone()),
        ValueKind::Int(n) => Ok(n.to_string()),
        _ => Err(Error::invalid_call(
            method,
            format!("unsupported key type {}", key.type_name()),
        )),
    }
}

/// Python-style index into a list of `len` items, negative counting from the end.
fn list_index(method: &str, index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if (0..len as i64).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(Error::invalid_call(method, format!("index {} out of range", index)))
    }
}

fn string_method(
    method: &'static str,
    f: fn(&str, &Args) -> Result<Value>,
) -> impl Fn(&mut Value, &Args) -> Result<Value> + Send + Sync + 'static {
    move |receiver: &mut Value, args: &Args| match receiver.as_str() {
        Some(s) => f(s, args),
        None => Err(unsupported(method, receiver)),
    }
}

fn strip(method: &str, s: &str, args: &Args, left: bool, right: bool) -> Result<Value> {
    let chars = args
        .bind(method, &[Param::optional("chars", Value::NONE)])?
        .opt_string("chars")?;
    let matcher = |c: char| match &chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matcher);
    }
    if right {
        out = out.trim_end_matches(matcher);
    }
    Ok(Value::from(out))
}

/// `"{} and {}".format(a, b)`: positional `{}`/`{0}` and named `{name}`
/// fields; `{{` and `}}` are literal braces.
fn format(template: &str, args: &Args) -> Result<Value> {
    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => return Err(Error::invalid_call("format", "unclosed '{' in format string")),
                    }
                }
                let value = if field.is_empty() {
                    next += 1;
                    args.positional.get(next - 1)
                } else if let Ok(index) = field.parse::<usize>() {
                    args.positional.get(index)
                } else {
                    args.kwargs.get(&field)
                };
                let value = value.ok_or_else(|| {
                    Error::invalid_call("format", format!("no argument for field '{{{}}}'", field))
                })?;
                match value.as_str() {
                    Some(s) => out.push_str(s),
                    None => out.push_str(&value.to_string()),
                }
            }
            '}' => return Err(Error::invalid_call("format", "single '}' in format string")),
            other => out.push(other),
        }
    }
    Ok(Value::from(out))
}

fn register_lists(registry: &mut Methods) {
    registry
        .register("append", |receiver, args| {
            let item = args.bind("append", &[Param::required("item")])?.value("item");
            seq_mut("append", receiver)?.push(item);
            Ok(Value::NONE)
        })
        .register("extend", |receiver, args| {
            let items = args.bind("extend", &[Param::required("items")])?.list("items")?;
            seq_mut("extend", receiver)?.extend(items);
            Ok(Value::NONE)
        })
        .register("insert", |receiver, args| {
            let bound = args.bind("insert", &[Param::required("index"), Param::required("item")])?;
            let index = bound.int("index")?;
            let items = seq_mut("insert", receiver)?;
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, bound.value("item"));
            Ok(Value::NONE)
        })
        .register("reverse", |receiver, args| {
            args.bind("reverse", &[])?;
            seq_mut("reverse", receiver)?.reverse();
            Ok(Value::NONE)
        })
        .register("index", |receiver, args| {
            let item = args.bind("index", &[Param::required("item")])?.value("item");
            let items = as_list("index", receiver)?;
            items
                .iter()
                .position(|v| *v == item)
                .map(Value::from)
                .ok_or_else(|| Error::invalid_call("index", format!("{} is not in list", item.repr())))
        })
        .register("count", |receiver, args| {
            let item = args.bind("count", &[Param::required("item")])?.value("item");
            match receiver.kind() {
                ValueKind::Seq(items) => Ok(Value::from(items.iter().filter(|v| **v == item).count())),
                ValueKind::Str(s) => {
                    let needle = item
                        .as_str()
                        .ok_or_else(|| Error::invalid_call("count", "expected a string argument"))?;
                    Ok(Value::from(s.matches(needle).count()))
                }
                _ => Err(unsupported("count", receiver)),
            }
        });
}

fn register_maps(registry: &mut Methods) {
    registry
        .register("items", |receiver, args| {
            args.bind("items", &[])?;
            let map = as_map("items", receiver)?;
            let pairs = map
                .iter()
                .map(|(k, v)| Value::from_seq(vec![Value::from(k.as_str()), v.clone()]));
            Ok(Value::from_seq(pairs.collect()))
        })
        .register("keys", |receiver, args| {
            args.bind("keys", &[])?;
            let map = as_map("keys", receiver)?;
            Ok(Value::from_seq(map.keys().map(|k| Value::from(k.as_str())).collect()))
        })
        .register("values", |receiver, args| {
            args.bind("values", &[])?;
            let map = as_map("values", receiver)?;
            Ok(Value::from_seq(map.values().cloned().collect()))
        })
        .register("get", |receiver, args| {
            let bound = args.bind(
                "get",
                &[Param::required("key"), Param::optional("default", Value::NONE)],
            )?;
            let map = as_map("get", receiver)?;
            let key = map_key("get", &bound.value("key"))?;
            Ok(map.get(&key).cloned().unwrap_or_else(|| bound.value("default")))
        })
        .register("update", |receiver, args| {
            let other = args.bind("update", &[Param::required("other")])?.value("other");
            let other = other
                .as_map()
                .ok_or_else(|| Error::invalid_call("update", "expected a mapping argument"))?;
            map_mut("update", receiver)?.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::NONE)
        })
        .register("pop", |receiver, args| {
            if receiver.is_map() {
                let bound = args.bind(
                    "pop",
                    &[Param::required("key"), Param::optional("default", Value::UNDEFINED)],
                )?;
                let key = map_key("pop", &bound.value("key"))?;
                let default = bound.value("default");
                return match map_mut("pop", receiver)?.remove(&key) {
                    Some(value) => Ok(value),
                    None if !default.is_undefined() => Ok(default),
                    None => Err(Error::invalid_call("pop", format!("key '{}' not found", key))),
                };
            }
            let bound = args.bind("pop", &[Param::optional("index", -1)])?;
            let index = bound.int("index")?;
            let items = seq_mut("pop", receiver)?;
            let at = list_index("pop", index, items.len())?;
            Ok(items.remove(at))
        });
}

fn register_strings(registry: &mut Methods) {
    registry
        .register("upper", string_method("upper", |s, args| {
            args.bind("upper", &[])?;
            Ok(Value::from(s.to_uppercase()))
        }))
        .register("lower", string_method("lower", |s, args| {
            args.bind("lower", &[])?;
            Ok(Value::from(s.to_lowercase()))
        }))
        .register("strip", string_method("strip", |s, args| strip("strip", s, args, true, true)))
        .register("lstrip", string_method("lstrip", |s, args| strip("lstrip", s, args, true, false)))
        .register("rstrip", string_method("rstrip", |s, args| strip("rstrip", s, args, false, true)))
        .register("split", string_method("split", |s, args| {
            let bound = args.bind(
                "split",
                &[Param::optional("sep", Value::NONE), Param::optional("maxsplit", -1)],
            )?;
            let max = bound.int("maxsplit")?;
            let parts: Vec<Value> = match bound.opt_string("sep")? {
                Some(sep) if sep.is_empty() => {
                    return Err(Error::invalid_call("split", "empty separator"));
                }
                Some(sep) if max >= 0 => s.splitn(max as usize + 1, sep.as_str()).map(Value::from).collect(),
                Some(sep) => s.split(sep.as_str()).map(Value::from).collect(),
                None => s.split_whitespace().map(Value::from).collect(),
            };
            Ok(Value::from_seq(parts))
        }))
        .register("startswith", string_method("startswith", |s, args| {
            let prefix = args.bind("startswith", &[Param::required("prefix")])?.string("prefix")?;
            Ok(Value::from(s.starts_with(&prefix)))
        }))
        .register("endswith", string_method("endswith", |s, args| {
            let suffix = args.bind("endswith", &[Param::required("suffix")])?.string("suffix")?;
            Ok(Value::from(s.ends_with(&suffix)))
        }))
        .register("replace", string_method("replace", |s, args| {
            let bound = args.bind("replace", &[Param::required("old"), Param::required("new")])?;
            Ok(Value::from(s.replace(&bound.string("old")?, &bound.string("new")?)))
        }))
        .register("join", string_method("join", |s, args| {
            let items = args.bind("join", &[Param::required("items")])?.list("items")?;
            let parts: Vec<String> = items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect();
            Ok(Value::from(parts.join(s)))
        }))
        .register("format", string_method("format", format));
}

pub(super) fn register_all(registry: &mut Methods) {
    register_lists(registry);
    register_maps(registry);
    register_strings(registry);
}
