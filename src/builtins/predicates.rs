use super::Tests;
use crate::Result;
use crate::error::Error;
use crate::value::{Args, Param, Value, ValueKind};

fn no_args(test: &str, args: &Args) -> Result<()> {
    args.bind(test, &[]).map(|_| ())
}

fn other(test: &str, args: &Args) -> Result<Value> {
    Ok(args.bind(test, &[Param::required("other")])?.value("other"))
}

fn integer(test: &str, value: &Value) -> Result<i64> {
    match value.kind() {
        ValueKind::Int(n) => Ok(*n),
        _ => Err(Error::invalid_call(
            test,
            format!("expected an integer, got {}", value.type_name()),
        )),
    }
}

fn compare(test: &str, value: &Value, other: &Value) -> Result<std::cmp::Ordering> {
    value.partial_cmp(other).ok_or_else(|| {
        Error::invalid_call(
            test,
            format!(
                "cannot compare {} with {}",
                value.type_name(),
                other.type_name()
            ),
        )
    })
}

fn kind_test(registry: &mut Tests, name: &'static str, check: fn(&Value) -> bool) {
    registry.register(name, move |v, args| {
        no_args(name, args)?;
        Ok(check(v))
    });
}

pub(super) fn register_all(registry: &mut Tests) {
    kind_test(registry, "none", Value::is_none);
    kind_test(registry, "boolean", Value::is_bool);
    kind_test(registry, "number", Value::is_number);
    kind_test(registry, "integer", |v| matches!(v.kind(), ValueKind::Int(_)));
    kind_test(registry, "float", |v| matches!(v.kind(), ValueKind::Float(_)));
    kind_test(registry, "string", Value::is_string);
    kind_test(registry, "sequence", |v| v.is_seq() || v.is_string());
    kind_test(registry, "mapping", Value::is_map);
    kind_test(registry, "iterable", Value::is_iterable);
    kind_test(registry, "callable", Value::is_callable);

    registry
        .register("even", |v, args| {
            no_args("even", args)?;
            Ok(integer("even", v)? % 2 == 0)
        })
        .register("odd", |v, args| {
            no_args("odd", args)?;
            Ok(integer("odd", v)? % 2 != 0)
        })
        .register("divisibleby", |v, args| {
            let bound = args.bind("divisibleby", &[Param::required("num")])?;
            let num = bound.int("num")?;
            if num == 0 {
                return Err(Error::invalid_call("divisibleby", "division by zero"));
            }
            Ok(integer("divisibleby", v)? % num == 0)
        })
        .register("eq", |v, args| Ok(*v == other("eq", args)?))
        .register("equalto", |v, args| Ok(*v == other("equalto", args)?))
        .register("ne", |v, args| Ok(*v != other("ne", args)?))
        .register("lt", |v, args| Ok(compare("lt", v, &other("lt", args)?)?.is_lt()))
        .register("gt", |v, args| Ok(compare("gt", v, &other("gt", args)?)?.is_gt()))
        .register("in", |v, args| {
            let container = other("in", args)?;
            container
                .contains(v)
                .map_err(|reason| Error::invalid_call("in", reason))
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, value: impl Into<Value>, args: Vec<Value>) -> Result<bool> {
        let tests = Tests::builtin();
        let test = tests.get(name).unwrap();
        test(&value.into(), &Args::positional(args))
    }

    #[test]
    fn test_type_tests() {
        assert!(check("none", Value::NONE, vec![]).unwrap());
        assert!(!check("none", Value::UNDEFINED, vec![]).unwrap());
        assert!(check("number", 1.5, vec![]).unwrap());
        assert!(check("integer", 1, vec![]).unwrap());
        assert!(!check("integer", 1.0, vec![]).unwrap());
        assert!(check("sequence", "abc", vec![]).unwrap());
        assert!(!check("mapping", "abc", vec![]).unwrap());
        assert!(check("iterable", Value::from_seq(vec![]), vec![]).unwrap());
        assert!(check("number", 1, vec![Value::from(2)]).is_err());
    }

    #[test]
    fn test_value_tests() {
        assert!(check("even", 4, vec![]).unwrap());
        assert!(check("odd", -3, vec![]).unwrap());
        assert!(check("divisibleby", 9, vec![Value::from(3)]).unwrap());
        assert!(check("divisibleby", 9, vec![Value::from(0)]).is_err());
        assert!(check("eq", 2, vec![Value::from(2.0)]).unwrap());
        assert!(check("lt", 1, vec![Value::from(2)]).unwrap());
        assert!(check("gt", "b", vec![Value::from("a")]).unwrap());
        assert!(check("gt", "b", vec![Value::from(1)]).is_err());
        assert!(
            check(
                "in",
                2,
                vec![Value::from_seq(vec![Value::from(1), Value::from(2)])]
            )
            .unwrap()
        );
    }
}
