//! Arithmetic and string operators over [`Value`]s.
//!
//! Errors are plain messages; the evaluator attaches the source position.

use crate::value::{Value, ValueKind};

type OpResult = Result<Value, String>;

fn unsupported(op: &str, l: &Value, r: &Value) -> String {
    format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        l.type_name(),
        r.type_name()
    )
}

fn overflow(op: &str) -> String {
    format!("integer overflow in '{}'", op)
}

/// Largest string or sequence, in bytes or items, that `*` may build.
const MAX_REPEAT: usize = 1 << 24;

fn repeat(v: &Value, times: i64) -> Option<OpResult> {
    let times = usize::try_from(times.max(0)).unwrap_or(usize::MAX);
    let size = |len: usize| {
        len.checked_mul(times)
            .filter(|n| *n <= MAX_REPEAT)
            .ok_or_else(|| overflow("*"))
    };
    match v.kind() {
        ValueKind::Str(s) => Some(size(s.len()).map(|_| Value::from(s.repeat(times)))),
        ValueKind::Seq(items) => Some(size(items.len()).map(|n| {
            let mut out = Vec::with_capacity(n);
            if n > 0 {
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
            }
            Value::from_seq(out)
        })),
        _ => None,
    }
}

pub fn add(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => {
            a.checked_add(*b).map(Value::from).ok_or_else(|| overflow("+"))
        }
        (ValueKind::Str(a), ValueKind::Str(b)) => {
            let joined = Value::from(format!("{}{}", a, b));
            Ok(if l.is_safe() && r.is_safe() {
                joined.mark_safe()
            } else {
                joined
            })
        }
        (ValueKind::Seq(a), ValueKind::Seq(b)) => {
            Ok(Value::from_seq(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ if l.is_number() && r.is_number() => Ok(Value::from(
            l.as_f64().unwrap_or_default() + r.as_f64().unwrap_or_default(),
        )),
        _ => Err(unsupported("+", l, r)),
    }
}

pub fn sub(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => {
            a.checked_sub(*b).map(Value::from).ok_or_else(|| overflow("-"))
        }
        _ if l.is_number() && r.is_number() => Ok(Value::from(
            l.as_f64().unwrap_or_default() - r.as_f64().unwrap_or_default(),
        )),
        _ => Err(unsupported("-", l, r)),
    }
}

pub fn mul(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) => {
            a.checked_mul(*b).map(Value::from).ok_or_else(|| overflow("*"))
        }
        (ValueKind::Str(_) | ValueKind::Seq(_), ValueKind::Int(n)) => {
            repeat(l, *n).unwrap_or_else(|| Err(unsupported("*", l, r)))
        }
        (ValueKind::Int(n), ValueKind::Str(_) | ValueKind::Seq(_)) => {
            repeat(r, *n).unwrap_or_else(|| Err(unsupported("*", l, r)))
        }
        _ if l.is_number() && r.is_number() => Ok(Value::from(
            l.as_f64().unwrap_or_default() * r.as_f64().unwrap_or_default(),
        )),
        _ => Err(unsupported("*", l, r)),
    }
}

/// True division, always yields a float.
pub fn div(l: &Value, r: &Value) -> OpResult {
    match (l.as_f64(), r.as_f64()) {
        (Some(_), Some(b)) if b == 0.0 => Err("division by zero".to_string()),
        (Some(a), Some(b)) if l.is_number() && r.is_number() => Ok(Value::from(a / b)),
        _ => Err(unsupported("/", l, r)),
    }
}

pub fn floor_div(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(_), ValueKind::Int(0)) => Err("integer division by zero".to_string()),
        (ValueKind::Int(a), ValueKind::Int(b)) => {
            let q = a.checked_div(*b).ok_or_else(|| overflow("//"))?;
            let adjust = a % b != 0 && ((*a < 0) != (*b < 0));
            Ok(Value::from(if adjust { q - 1 } else { q }))
        }
        _ if l.is_number() && r.is_number() => {
            let b = r.as_f64().unwrap_or_default();
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::from((l.as_f64().unwrap_or_default() / b).floor()))
        }
        _ => Err(unsupported("//", l, r)),
    }
}

/// Modulo with the sign of the divisor.
pub fn rem(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(_), ValueKind::Int(0)) => Err("integer modulo by zero".to_string()),
        (ValueKind::Int(a), ValueKind::Int(b)) => {
            let m = a.checked_rem(*b).ok_or_else(|| overflow("%"))?;
            Ok(Value::from(if m != 0 && ((m < 0) != (*b < 0)) {
                m + b
            } else {
                m
            }))
        }
        _ if l.is_number() && r.is_number() => {
            let (a, b) = (
                l.as_f64().unwrap_or_default(),
                r.as_f64().unwrap_or_default(),
            );
            if b == 0.0 {
                return Err("float modulo by zero".to_string());
            }
            let m = a % b;
            Ok(Value::from(if m != 0.0 && ((m < 0.0) != (b < 0.0)) {
                m + b
            } else {
                m
            }))
        }
        _ => Err(unsupported("%", l, r)),
    }
}

pub fn pow(l: &Value, r: &Value) -> OpResult {
    match (l.kind(), r.kind()) {
        (ValueKind::Int(a), ValueKind::Int(b)) if *b >= 0 => {
            let exp = u32::try_from(*b).map_err(|_| overflow("**"))?;
            a.checked_pow(exp).map(Value::from).ok_or_else(|| overflow("**"))
        }
        _ if l.is_number() && r.is_number() => Ok(Value::from(
            l.as_f64()
                .unwrap_or_default()
                .powf(r.as_f64().unwrap_or_default()),
        )),
        _ => Err(unsupported("**", l, r)),
    }
}

/// The `~` operator: stringify both sides and join.
pub fn concat(l: &Value, r: &Value) -> Value {
    let joined = Value::from(format!("{}{}", l, r));
    if l.is_safe() && r.is_safe() {
        joined.mark_safe()
    } else {
        joined
    }
}

pub fn neg(v: &Value) -> OpResult {
    match v.kind() {
        ValueKind::Int(n) => n.checked_neg().map(Value::from).ok_or_else(|| overflow("-")),
        ValueKind::Float(f) => Ok(Value::from(-f)),
        _ => Err(format!("bad operand type for unary -: '{}'", v.type_name())),
    }
}

pub fn pos(v: &Value) -> OpResult {
    if v.is_number() {
        Ok(v.clone())
    } else {
        Err(format!("bad operand type for unary +: '{}'", v.type_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::from(n)
    }

    #[test]
    fn test_int_and_float_mixing() {
        assert_eq!(add(&int(1), &int(2)).unwrap(), int(3));
        assert_eq!(add(&int(1), &Value::from(0.5)).unwrap(), Value::from(1.5));
        assert_eq!(div(&int(7), &int(2)).unwrap(), Value::from(3.5));
        assert_eq!(pow(&int(2), &int(10)).unwrap(), int(1024));
        assert_eq!(pow(&int(2), &int(-1)).unwrap(), Value::from(0.5));
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(floor_div(&int(7), &int(2)).unwrap(), int(3));
        assert_eq!(floor_div(&int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(rem(&int(-7), &int(3)).unwrap(), int(2));
        assert_eq!(rem(&int(7), &int(-3)).unwrap(), int(-2));
    }

    #[test]
    fn test_division_by_zero_and_overflow() {
        assert!(div(&int(1), &int(0)).unwrap_err().contains("division by zero"));
        assert!(floor_div(&int(1), &int(0)).is_err());
        assert!(rem(&int(1), &int(0)).is_err());
        assert!(add(&int(i64::MAX), &int(1)).unwrap_err().contains("overflow"));
        assert!(neg(&int(i64::MIN)).is_err());
    }

    #[test]
    fn test_sequences_and_strings() {
        assert_eq!(add(&Value::from("a"), &Value::from("b")).unwrap(), Value::from("ab"));
        assert_eq!(mul(&Value::from("ab"), &int(2)).unwrap(), Value::from("abab"));
        let joined = add(&Value::from_seq(vec![int(1)]), &Value::from_seq(vec![int(2)])).unwrap();
        assert_eq!(joined.len(), Some(2));
        assert_eq!(concat(&Value::from("n="), &int(3)), Value::from("n=3"));
        assert!(add(&Value::from("a"), &int(1)).unwrap_err().contains("unsupported"));
    }

    #[test]
    fn test_repetition_is_bounded() {
        let pair = Value::from_seq(vec![int(1), int(2)]);
        assert!(mul(&pair, &int(i64::MAX)).unwrap_err().contains("overflow"));
        assert!(mul(&int(i64::MAX), &Value::from("ab")).unwrap_err().contains("overflow"));
        assert!(mul(&Value::from("ab"), &int(1 << 24)).is_err());
        assert_eq!(mul(&pair, &int(-3)).unwrap().len(), Some(0));
        assert_eq!(mul(&Value::from(""), &int(i64::MAX)).unwrap(), Value::from(""));
        assert_eq!(mul(&Value::from_seq(vec![]), &int(i64::MAX)).unwrap().len(), Some(0));
        assert_eq!(mul(&int(3), &pair).unwrap().len(), Some(6));
    }
}
