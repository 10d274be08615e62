//! Expression evaluation.
//!
//! Failures inside an expression travel as error values: every operation
//! handed an error returns it untouched, so the first failure reaches the
//! statement that owns the expression, which turns it back into `Err`.

use crate::Result;
use crate::error::{Error, Position};
use crate::tpl::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::tpl::render::Renderer;
use crate::value::{Args, Map, Value, ValueKind, eval_error, ops};

/// Returns early with the value when it carries an error.
macro_rules! propagate {
    ($value:expr) => {{
        let value = $value;
        if value.is_error() {
            return value;
        }
        value
    }};
}

fn from_result(result: Result<Value>) -> Value {
    result.unwrap_or_else(Value::from_error)
}

fn from_op(pos: Position, result: std::result::Result<Value, String>) -> Value {
    result.unwrap_or_else(|message| eval_error(pos, message))
}

impl Renderer<'_> {
    /// Evaluates an expression, surfacing an error value as `Err`.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        self.eval(expr).into_result()
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Value {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Const(value) => value.clone(),
            ExprKind::List(items) | ExprKind::Tuple(items) => match self.eval_all(items) {
                Ok(values) => Value::from_seq(values),
                Err(error) => error,
            },
            ExprKind::Dict(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    let key = propagate!(self.eval(key));
                    let key = match key.kind() {
                        ValueKind::Str(s) => s.clone(),
                        ValueKind::Int(n) => n.to_string(),
                        _ => {
                            return eval_error(
                                pos,
                                format!("mapping keys must be strings, got {}", key.type_name()),
                            );
                        }
                    };
                    map.insert(key, propagate!(self.eval(value)));
                }
                Value::from_map(map)
            }
            ExprKind::Name(name) => self.lookup(name, pos),
            ExprKind::GetAttr(target, attr) => {
                let target = propagate!(self.eval(target));
                match target.get_attr(attr) {
                    Some(value) => value,
                    None => self.undefined(attr, pos),
                }
            }
            ExprKind::GetItem(target, key) => {
                let target = propagate!(self.eval(target));
                let key = propagate!(self.eval(key));
                match target.get_item(&key) {
                    Some(value) => value,
                    None => self.undefined(&key.repr(), pos),
                }
            }
            ExprKind::Slice {
                target,
                start,
                stop,
                step,
            } => {
                let target = propagate!(self.eval(target));
                let mut bounds = [None; 3];
                for (slot, bound) in bounds.iter_mut().zip([start, stop, step]) {
                    let Some(bound) = bound else {
                        continue;
                    };
                    let value = propagate!(self.eval(bound));
                    *slot = match value.kind() {
                        ValueKind::Int(n) => Some(*n),
                        ValueKind::None => None,
                        _ => {
                            return eval_error(
                                pos,
                                format!("slice indices must be integers, got {}", value.type_name()),
                            );
                        }
                    };
                }
                from_op(pos, target.get_slice(bounds[0], bounds[1], bounds[2]))
            }
            ExprKind::Call { func, args, kwargs } => self.eval_call(func, args, kwargs, pos),
            ExprKind::Unary(op, operand) => {
                let value = propagate!(self.eval(operand));
                match op {
                    UnaryOp::Not => Value::from(!value.is_true()),
                    UnaryOp::Neg => from_op(pos, ops::neg(&value)),
                    UnaryOp::Pos => from_op(pos, ops::pos(&value)),
                }
            }
            ExprKind::Binary(op, left, right) => self.eval_binary(*op, left, right, pos),
            ExprKind::Filter {
                target,
                name,
                args,
                kwargs,
            } => {
                let target = if name == "default" || name == "d" {
                    propagate!(self.eval_lenient(target))
                } else {
                    propagate!(self.eval(target))
                };
                let args = match self.eval_args(args, kwargs) {
                    Ok(args) => args,
                    Err(error) => return error,
                };
                match self.env.filters().get(name) {
                    Some(filter) => from_result(filter(&target, &args)),
                    None => eval_error(pos, format!("unknown filter '{}'", name)),
                }
            }
            ExprKind::Test {
                target,
                name,
                args,
                negated,
            } => {
                let outcome = if name == "defined" || name == "undefined" {
                    let value = propagate!(self.eval_lenient(target));
                    value.is_undefined() == (name == "undefined")
                } else {
                    let value = propagate!(self.eval(target));
                    let args = match self.eval_all(args) {
                        Ok(values) => Args::positional(values),
                        Err(error) => return error,
                    };
                    let Some(test) = self.env.tests().get(name) else {
                        return eval_error(pos, format!("unknown test '{}'", name));
                    };
                    match test(&value, &args) {
                        Ok(outcome) => outcome,
                        Err(error) => return Value::from_error(error),
                    }
                };
                Value::from(outcome != *negated)
            }
            ExprKind::Cond {
                test,
                then,
                otherwise,
            } => {
                let test = propagate!(self.eval(test));
                if test.is_true() {
                    self.eval(then)
                } else {
                    match otherwise {
                        Some(otherwise) => self.eval(otherwise),
                        None => Value::NONE,
                    }
                }
            }
            ExprKind::MissingArgument(name) => {
                eval_error(pos, format!("missing required argument '{}'", name))
            }
        }
    }

    /// Evaluates with undefined names tolerated even in strict mode; used by
    /// the `default` filter and the `defined` tests.
    fn eval_lenient(&mut self, expr: &Expr) -> Value {
        let saved = std::mem::replace(&mut self.lenient, true);
        let value = self.eval(expr);
        self.lenient = saved;
        value
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> std::result::Result<Vec<Value>, Value> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let value = self.eval(expr);
            if value.is_error() {
                return Err(value);
            }
            values.push(value);
        }
        Ok(values)
    }

    fn eval_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> std::result::Result<Args, Value> {
        let positional = self.eval_all(args)?;
        let mut named = Map::new();
        for (name, expr) in kwargs {
            let value = self.eval(expr);
            if value.is_error() {
                return Err(value);
            }
            named.insert(name.clone(), value);
        }
        Ok(Args::new(positional, named))
    }

    fn lookup(&mut self, name: &str, pos: Position) -> Value {
        if let Some(value) = self.ctx.lookup(name) {
            return value.clone();
        }
        if let Some(value) = self.find_macro(name) {
            return value;
        }
        self.undefined(name, pos)
    }

    fn undefined(&self, name: &str, pos: Position) -> Value {
        if self.is_strict() {
            Value::from_error(Error::Undefined {
                name: name.to_string(),
                pos,
            })
        } else {
            Value::UNDEFINED
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, pos: Position) -> Value {
        let l = propagate!(self.eval(left));
        match op {
            BinaryOp::And if !l.is_true() => return l,
            BinaryOp::Or if l.is_true() => return l,
            BinaryOp::And | BinaryOp::Or => return self.eval(right),
            _ => {}
        }
        let r = propagate!(self.eval(right));
        match op {
            BinaryOp::Eq => Value::from(l == r),
            BinaryOp::Ne => Value::from(l != r),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let Some(ordering) = l.partial_cmp(&r) else {
                    return eval_error(
                        pos,
                        format!(
                            "'{}' not supported between {} and {}",
                            op.symbol(),
                            l.type_name(),
                            r.type_name()
                        ),
                    );
                };
                Value::from(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                })
            }
            BinaryOp::In | BinaryOp::NotIn => match r.contains(&l) {
                Ok(found) => Value::from(found == (op == BinaryOp::In)),
                Err(message) => eval_error(pos, message),
            },
            BinaryOp::Add => from_op(pos, ops::add(&l, &r)),
            BinaryOp::Sub => from_op(pos, ops::sub(&l, &r)),
            BinaryOp::Mul => from_op(pos, ops::mul(&l, &r)),
            BinaryOp::Div => from_op(pos, ops::div(&l, &r)),
            BinaryOp::FloorDiv => from_op(pos, ops::floor_div(&l, &r)),
            BinaryOp::Rem => from_op(pos, ops::rem(&l, &r)),
            BinaryOp::Pow => from_op(pos, ops::pow(&l, &r)),
            BinaryOp::Concat => ops::concat(&l, &r),
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited above"),
        }
    }

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        pos: Position,
    ) -> Value {
        if let ExprKind::Name(name) = &func.kind
            && name == "super"
            && self.ctx.lookup("super").is_none()
        {
            if !args.is_empty() || !kwargs.is_empty() {
                return Value::from_error(Error::invalid_call("super", "takes no arguments"));
            }
            return from_result(self.super_block(pos));
        }

        if let ExprKind::GetAttr(target, method) = &func.kind {
            let receiver = propagate!(self.eval(target));
            if let Some(attr) = receiver.get_attr(method)
                && attr.is_callable()
            {
                return self.call_value(&attr, args, kwargs, pos);
            }
            return self.call_method(target, receiver, method, args, kwargs, pos);
        }

        let callee = propagate!(self.eval(func));
        self.call_value(&callee, args, kwargs, pos)
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        pos: Position,
    ) -> Value {
        let Some(closure) = callee.as_macro().cloned() else {
            return eval_error(
                pos,
                format!("'{}' object is not callable", callee.type_name()),
            );
        };
        let args = match self.eval_args(args, kwargs) {
            Ok(args) => args,
            Err(error) => return error,
        };
        from_result(self.call_macro(&closure, args, pos))
    }

    /// Calls a registered method. When the receiver is a variable or a path
    /// into one, the method runs on the stored value so mutations stick.
    fn call_method(
        &mut self,
        target: &Expr,
        receiver: Value,
        method: &str,
        args: &[Expr],
        kwargs: &[(String, Expr)],
        pos: Position,
    ) -> Value {
        let Some(f) = self.env.methods().get(method) else {
            return eval_error(
                pos,
                format!("{} has no method '{}'", receiver.type_name(), method),
            );
        };
        let args = match self.eval_args(args, kwargs) {
            Ok(args) => args,
            Err(error) => return error,
        };
        if let Some((root, keys)) = target.place() {
            let mut path = Vec::with_capacity(keys.len());
            for key in keys {
                let key = match &key.kind {
                    ExprKind::GetAttr(_, attr) => Value::from(attr.as_str()),
                    ExprKind::GetItem(_, item) => propagate!(self.eval(item)),
                    _ => return eval_error(pos, "invalid method receiver"),
                };
                path.push(key);
            }
            if let Some(slot) = self.ctx.lookup_mut(root)
                && let Some(stored) = slot.path_mut(&path)
            {
                return from_result(f(stored, &args));
            }
        }
        let mut receiver = receiver;
        from_result(f(&mut receiver, &args))
    }
}
