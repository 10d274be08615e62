use super::Statement;
use crate::Result;
use crate::error::{Error, Position};
use crate::tpl::ast::{Expr, Wrapper};
use crate::tpl::expr::parse_expression_no_cond;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use crate::value::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopTarget {
    Name(String),
    Tuple(Vec<String>),
}

/// `for target in iterable [if filter]` ... `[else]` ... `endfor`.
#[derive(Debug)]
pub struct ForStatement {
    pub target: LoopTarget,
    pub iter: Expr,
    pub filter: Option<Expr>,
    pub body: Wrapper,
    pub otherwise: Option<Wrapper>,
    pub pos: Position,
}

fn parse_target(args: &mut TokenStream) -> Result<LoopTarget> {
    let parenthesized = args.skip_op("(");
    let mut names = vec![args.expect_identifier()?.0];
    while args.skip_op(",") {
        if parenthesized && args.peek_op(")") {
            break;
        }
        names.push(args.expect_identifier()?.0);
    }
    if parenthesized {
        args.expect_op(")")?;
    }
    if names.len() == 1 && !parenthesized {
        Ok(LoopTarget::Name(names.remove(0)))
    } else {
        Ok(LoopTarget::Tuple(names))
    }
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let pos = args.position();
    let target = parse_target(args)?;
    args.expect_name("in")?;
    let iter = parse_expression_no_cond(args)?;
    let filter = if args.skip_name("if") {
        Some(parse_expression_no_cond(args)?)
    } else {
        None
    };
    if args.peek_name("recursive") {
        return Err(args.error("recursive loops are not supported"));
    }
    args.expect_end()?;

    let (body, end) = parser.wrap_until(&["else", "endfor"])?;
    end.expect_end()?;
    let otherwise = if body.end_tag.as_deref() == Some("else") {
        let (otherwise, end) = parser.wrap_until(&["endfor"])?;
        end.expect_end()?;
        Some(otherwise)
    } else {
        None
    };
    Ok(Arc::new(ForStatement {
        target,
        iter,
        filter,
        body,
        otherwise,
        pos,
    }))
}

impl ForStatement {
    /// The variables one iteration binds, and the item `loop.previtem` and
    /// `loop.nextitem` report for it.
    fn bind(&self, key: Value, value: Value, is_map: bool) -> Result<(Vec<(String, Value)>, Value)> {
        match &self.target {
            LoopTarget::Name(name) => {
                let item = if is_map { key } else { value };
                Ok((vec![(name.clone(), item.clone())], item))
            }
            LoopTarget::Tuple(names) => {
                let parts = if is_map {
                    vec![key, value]
                } else {
                    value
                        .as_seq()
                        .map(<[Value]>::to_vec)
                        .ok_or_else(|| {
                            Error::eval(
                                self.pos,
                                format!("cannot unpack {} into {} names", value.type_name(), names.len()),
                            )
                        })?
                };
                if parts.len() != names.len() {
                    return Err(Error::eval(
                        self.pos,
                        format!(
                            "cannot unpack {} values into {} names",
                            parts.len(),
                            names.len()
                        ),
                    ));
                }
                let bindings = names.iter().cloned().zip(parts.iter().cloned()).collect();
                Ok((bindings, Value::from_seq(parts)))
            }
        }
    }

    fn collect(&self, r: &mut Renderer<'_>) -> Result<Vec<(Vec<(String, Value)>, Value)>> {
        let iterable = r.evaluate(&self.iter)?;
        let pairs = iterable.try_iter().ok_or_else(|| {
            Error::eval(
                self.iter.pos,
                format!("'{}' object is not iterable", iterable.type_name()),
            )
        })?;
        let is_map = iterable.is_map();
        let mut items = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let (bindings, item) = self.bind(key, value, is_map)?;
            if let Some(filter) = &self.filter {
                r.ctx.push();
                for (name, value) in &bindings {
                    r.ctx.set(name.clone(), value.clone());
                }
                let keep = r.evaluate(filter);
                r.ctx.pop();
                if !keep?.is_true() {
                    continue;
                }
            }
            items.push((bindings, item));
        }
        Ok(items)
    }
}

fn loop_info(items: &[(Vec<(String, Value)>, Value)], i: usize) -> Value {
    let length = items.len();
    let item_at = |idx: Option<usize>| {
        idx.and_then(|idx| items.get(idx))
            .map(|(_, item)| item.clone())
            .unwrap_or(Value::UNDEFINED)
    };
    let mut info = Map::new();
    info.insert("index".into(), Value::from(i + 1));
    info.insert("index0".into(), Value::from(i));
    info.insert("revindex".into(), Value::from(length - i));
    info.insert("revindex0".into(), Value::from(length - i - 1));
    info.insert("first".into(), Value::from(i == 0));
    info.insert("last".into(), Value::from(i + 1 == length));
    info.insert("length".into(), Value::from(length));
    info.insert("previtem".into(), item_at(i.checked_sub(1)));
    info.insert("nextitem".into(), item_at(Some(i + 1)));
    info.insert("depth".into(), Value::from(1));
    info.insert("depth0".into(), Value::from(0));
    Value::from_map(info)
}

impl Statement for ForStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let items = self.collect(r)?;
        if items.is_empty() {
            return match &self.otherwise {
                Some(body) => r.render_wrapper(body),
                None => Ok(()),
            };
        }
        for (i, (bindings, _)) in items.iter().enumerate() {
            r.ctx.push();
            for (name, value) in bindings {
                r.ctx.set(name.clone(), value.clone());
            }
            r.ctx.set("loop", loop_info(&items, i));
            let result = r.render_wrapper(&self.body);
            r.ctx.pop();
            result?;
        }
        Ok(())
    }
}
