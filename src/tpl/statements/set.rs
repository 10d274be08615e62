use super::Statement;
use crate::Result;
use crate::error::{Error, Position};
use crate::tpl::ast::{Expr, ExprKind, Wrapper};
use crate::tpl::lexer::TokenKind;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use crate::value::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum SetTarget {
    Name(String),
    /// `a.b["c"]`: the root variable and the keys leading to the slot.
    Path { root: String, keys: Vec<Expr> },
    Tuple(Vec<String>),
}

#[derive(Debug)]
pub enum SetValue {
    Expr(Expr),
    /// `set x` ... `endset`: the rendered body, marked safe.
    Block(Wrapper),
}

#[derive(Debug)]
pub struct SetStatement {
    pub target: SetTarget,
    pub value: SetValue,
    pub pos: Position,
}

fn parse_target(args: &mut TokenStream) -> Result<SetTarget> {
    let (root, _) = args.expect_identifier()?;
    let mut keys = Vec::new();
    loop {
        let pos = args.position();
        if args.skip_op(".") {
            let key = match args.next() {
                Some(t) if t.kind == TokenKind::Name => Value::from(t.text),
                Some(t) if t.kind == TokenKind::Int => match t.text.parse::<i64>() {
                    Ok(index) => Value::from(index),
                    Err(_) => return Err(args.error_at(t.pos, "index out of range")),
                },
                _ => return Err(args.error_at(pos, "expected attribute name after '.'")),
            };
            keys.push(Expr::constant(key, pos));
        } else if args.skip_op("[") {
            keys.push(crate::tpl::expr::parse_expression(args)?);
            args.expect_op("]")?;
        } else {
            break;
        }
    }
    if !keys.is_empty() {
        return Ok(SetTarget::Path { root, keys });
    }
    if args.peek_op(",") {
        let mut names = vec![root];
        while args.skip_op(",") {
            names.push(args.expect_identifier()?.0);
        }
        return Ok(SetTarget::Tuple(names));
    }
    Ok(SetTarget::Name(root))
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let pos = args.position();
    let target = parse_target(args)?;
    let value = if args.skip_op("=") {
        let first = parser.parse_expression(args)?;
        if args.peek_op(",") {
            // `set a, b = 1, 2`
            let tuple_pos = first.pos;
            let mut items = vec![first];
            while args.skip_op(",") {
                items.push(parser.parse_expression(args)?);
            }
            SetValue::Expr(Expr::new(ExprKind::Tuple(items), tuple_pos))
        } else {
            SetValue::Expr(first)
        }
    } else if args.is_eof() && matches!(target, SetTarget::Name(_)) {
        let (body, end) = parser.wrap_until(&["endset"])?;
        end.expect_end()?;
        SetValue::Block(body)
    } else {
        return Err(args.error("expected '='"));
    };
    Ok(Arc::new(SetStatement { target, value, pos }))
}

impl Statement for SetStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let value = match &self.value {
            SetValue::Expr(expr) => r.evaluate(expr)?,
            SetValue::Block(body) => Value::safe_string(r.capture(|r| r.render_wrapper(body))?),
        };
        match &self.target {
            SetTarget::Name(name) => r.ctx.set(name.clone(), value),
            SetTarget::Path { root, keys } => {
                let mut path = Vec::with_capacity(keys.len());
                for key in keys {
                    path.push(r.evaluate(key)?);
                }
                let slot = r
                    .ctx
                    .lookup_mut(root)
                    .ok_or_else(|| Error::eval(self.pos, format!("'{}' is undefined", root)))?;
                slot.set_path(&path, value)
                    .map_err(|message| Error::eval(self.pos, message))?;
            }
            SetTarget::Tuple(names) => {
                let parts = value.iter_values().filter(|_| value.is_seq()).ok_or_else(|| {
                    Error::eval(self.pos, format!("cannot unpack {}", value.type_name()))
                })?;
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
                for (name, part) in names.iter().zip(parts) {
                    r.ctx.set(name.clone(), part);
                }
            }
        }
        Ok(())
    }
}
