use super::{Statement, expect_end_name};
use crate::Result;
use crate::tpl::ast::{Expr, ExprKind, Macro, MacroParam};
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use crate::value::Value;
use std::sync::Arc;

/// `macro name(a, b=1)` ... `endmacro`. Executing the tag binds the macro,
/// closed over the current scope, under its name.
#[derive(Debug)]
pub struct MacroStatement {
    pub def: Arc<Macro>,
}

fn parse_params(parser: &Parser<'_>, args: &mut TokenStream) -> Result<Vec<MacroParam>> {
    let mut params: Vec<MacroParam> = Vec::new();
    args.expect_op("(")?;
    while !args.skip_op(")") {
        if !params.is_empty() {
            args.expect_op(",")?;
            if args.skip_op(")") {
                break;
            }
        }
        let (name, pos) = args.expect_identifier()?;
        if params.iter().any(|p| p.name == name) {
            return Err(args.error_at(pos, format!("duplicate parameter '{}'", name)));
        }
        let default = if args.skip_op("=") {
            parser.parse_expression(args)?
        } else if parser.config().strict {
            Expr::new(ExprKind::MissingArgument(name.clone()), pos)
        } else {
            Expr::constant(Value::NONE, pos)
        };
        params.push(MacroParam { name, default });
    }
    Ok(params)
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let (name, pos) = args.expect_identifier()?;
    let params = parse_params(parser, args)?;
    args.expect_end()?;
    let (body, mut end) = parser.wrap_until(&["endmacro"])?;
    expect_end_name(&mut end, "endmacro", &name)?;
    end.expect_end()?;

    let def = Arc::new(Macro {
        name,
        params,
        body,
        pos,
    });
    parser.declare_macro(def.clone());
    Ok(Arc::new(MacroStatement { def }))
}

impl Statement for MacroStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let closure = r.bind_macro(&self.def);
        r.ctx.set(self.def.name.clone(), closure);
        Ok(())
    }
}
