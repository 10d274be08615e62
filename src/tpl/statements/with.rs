use super::Statement;
use crate::Result;
use crate::tpl::ast::{Expr, Wrapper};
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `with a=1, b=x` ... `endwith`: a child scope seeded with the assignments.
#[derive(Debug)]
pub struct WithStatement {
    pub assignments: Vec<(String, Expr)>,
    pub body: Wrapper,
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let mut assignments = Vec::new();
    while !args.is_eof() {
        if !assignments.is_empty() {
            args.expect_op(",")?;
        }
        let (name, _) = args.expect_identifier()?;
        args.expect_op("=")?;
        assignments.push((name, parser.parse_expression(args)?));
    }
    let (body, end) = parser.wrap_until(&["endwith"])?;
    end.expect_end()?;
    Ok(Arc::new(WithStatement { assignments, body }))
}

impl Statement for WithStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let mut values = Vec::with_capacity(self.assignments.len());
        for (name, expr) in &self.assignments {
            values.push((name.clone(), r.evaluate(expr)?));
        }
        r.ctx.push();
        for (name, value) in values {
            r.ctx.set(name, value);
        }
        let result = r.render_wrapper(&self.body);
        r.ctx.pop();
        result
    }
}
