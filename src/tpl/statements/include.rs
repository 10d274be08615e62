use super::{Statement, parse_context_flag};
use crate::Result;
use crate::error::Position;
use crate::tpl::ast::Expr;
use crate::tpl::expr::parse_expression_no_cond;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `include name [ignore missing] [with context|without context]`.
#[derive(Debug)]
pub struct IncludeStatement {
    /// A template name, or a list of names tried in order.
    pub template: Expr,
    pub ignore_missing: bool,
    pub with_context: bool,
    pub pos: Position,
}

pub(super) fn parse(_parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let pos = args.position();
    let template = parse_expression_no_cond(args)?;
    let ignore_missing = if args.skip_name("ignore") {
        args.expect_name("missing")?;
        true
    } else {
        false
    };
    let with_context = parse_context_flag(args, true)?;
    Ok(Arc::new(IncludeStatement {
        template,
        ignore_missing,
        with_context,
        pos,
    }))
}

impl Statement for IncludeStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let names = r.evaluate(&self.template)?;
        r.include(&names, self.ignore_missing, self.with_context, self.pos)
    }
}
