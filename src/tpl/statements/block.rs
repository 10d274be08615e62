use super::{Statement, expect_end_name};
use crate::Result;
use crate::error::Position;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `block name` ... `endblock`. The body lives in the template's block table;
/// executing the tag renders the nearest override along the inheritance chain.
#[derive(Debug)]
pub struct BlockStatement {
    pub name: String,
    pub pos: Position,
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let (name, pos) = args.expect_identifier()?;
    let (body, mut end) = parser.wrap_until(&["endblock"])?;
    expect_end_name(&mut end, "endblock", &name)?;
    end.expect_end()?;
    parser.declare_block(&name, body, pos)?;
    Ok(Arc::new(BlockStatement { name, pos }))
}

impl Statement for BlockStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        if r.is_discarding() {
            return Ok(());
        }
        r.render_block(&self.name, self.pos)
    }
}
