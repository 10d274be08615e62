use super::Statement;
use crate::Result;
use crate::tpl::ast::Node;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `raw` ... `endraw`: the enclosed text is printed verbatim.
#[derive(Debug)]
pub struct RawStatement {
    pub body: Node,
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    args.expect_end()?;
    let (mut body, end) = parser.wrap_until(&["endraw"])?;
    end.expect_end()?;
    if body.nodes.len() != 1 || !matches!(body.nodes[0], Node::Data { .. }) {
        return Err(args.error_at(body.pos, "raw block must contain only text"));
    }
    let body = body.nodes.remove(0);
    Ok(Arc::new(RawStatement { body }))
}

impl Statement for RawStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        r.render_nodes(std::slice::from_ref(&self.body))
    }
}
