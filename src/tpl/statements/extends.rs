use super::Statement;
use crate::Result;
use crate::tpl::lexer::TokenKind;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `extends "parent.html"`. The parent is loaded while parsing; at render
/// time the tag does nothing.
#[derive(Debug)]
pub struct ExtendsStatement {
    pub path: String,
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let token = args.expect_kind(TokenKind::String, "a template name string")?;
    parser.extend(&token.text, token.pos)?;
    Ok(Arc::new(ExtendsStatement { path: token.text }))
}

impl Statement for ExtendsStatement {
    fn execute(&self, _r: &mut Renderer<'_>) -> Result<()> {
        Ok(())
    }
}
