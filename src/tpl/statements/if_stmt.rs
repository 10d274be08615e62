use super::Statement;
use crate::Result;
use crate::tpl::ast::{Expr, Wrapper};
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::sync::Arc;

/// `if` / `elif` / `else`: the first branch whose condition holds is rendered.
#[derive(Debug)]
pub struct IfStatement {
    pub conditions: Vec<Expr>,
    pub branches: Vec<Wrapper>,
    pub otherwise: Option<Wrapper>,
}

pub(super) fn parse(parser: &mut Parser<'_>, args: &mut TokenStream) -> Result<Arc<dyn Statement>> {
    let mut conditions = vec![parser.parse_expression(args)?];
    let mut branches = Vec::new();
    let mut otherwise = None;
    loop {
        let (body, mut end) = parser.wrap_until(&["elif", "else", "endif"])?;
        match body.end_tag.as_deref() {
            Some("elif") => {
                branches.push(body);
                conditions.push(parser.parse_expression(&mut end)?);
                end.expect_end()?;
            }
            Some("else") => {
                end.expect_end()?;
                branches.push(body);
                let (body, end) = parser.wrap_until(&["endif"])?;
                end.expect_end()?;
                otherwise = Some(body);
                break;
            }
            _ => {
                end.expect_end()?;
                branches.push(body);
                break;
            }
        }
    }
    Ok(Arc::new(IfStatement {
        conditions,
        branches,
        otherwise,
    }))
}

impl Statement for IfStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        for (condition, branch) in self.conditions.iter().zip(&self.branches) {
            if r.evaluate(condition)?.is_true() {
                return r.render_wrapper(branch);
            }
        }
        match &self.otherwise {
            Some(body) => r.render_wrapper(body),
            None => Ok(()),
        }
    }
}
