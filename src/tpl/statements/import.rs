use super::{Statement, parse_context_flag};
use crate::Result;
use crate::error::{Error, Position};
use crate::tpl::ast::Expr;
use crate::tpl::expr::parse_expression_no_cond;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use crate::value::Value;
use std::sync::Arc;

/// `import "macros.html" as ns`: binds every exported macro under `ns`.
#[derive(Debug)]
pub struct ImportStatement {
    pub template: Expr,
    pub alias: String,
    pub with_context: bool,
    pub pos: Position,
}

/// `from "macros.html" import a, b as c`.
#[derive(Debug)]
pub struct FromImportStatement {
    pub template: Expr,
    /// `(exported name, bound name)` pairs.
    pub names: Vec<(String, String)>,
    pub with_context: bool,
    pub pos: Position,
}

pub(super) fn parse_import(
    _parser: &mut Parser<'_>,
    args: &mut TokenStream,
) -> Result<Arc<dyn Statement>> {
    let pos = args.position();
    let template = parse_expression_no_cond(args)?;
    args.expect_name("as")?;
    let (alias, _) = args.expect_identifier()?;
    let with_context = parse_context_flag(args, false)?;
    Ok(Arc::new(ImportStatement {
        template,
        alias,
        with_context,
        pos,
    }))
}

pub(super) fn parse_from(
    _parser: &mut Parser<'_>,
    args: &mut TokenStream,
) -> Result<Arc<dyn Statement>> {
    let pos = args.position();
    let template = parse_expression_no_cond(args)?;
    args.expect_name("import")?;
    let mut names = Vec::new();
    loop {
        if args.peek_name("with") || args.peek_name("without") {
            break;
        }
        let (name, _) = args.expect_identifier()?;
        let alias = if args.skip_name("as") {
            args.expect_identifier()?.0
        } else {
            name.clone()
        };
        names.push((name, alias));
        if !args.skip_op(",") {
            break;
        }
    }
    if names.is_empty() {
        return Err(args.error("expected at least one name to import"));
    }
    let with_context = parse_context_flag(args, false)?;
    Ok(Arc::new(FromImportStatement {
        template,
        names,
        with_context,
        pos,
    }))
}

impl Statement for ImportStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let name = r.evaluate(&self.template)?;
        let exports = r.import(&name, self.with_context, self.pos)?;
        r.ctx.set(self.alias.clone(), Value::from_map(exports));
        Ok(())
    }
}

impl Statement for FromImportStatement {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()> {
        let name = r.evaluate(&self.template)?;
        let exports = r.import(&name, self.with_context, self.pos)?;
        for (export, alias) in &self.names {
            let value = exports.get(export).cloned().ok_or_else(|| {
                Error::eval(
                    self.pos,
                    format!("template {} does not export '{}'", name.repr(), export),
                )
            })?;
            r.ctx.set(alias.clone(), value);
        }
        Ok(())
    }
}
