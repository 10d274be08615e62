//! Control tags. Each tag name maps to a parse function producing a
//! [`Statement`], which the renderer later executes.

mod block;
mod extends;
mod for_loop;
mod if_stmt;
mod import;
mod include;
mod macros;
mod raw;
mod set;
mod with;

use crate::Result;
use crate::tpl::parser::Parser;
use crate::tpl::render::Renderer;
use crate::tpl::stream::TokenStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use block::BlockStatement;
pub use extends::ExtendsStatement;
pub use for_loop::{ForStatement, LoopTarget};
pub use if_stmt::IfStatement;
pub use import::{FromImportStatement, ImportStatement};
pub use include::IncludeStatement;
pub use macros::MacroStatement;
pub use raw::RawStatement;
pub use set::{SetStatement, SetTarget};
pub use with::WithStatement;

/// A parsed control tag.
pub trait Statement: fmt::Debug + Send + Sync {
    fn execute(&self, r: &mut Renderer<'_>) -> Result<()>;
}

/// Parses one tag. The stream holds the tokens after the tag name up to the
/// closing delimiter; anything left unconsumed is reported as an error.
pub type ParseFn =
    Arc<dyn Fn(&mut Parser<'_>, &mut TokenStream) -> Result<Arc<dyn Statement>> + Send + Sync>;

/// Tag name to parse function table, owned by the environment.
#[derive(Clone, Default)]
pub struct StatementRegistry {
    parsers: HashMap<String, ParseFn>,
}

impl StatementRegistry {
    /// An empty registry; templates may then only contain data and output.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tag set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("if", if_stmt::parse)
            .register("for", for_loop::parse)
            .register("set", set::parse)
            .register("macro", macros::parse)
            .register("with", with::parse)
            .register("raw", raw::parse)
            .register("include", include::parse)
            .register("extends", extends::parse)
            .register("block", block::parse)
            .register("import", import::parse_import)
            .register("from", import::parse_from);
        registry
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Parser<'_>, &mut TokenStream) -> Result<Arc<dyn Statement>>
            + Send
            + Sync
            + 'static,
    {
        self.parsers.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<ParseFn> {
        self.parsers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }
}

impl fmt::Debug for StatementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.parsers.keys().collect();
        names.sort();
        f.debug_struct("StatementRegistry")
            .field("tags", &names)
            .finish()
    }
}

/// Parses the optional `with context` / `without context` suffix of
/// `include`, `import` and `from`.
fn parse_context_flag(args: &mut TokenStream, default: bool) -> Result<bool> {
    let flag = if args.skip_name("with") {
        true
    } else if args.skip_name("without") {
        false
    } else {
        return Ok(default);
    };
    args.expect_name("context")?;
    Ok(flag)
}

/// Checks the optional name repeated on a closing tag (`endblock name`).
fn expect_end_name(args: &mut TokenStream, tag: &str, name: &str) -> Result<()> {
    if args.is_eof() {
        return Ok(());
    }
    let (found, pos) = args.expect_identifier()?;
    if found != name {
        return Err(args.error_at(
            pos,
            format!("'{}' closes '{}', found '{}'", tag, name, found),
        ));
    }
    Ok(())
}
