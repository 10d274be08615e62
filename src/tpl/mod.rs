pub mod ast;
mod eval;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod render;
pub mod render_context;
pub mod statements;
pub mod stream;
