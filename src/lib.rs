//! A Jinja2-compatible template engine.
//!
//! Templates are lexed with configurable delimiters, parsed into a node tree
//! whose control tags come from a pluggable registry, and rendered against a
//! dynamic [`Value`] context. Inheritance (`extends`/`block`/`super()`),
//! `include`, `import` and macros are resolved through a [`Loader`].
//!
//! ```
//! use ujinja::{Environment, MemoryLoader, Value};
//!
//! let loader = MemoryLoader::new();
//! loader.add("hello.txt", "Hello {{ name | title }}!");
//! let env = Environment::new(loader);
//!
//! let mut data = ujinja::value::Map::new();
//! data.insert("name".to_string(), Value::from("world"));
//! assert_eq!(env.render("hello.txt", &data).unwrap(), "Hello World!");
//! ```

extern crate self as ujinja;

pub mod builtins;
pub mod config;
pub mod environment;
pub mod error;
pub mod loader;
pub mod tpl;
pub mod value;

pub type Result<T, E = error::Error> = std::result::Result<T, E>;

pub use config::{AutoEscape, Config, Syntax};
pub use environment::Environment;
pub use error::{Error, Position};
pub use loader::{FileSystemLoader, Loader, MemoryLoader};
pub use tpl::ast::Template;
pub use tpl::render_context::Context;
pub use value::{FromValue, ToValue, Value};

pub use ujinja_macros::ToValue;
pub use ujinja_macros::template_assets;
