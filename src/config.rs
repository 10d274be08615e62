use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Delimiter set used by the lexer. Every field falls back to the Jinja
/// default when missing from a deserialized configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Syntax {
    pub block_start: String,
    pub block_end: String,
    pub variable_start: String,
    pub variable_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            block_start: "{%".to_string(),
            block_end: "%}".to_string(),
            variable_start: "{{".to_string(),
            variable_end: "}}".to_string(),
            comment_start: "{#".to_string(),
            comment_end: "#}".to_string(),
        }
    }
}

/// When printed values get HTML-escaped.
#[derive(Clone, Default)]
pub enum AutoEscape {
    #[default]
    Never,
    Always,
    /// Decided per template from its name, e.g. by extension.
    ByName(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl AutoEscape {
    pub fn by_name(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        AutoEscape::ByName(Arc::new(f))
    }

    /// Escapes `.html`, `.htm` and `.xml` templates.
    pub fn html_extensions() -> Self {
        Self::by_name(|name| {
            [".html", ".htm", ".xml"]
                .iter()
                .any(|ext| name.ends_with(ext))
        })
    }

    pub fn enabled_for(&self, template_name: &str) -> bool {
        match self {
            AutoEscape::Never => false,
            AutoEscape::Always => true,
            AutoEscape::ByName(f) => f(template_name),
        }
    }
}

impl fmt::Debug for AutoEscape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoEscape::Never => f.write_str("Never"),
            AutoEscape::Always => f.write_str("Always"),
            AutoEscape::ByName(_) => f.write_str("ByName(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub syntax: Syntax,
    pub autoescape: AutoEscape,
    /// Undefined names and missing arguments are errors instead of none.
    pub strict: bool,
    pub trim_blocks: bool,
    pub lstrip_blocks: bool,
    /// Bound on nested includes, imports and macro calls.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            syntax: Syntax::default(),
            autoescape: AutoEscape::Never,
            strict: false,
            trim_blocks: false,
            lstrip_blocks: false,
            max_depth: 64,
        }
    }
}

impl Config {
    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_autoescape(mut self, autoescape: AutoEscape) -> Self {
        self.autoescape = autoescape;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_trim_blocks(mut self, trim_blocks: bool) -> Self {
        self.trim_blocks = trim_blocks;
        self
    }

    pub fn with_lstrip_blocks(mut self, lstrip_blocks: bool) -> Self {
        self.lstrip_blocks = lstrip_blocks;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
