use crate::Result;
use crate::error::{Error, Position};
use crate::tpl::lexer::{Token, TokenKind};
use std::sync::Arc;

/// How deeply expressions, and tags inside tags, may nest before parsing
/// fails instead of exhausting the stack.
pub const MAX_NESTING: usize = 100;

/// An indexable token buffer with a movable cursor.
///
/// The parser walks the whole template through one stream; every tag's
/// arguments are handed to its statement parser as a separate stream so
/// leftovers can be detected.
#[derive(Debug, Clone)]
pub struct TokenStream {
    template: Arc<str>,
    tokens: Vec<Token>,
    cursor: usize,
    end: Position,
    depth: usize,
}

impl TokenStream {
    pub fn new(template: impl Into<Arc<str>>, tokens: Vec<Token>, end: Position) -> Self {
        Self {
            template: template.into(),
            tokens,
            cursor: 0,
            end,
            depth: 0,
        }
    }

    /// A stream over `tokens` reporting errors against the same template.
    pub(crate) fn sub(&self, tokens: Vec<Token>, end: Position) -> Self {
        Self {
            template: self.template.clone(),
            tokens,
            cursor: 0,
            end,
            depth: 0,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset)
    }

    /// The token right before the cursor.
    pub fn previous(&self) -> Option<&Token> {
        self.cursor.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    /// Runs `f` one nesting level deeper.
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.depth;
        self.deepen()?;
        let result = f(self);
        self.depth = depth;
        result
    }

    /// Counts one more level of nesting, for left-associative chains that
    /// grow the tree in a loop rather than by recursion.
    pub fn deepen(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn restore_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn is_eof(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    pub fn save(&self) -> usize {
        self.cursor
    }

    pub fn restore(&mut self, mark: usize) {
        self.cursor = mark.min(self.tokens.len());
    }

    /// Position of the next token, or the end of the stream.
    pub fn position(&self) -> Position {
        self.peek().map(|t| t.pos).unwrap_or(self.end)
    }

    pub fn error(&self, message: impl Into<String>) -> Error {
        self.error_at(self.position(), message)
    }

    pub fn error_at(&self, pos: Position, message: impl Into<String>) -> Error {
        Error::Parse {
            template: self.template.to_string(),
            pos,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        match self.peek() {
            Some(token) => self.error(format!("expected {}, found {}", expected, token)),
            None => self.error(format!("expected {}, found end of tag", expected)),
        }
    }

    pub fn peek_name(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_name(name))
    }

    pub fn peek_op(&self, op: &str) -> bool {
        self.peek().is_some_and(|t| t.is_op(op))
    }

    pub fn peek_kind(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    pub fn skip_name(&mut self, name: &str) -> bool {
        let found = self.peek_name(name);
        if found {
            self.cursor += 1;
        }
        found
    }

    pub fn skip_op(&mut self, op: &str) -> bool {
        let found = self.peek_op(op);
        if found {
            self.cursor += 1;
        }
        found
    }

    pub fn expect_name(&mut self, name: &str) -> Result<Position> {
        if self.peek_name(name) {
            let pos = self.position();
            self.cursor += 1;
            Ok(pos)
        } else {
            Err(self.unexpected(&format!("'{}'", name)))
        }
    }

    /// Any identifier, returned with its position.
    pub fn expect_identifier(&mut self) -> Result<(String, Position)> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Name => {
                let (text, pos) = (t.text.clone(), t.pos);
                self.cursor += 1;
                Ok((text, pos))
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    pub fn expect_op(&mut self, op: &str) -> Result<Position> {
        if self.peek_op(op) {
            let pos = self.position();
            self.cursor += 1;
            Ok(pos)
        } else {
            Err(self.unexpected(&format!("'{}'", op)))
        }
    }

    pub fn expect_kind(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                let token = t.clone();
                self.cursor += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// Fails unless every token has been consumed.
    pub fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected {} at end of tag", token))),
        }
    }
}
