//! Splits template source into a position-tagged token stream.
//!
//! Text between tags becomes `Data`; each tag becomes a begin token, the
//! tokens of its contents, and an end token. `{% raw %}` switches to a literal
//! scan up to the matching `{% endraw %}`.

use crate::Result;
use crate::config::Syntax;
use crate::error::{Error, Position};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Data,
    Comment,
    BlockBegin,
    BlockEnd,
    VariableBegin,
    VariableEnd,
    Name,
    String,
    Int,
    Float,
    Bool,
    Operator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text; for strings the unescaped contents.
    pub text: String,
    pub pos: Position,
    /// `-` on an opening delimiter: the data before this token is right-trimmed.
    pub trim_before: bool,
    /// `-` on a closing delimiter: the data after this token is left-trimmed.
    pub trim_after: bool,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
            trim_before: false,
            trim_after: false,
        }
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String => write!(f, "'{}'", self.text),
            TokenKind::Data => f.write_str("template data"),
            TokenKind::BlockEnd | TokenKind::VariableEnd => f.write_str("end of tag"),
            _ => f.write_str(&self.text),
        }
    }
}

const OPERATORS_2: [&str; 6] = ["==", "!=", "<=", ">=", "//", "**"];
const OPERATORS_1: &str = "<>+-*/%~|.,:()[]{}=";

#[derive(Clone, Copy, PartialEq)]
enum Opener {
    Block,
    Variable,
    Comment,
}

pub struct Lexer<'a> {
    name: &'a str,
    src: &'a str,
    syntax: &'a Syntax,
    trim_blocks: bool,
    lstrip_blocks: bool,
    cursor: usize,
    line_starts: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(
        name: &'a str,
        src: &'a str,
        syntax: &'a Syntax,
        trim_blocks: bool,
        lstrip_blocks: bool,
    ) -> Self {
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name,
            src,
            syntax,
            trim_blocks,
            lstrip_blocks,
            cursor: 0,
            line_starts,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let src = self.src;
        while self.cursor < src.len() {
            let Some((start, opener)) = self.next_opener() else {
                self.push_data(self.cursor, &src[self.cursor..]);
                break;
            };
            let open_len = self.open_delim(opener).len();
            let marker = src[start + open_len..].chars().next();
            let (trim_before, keep_indent) = match marker {
                Some('-') => (true, false),
                Some('+') if opener != Opener::Variable => (false, true),
                _ => (false, false),
            };

            let mut data_end = start;
            if opener != Opener::Variable && self.lstrip_blocks && !keep_indent {
                data_end = self.lstrip_cut(self.cursor, start);
            }
            self.push_data(self.cursor, &src[self.cursor..data_end]);

            let inner = start + open_len + usize::from(trim_before || keep_indent);
            match opener {
                Opener::Comment => self.lex_comment(start, inner, trim_before)?,
                Opener::Variable => self.lex_tag(start, inner, trim_before, Opener::Variable)?,
                Opener::Block => {
                    let first = self.tokens.len();
                    self.lex_tag(start, inner, trim_before, Opener::Block)?;
                    let body = &self.tokens[first + 1..self.tokens.len() - 1];
                    if body.len() == 1 && body[0].is_name("raw") {
                        self.lex_raw(start)?;
                    }
                }
            }
        }
        Ok(self.tokens)
    }

    fn position(&self, idx: usize) -> Position {
        let line = self.line_starts.partition_point(|&s| s <= idx);
        let line_start = self.line_starts[line - 1];
        let col = self.src[line_start..idx].chars().count() + 1;
        Position::new(line, col)
    }

    fn error(&self, idx: usize, message: impl Into<String>) -> Error {
        Error::Lex {
            template: self.name.to_string(),
            pos: self.position(idx),
            message: message.into(),
        }
    }

    fn open_delim(&self, opener: Opener) -> &'a str {
        match opener {
            Opener::Block => &self.syntax.block_start,
            Opener::Variable => &self.syntax.variable_start,
            Opener::Comment => &self.syntax.comment_start,
        }
    }

    fn close_delim(&self, opener: Opener) -> &'a str {
        match opener {
            Opener::Block => &self.syntax.block_end,
            Opener::Variable => &self.syntax.variable_end,
            Opener::Comment => &self.syntax.comment_end,
        }
    }

    /// Earliest opening delimiter from the cursor; the longest wins a tie.
    fn next_opener(&self) -> Option<(usize, Opener)> {
        let rest = &self.src[self.cursor..];
        [Opener::Block, Opener::Variable, Opener::Comment]
            .into_iter()
            .filter_map(|o| {
                let delim = self.open_delim(o);
                rest.find(delim).map(|i| (self.cursor + i, o, delim.len()))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.2.cmp(&a.2)))
            .map(|(idx, o, _)| (idx, o))
    }

    fn push_data(&mut self, start: usize, text: &str) {
        if !text.is_empty() {
            let pos = self.position(start);
            self.tokens.push(Token::new(TokenKind::Data, text, pos));
        }
    }

    /// End of the data run once indentation before a tag at line start is dropped.
    fn lstrip_cut(&self, data_start: usize, tag: usize) -> usize {
        let line_start = self.src[..tag].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let indent = &self.src[line_start..tag];
        if line_start >= data_start && indent.chars().all(|c| c == ' ' || c == '\t') {
            line_start
        } else {
            tag
        }
    }

    /// Skips the newline right after a block or comment tag.
    fn skip_block_newline(&mut self) {
        if !self.trim_blocks {
            return;
        }
        let rest = &self.src[self.cursor..];
        if rest.starts_with("\r\n") {
            self.cursor += 2;
        } else if rest.starts_with('\n') {
            self.cursor += 1;
        }
    }

    fn lex_comment(&mut self, start: usize, inner: usize, trim_before: bool) -> Result<()> {
        let close = self.close_delim(Opener::Comment);
        let Some(offset) = self.src[inner..].find(close) else {
            return Err(self.error(start, "unterminated comment"));
        };
        let end = inner + offset;
        let trim_after = end > inner && self.src[..end].ends_with('-');
        let text_end = if trim_after { end - 1 } else { end };
        let mut token = Token::new(
            TokenKind::Comment,
            &self.src[inner..text_end.max(inner)],
            self.position(start),
        );
        token.trim_before = trim_before;
        token.trim_after = trim_after;
        self.tokens.push(token);
        self.cursor = end + close.len();
        self.skip_block_newline();
        Ok(())
    }

    fn lex_tag(
        &mut self,
        start: usize,
        inner: usize,
        trim_before: bool,
        opener: Opener,
    ) -> Result<()> {
        let (begin_kind, end_kind, what) = match opener {
            Opener::Variable => (TokenKind::VariableBegin, TokenKind::VariableEnd, "variable"),
            _ => (TokenKind::BlockBegin, TokenKind::BlockEnd, "block tag"),
        };
        let close = self.close_delim(opener);
        let mut begin = Token::new(begin_kind, self.open_delim(opener), self.position(start));
        begin.trim_before = trim_before;
        self.tokens.push(begin);

        let mut i = inner;
        let mut depth = 0usize;
        loop {
            while let Some(c) = self.src[i..].chars().next()
                && c.is_whitespace()
            {
                i += c.len_utf8();
            }
            let rest = &self.src[i..];
            if rest.is_empty() {
                return Err(self.error(start, format!("unterminated {}", what)));
            }
            if depth == 0 {
                let trimmed = rest.starts_with('-') && rest[1..].starts_with(close);
                if trimmed || rest.starts_with(close) {
                    let mut end = Token::new(end_kind, close, self.position(i));
                    end.trim_after = trimmed;
                    self.tokens.push(end);
                    self.cursor = i + usize::from(trimmed) + close.len();
                    if opener == Opener::Block {
                        self.skip_block_newline();
                    }
                    return Ok(());
                }
            }
            i = self.lex_inner_token(i, &mut depth)?;
        }
    }

    /// Lexes one token inside a tag starting at `i`, returning the index after it.
    fn lex_inner_token(&mut self, i: usize, depth: &mut usize) -> Result<usize> {
        let rest = &self.src[i..];
        let pos = self.position(i);
        let Some(c) = rest.chars().next() else {
            return Err(self.error(i, "unexpected end of template"));
        };

        if c.is_ascii_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            let word = &rest[..len];
            let kind = match word {
                "true" | "false" | "True" | "False" => TokenKind::Bool,
                _ => TokenKind::Name,
            };
            self.tokens.push(Token::new(kind, word, pos));
            return Ok(i + len);
        }

        if c.is_ascii_digit() {
            let after_dot = self.tokens.last().is_some_and(|t| t.is_op("."));
            let (len, kind) = lex_number(rest, after_dot);
            self.tokens.push(Token::new(kind, rest[..len].replace('_', ""), pos));
            return Ok(i + len);
        }

        if c == '"' || c == '\'' {
            let (value, len) = unescape(&rest[1..], c)
                .ok_or_else(|| self.error(i, "unterminated string literal"))?;
            self.tokens.push(Token::new(TokenKind::String, value, pos));
            return Ok(i + 1 + len);
        }

        if let Some(op) = OPERATORS_2.iter().find(|op| rest.starts_with(**op)) {
            self.tokens.push(Token::new(TokenKind::Operator, *op, pos));
            return Ok(i + 2);
        }
        if OPERATORS_1.contains(c) {
            match c {
                '(' | '[' | '{' => *depth += 1,
                ')' | ']' | '}' => *depth = depth.saturating_sub(1),
                _ => {}
            }
            self.tokens
                .push(Token::new(TokenKind::Operator, c.to_string(), pos));
            return Ok(i + 1);
        }

        Err(self.error(i, format!("unexpected character '{}'", c)))
    }

    /// Scans literally to the matching endraw tag and emits the region as a
    /// single data token followed by the endraw tag tokens.
    fn lex_raw(&mut self, raw_start: usize) -> Result<()> {
        let (src, syntax) = (self.src, self.syntax);
        let open = syntax.block_start.as_str();
        let close = syntax.block_end.as_str();
        let data_start = self.cursor;
        let mut search = data_start;
        while let Some(offset) = src[search..].find(open) {
            let tag = search + offset;
            let mut i = tag + open.len();
            let marker = src[i..].chars().next();
            let trim_before = marker == Some('-');
            let keep_indent = marker == Some('+');
            if trim_before || keep_indent {
                i += 1;
            }
            i += leading_ws(&src[i..]);
            if let Some(after) = src[i..].strip_prefix("endraw") {
                let mut j = i + "endraw".len();
                if after.starts_with(|ch: char| ch.is_ascii_alphanumeric() || ch == '_') {
                    search = tag + open.len();
                    continue;
                }
                j += leading_ws(&src[j..]);
                let trim_after = src[j..].starts_with('-');
                if trim_after {
                    j += 1;
                }
                if src[j..].starts_with(close) {
                    let data_end = if self.lstrip_blocks && !keep_indent {
                        self.lstrip_cut(data_start, tag)
                    } else {
                        tag
                    };
                    let pos = self.position(data_start);
                    self.tokens.push(Token::new(
                        TokenKind::Data,
                        &src[data_start..data_end],
                        pos,
                    ));
                    let mut begin = Token::new(TokenKind::BlockBegin, open, self.position(tag));
                    begin.trim_before = trim_before;
                    self.tokens.push(begin);
                    self.tokens
                        .push(Token::new(TokenKind::Name, "endraw", self.position(i)));
                    let mut end = Token::new(TokenKind::BlockEnd, close, self.position(j));
                    end.trim_after = trim_after;
                    self.tokens.push(end);
                    self.cursor = j + close.len();
                    self.skip_block_newline();
                    return Ok(());
                }
            }
            search = tag + open.len();
        }
        Err(self.error(raw_start, "unterminated raw block"))
    }
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

/// Length and kind of the number at the start of `s`. Right after a `.` only
/// an integer is taken so `items.0.1` is two lookups.
fn lex_number(s: &str, int_only: bool) -> (usize, TokenKind) {
    let bytes = s.as_bytes();
    let digits = |from: usize| {
        let mut i = from;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
            i += 1;
        }
        i
    };
    let mut end = digits(0);
    if int_only {
        return (end, TokenKind::Int);
    }
    let mut kind = TokenKind::Int;
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end = digits(end + 1);
        kind = TokenKind::Float;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            end = digits(j);
            kind = TokenKind::Float;
        }
    }
    (end, kind)
}

/// Reads a quoted string body up to the closing `quote`. Returns the unescaped
/// value and the consumed length including the closing quote.
fn unescape(s: &str, quote: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, next) = chars.next()?;
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            c if c == quote => return Some((out, i + 1)),
            c => out.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new("test", src, &Syntax::default(), false, false)
            .tokenize()
            .unwrap()
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_plain_text_is_one_data_token() {
        let tokens = lex("hello world");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "hello world");
        assert!(lex("").is_empty());
    }

    #[test]
    fn test_variable_tokens() {
        let tokens = lex("a {{ user.name|upper }} b");
        use TokenKind::*;
        assert_eq!(
            kinds(&tokens),
            vec![Data, VariableBegin, Name, Operator, Name, Operator, Name, VariableEnd, Data]
        );
        assert_eq!(tokens[2].pos, Position::new(1, 6));
    }

    #[test]
    fn test_literals() {
        let tokens = lex(r#"{{ 'it\'s' "a\nb" 42 1.5 2e3 true False }}"#);
        let inner: Vec<(TokenKind, &str)> = tokens[1..tokens.len() - 1]
            .iter()
            .map(|t| (t.kind, t.text.as_str()))
            .collect();
        assert_eq!(
            inner,
            vec![
                (TokenKind::String, "it's"),
                (TokenKind::String, "a\nb"),
                (TokenKind::Int, "42"),
                (TokenKind::Float, "1.5"),
                (TokenKind::Float, "2e3"),
                (TokenKind::Bool, "true"),
                (TokenKind::Bool, "False"),
            ]
        );
    }

    #[test]
    fn test_integer_after_dot() {
        let tokens = lex("{{ items.0.1 }}");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["{{", "items", ".", "0", ".", "1", "}}"]);
    }

    #[test]
    fn test_dict_braces_inside_variable() {
        let tokens = lex("{{ {'a': {'b': 1}} }}");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::VariableEnd);
        assert_eq!(
            tokens.iter().filter(|t| t.is_op("}")).count(),
            2
        );
    }

    #[test]
    fn test_trim_markers() {
        let tokens = lex("a {%- if x -%} b {{- y }}");
        assert!(tokens[1].trim_before);
        let end = tokens.iter().find(|t| t.kind == TokenKind::BlockEnd).unwrap();
        assert!(end.trim_after);
        let var = tokens
            .iter()
            .find(|t| t.kind == TokenKind::VariableBegin)
            .unwrap();
        assert!(var.trim_before);
    }

    #[test]
    fn test_raw_region_is_single_data_token() {
        let tokens = lex("{% raw %}{{ x }}{% if %}{% endraw %}");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["{%", "raw", "%}", "{{ x }}{% if %}", "{%", "endraw", "%}"]
        );

        let empty = lex("{% raw %}{% endraw %}");
        assert_eq!(empty[3].kind, TokenKind::Data);
        assert_eq!(empty[3].text, "");
    }

    #[test]
    fn test_trim_blocks_and_lstrip_blocks() {
        let syntax = Syntax::default();
        let src = "<ul>\n  {% if x %}\n  <li>\n  {%+ endif %}\n</ul>";
        let tokens = Lexer::new("t", src, &syntax, true, true).tokenize().unwrap();
        let data: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Data)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(data, vec!["<ul>\n", "  <li>\n  ", "</ul>"]);
    }

    #[test]
    fn test_custom_delimiters() {
        let syntax = Syntax {
            block_start: "<%".into(),
            block_end: "%>".into(),
            variable_start: "${".into(),
            variable_end: "}".into(),
            comment_start: "<#".into(),
            comment_end: "#>".into(),
        };
        let tokens = Lexer::new("t", "{{ a }}<% if b %>${ c }<# d #>", &syntax, false, false)
            .tokenize()
            .unwrap();
        assert_eq!(tokens[0].text, "{{ a }}");
        assert_eq!(tokens[1].kind, TokenKind::BlockBegin);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Comment));
    }

    #[test]
    fn test_errors() {
        let syntax = Syntax::default();
        for (src, message) in [
            ("{{ a", "unterminated variable"),
            ("{% if", "unterminated block tag"),
            ("{# c", "unterminated comment"),
            ("{% raw %}abc", "unterminated raw block"),
            ("{{ 'abc }}", "unterminated string literal"),
            ("{{ a ? b }}", "unexpected character '?'"),
        ] {
            match Lexer::new("t", src, &syntax, false, false).tokenize() {
                Err(Error::Lex { message: m, .. }) => assert_eq!(m, message, "{}", src),
                other => panic!("expected lex error for {:?}, got {:?}", src, other),
            }
        }
    }
}
