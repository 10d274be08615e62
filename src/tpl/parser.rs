use crate::Result;
use crate::config::Config;
use crate::environment::Environment;
use crate::error::Position;
use crate::loader::Loader;
use crate::tpl::ast::{ControlStructureBlock, Expr, Macro, Node, Template, Wrapper};
use crate::tpl::expr;
use crate::tpl::lexer::{Lexer, Token, TokenKind};
use crate::tpl::stream::{MAX_NESTING, TokenStream};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Lexes and parses one template source.
///
/// `ancestry` holds the ids of the templates whose parsing is waiting on this
/// one through `extends`; reaching any of them again is a cycle.
pub(crate) fn compile(
    env: &Environment,
    name: &str,
    source: &str,
    loader: Arc<dyn Loader>,
    config: Arc<Config>,
    ancestry: &[String],
) -> Result<Template> {
    let tokens = Lexer::new(
        name,
        source,
        &config.syntax,
        config.trim_blocks,
        config.lstrip_blocks,
    )
    .tokenize()?;
    Parser::new(env, name, tokens, loader, config)
        .with_ancestry(ancestry.to_vec())
        .parse()
}

/// Recursive-descent parser turning a token stream into a [`Template`].
///
/// Tag bodies are parsed by the functions in the environment's statement
/// registry. Those functions receive the parser itself, so they can parse
/// nested regions with [`Parser::wrap_until`] and record blocks, macros and
/// the parent template.
pub struct Parser<'a> {
    env: &'a Environment,
    name: String,
    stream: TokenStream,
    loader: Arc<dyn Loader>,
    config: Arc<Config>,
    ancestry: Vec<String>,
    blocks: HashMap<String, Arc<Wrapper>>,
    macros: BTreeMap<String, Arc<Macro>>,
    parent: Option<Arc<Template>>,
    nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        env: &'a Environment,
        name: &str,
        tokens: Vec<Token>,
        loader: Arc<dyn Loader>,
        config: Arc<Config>,
    ) -> Self {
        let end = tokens.last().map(|t| t.pos).unwrap_or_default();
        Self {
            env,
            name: name.to_string(),
            stream: TokenStream::new(name, tokens, end),
            loader,
            config,
            ancestry: Vec::new(),
            blocks: HashMap::new(),
            macros: BTreeMap::new(),
            parent: None,
            nesting: 0,
        }
    }

    pub fn with_ancestry(mut self, ancestry: Vec<String>) -> Self {
        self.ancestry = ancestry;
        self
    }

    pub fn parse(mut self) -> Result<Template> {
        let (root, _) = self.wrap_until(&[])?;
        debug!(
            "Parsed template '{}' ({} nodes, {} blocks, {} macros)",
            self.name,
            root.nodes.len(),
            self.blocks.len(),
            self.macros.len()
        );
        Ok(Template {
            name: self.name,
            nodes: root.nodes,
            blocks: self.blocks,
            macros: self.macros,
            parent: self.parent,
            loader: self.loader,
            config: self.config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses nodes until a block tag named in `ends` appears at this level.
    ///
    /// Returns the collected nodes, with the closing tag's name recorded, and
    /// a stream over that tag's own arguments. An empty `ends` parses to the
    /// end of the template.
    pub fn wrap_until(&mut self, ends: &[&str]) -> Result<(Wrapper, TokenStream)> {
        if self.nesting >= MAX_NESTING {
            return Err(self.stream.error(format!(
                "tags nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.nesting += 1;
        let result = self.wrap_nodes(ends);
        self.nesting -= 1;
        result
    }

    fn wrap_nodes(&mut self, ends: &[&str]) -> Result<(Wrapper, TokenStream)> {
        let start = self.stream.position();
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.stream.peek() else {
                if ends.is_empty() {
                    let wrapper = Wrapper {
                        nodes,
                        end_tag: None,
                        pos: start,
                    };
                    return Ok((wrapper, self.stream.sub(Vec::new(), start)));
                }
                return Err(self.stream.error_at(
                    start,
                    format!("unterminated block, expected '{}'", ends.join("' or '")),
                ));
            };

            match token.kind {
                TokenKind::Data => {
                    let trim_left = self.stream.previous().is_some_and(|t| t.trim_after);
                    let Some(data) = self.stream.next() else {
                        continue;
                    };
                    let trim_right = self.stream.peek().is_some_and(|t| t.trim_before);
                    nodes.push(Node::Data {
                        text: data.text,
                        trim_left,
                        trim_right,
                        pos: data.pos,
                    });
                }
                TokenKind::Comment => {
                    let pos = token.pos;
                    self.stream.next();
                    nodes.push(Node::Comment { pos });
                }
                TokenKind::VariableBegin => {
                    let pos = token.pos;
                    let mut args = self.take_tag(TokenKind::VariableEnd)?;
                    let expr = expr::parse_expression(&mut args)?;
                    args.expect_end()?;
                    nodes.push(Node::Output { expr, pos });
                }
                TokenKind::BlockBegin => {
                    let pos = token.pos;
                    let mut args = self.take_tag(TokenKind::BlockEnd)?;
                    let (tag, tag_pos) = args.expect_identifier()?;
                    if ends.contains(&tag.as_str()) {
                        let wrapper = Wrapper {
                            nodes,
                            end_tag: Some(tag),
                            pos: start,
                        };
                        return Ok((wrapper, args));
                    }
                    let Some(parse_fn) = self.env.statements().get(&tag) else {
                        return Err(args.error_at(tag_pos, format!("unknown tag '{}'", tag)));
                    };
                    let statement = parse_fn(self, &mut args)?;
                    args.expect_end()?;
                    nodes.push(Node::Control(ControlStructureBlock {
                        name: tag,
                        statement,
                        pos,
                    }));
                }
                _ => {
                    let message = format!("unexpected {}", token);
                    return Err(self.stream.error(message));
                }
            }
        }
    }

    /// Consumes a whole tag and returns a stream over the tokens between its
    /// delimiters.
    fn take_tag(&mut self, end: TokenKind) -> Result<TokenStream> {
        let open = self.stream.next();
        let mut tokens = Vec::new();
        while let Some(token) = self.stream.next() {
            if token.kind == end {
                return Ok(self.stream.sub(tokens, token.pos));
            }
            tokens.push(token);
        }
        let pos = open.map(|t| t.pos).unwrap_or_default();
        Err(self.stream.error_at(pos, "unterminated tag"))
    }

    pub fn parse_expression(&self, args: &mut TokenStream) -> Result<Expr> {
        expr::parse_expression(args)
    }

    /// Registers a block body; a name may only be defined once per template.
    pub fn declare_block(&mut self, name: &str, body: Wrapper, pos: Position) -> Result<()> {
        if self.blocks.contains_key(name) {
            return Err(self
                .stream
                .error_at(pos, format!("block '{}' defined twice", name)));
        }
        self.blocks.insert(name.to_string(), Arc::new(body));
        Ok(())
    }

    pub fn declare_macro(&mut self, def: Arc<Macro>) {
        self.macros.insert(def.name.clone(), def);
    }

    /// Resolves, loads and records the parent template.
    pub fn extend(&mut self, path: &str, pos: Position) -> Result<()> {
        if self.parent.is_some() {
            return Err(self
                .stream
                .error_at(pos, "template already extends another template"));
        }
        let loader = self.loader.inherit(&self.name)?;
        let id = loader.resolve(path)?;
        if id == self.name || self.ancestry.contains(&id) {
            let mut cycle = self.ancestry.clone();
            cycle.push(self.name.clone());
            cycle.push(id);
            return Err(self
                .stream
                .error_at(pos, format!("cyclic extends: {}", cycle.join(" -> "))));
        }
        let mut ancestry = self.ancestry.clone();
        ancestry.push(self.name.clone());
        let parent = self.env.load(&id, loader, &self.config, &ancestry)?;
        self.parent = Some(parent);
        Ok(())
    }
}
