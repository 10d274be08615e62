use crate::config::Config;
use crate::error::Position;
use crate::loader::Loader;
use crate::tpl::statements::Statement;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Concat => "~",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Value),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Name(String),
    GetAttr(Box<Expr>, String),
    GetItem(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Filter {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Test {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        negated: bool,
    },
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// Default of a macro parameter declared without one, in strict mode.
    MissingArgument(String),
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    pub fn constant(value: impl Into<Value>, pos: Position) -> Self {
        Self::new(ExprKind::Const(value.into()), pos)
    }

    /// The root name and key path of an assignable expression such as
    /// `a.b["c"]`; `None` for anything else.
    pub fn place(&self) -> Option<(&str, Vec<&Expr>)> {
        match &self.kind {
            ExprKind::Name(name) => Some((name, Vec::new())),
            ExprKind::GetAttr(target, _) | ExprKind::GetItem(target, _) => {
                let (root, mut keys) = target.place()?;
                keys.push(self);
                Some((root, keys))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    /// Raw text; trim flags come from `-` markers on the neighbouring tags.
    Data {
        text: String,
        trim_left: bool,
        trim_right: bool,
        pos: Position,
    },
    Output {
        expr: Expr,
        pos: Position,
    },
    Comment {
        pos: Position,
    },
    Control(ControlStructureBlock),
}

#[derive(Debug, Clone)]
pub struct ControlStructureBlock {
    pub name: String,
    pub statement: Arc<dyn Statement>,
    pub pos: Position,
}

/// A run of nodes and the tag that closed it (`None` at end of template).
#[derive(Debug, Clone, Default)]
pub struct Wrapper {
    pub nodes: Vec<Node>,
    pub end_tag: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct MacroParam {
    pub name: String,
    pub default: Expr,
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Wrapper,
    pub pos: Position,
}

/// A compiled template. Immutable once built and shared across renders.
#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub nodes: Vec<Node>,
    pub blocks: HashMap<String, Arc<Wrapper>>,
    pub macros: BTreeMap<String, Arc<Macro>>,
    pub parent: Option<Arc<Template>>,
    /// The loader the template was read through.
    pub loader: Arc<dyn Loader>,
    pub config: Arc<Config>,
}

impl Template {
    /// This template followed by its ancestors, root last.
    pub fn chain(self: &Arc<Self>) -> Vec<Arc<Template>> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent.clone();
        while let Some(t) = current {
            current = t.parent.clone();
            chain.push(t);
        }
        chain
    }

    /// Macros visible from this template, nearest definition first.
    pub fn find_macro(self: &Arc<Self>, name: &str) -> Option<(Arc<Macro>, Arc<Template>)> {
        self.chain()
            .into_iter()
            .find_map(|t| t.macros.get(name).cloned().map(|m| (m, t)))
    }
}
