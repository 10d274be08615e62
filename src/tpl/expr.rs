//! Recursive-descent expression grammar.
//!
//! Precedence, loosest first: inline `if`, `or`, `and`, `not`, comparisons,
//! `+ -`, `~`, `* / // %`, `**`, unary sign, then primaries with their postfix
//! accessors and the filter/test chain.

use crate::Result;
use crate::error::Position;
use crate::tpl::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::tpl::lexer::TokenKind;
use crate::tpl::stream::TokenStream;
use crate::value::Value;

/// Names that end a bare test argument (`x is divisibleby 3`).
const KEYWORDS: [&str; 7] = ["and", "or", "not", "in", "is", "if", "else"];

pub fn parse_expression(s: &mut TokenStream) -> Result<Expr> {
    s.nested(parse_cond)
}

fn parse_cond(s: &mut TokenStream) -> Result<Expr> {
    let expr = parse_or(s)?;
    if !s.peek_name("if") {
        return Ok(expr);
    }
    let pos = s.expect_name("if")?;
    let test = parse_or(s)?;
    let otherwise = if s.skip_name("else") {
        Some(Box::new(parse_expression(s)?))
    } else {
        None
    };
    Ok(Expr::new(
        ExprKind::Cond {
            test: Box::new(test),
            then: Box::new(expr),
            otherwise,
        },
        pos,
    ))
}

/// An expression without a trailing inline `if`, used where `if` has its
/// own meaning (the iterable of a `for` loop).
pub fn parse_expression_no_cond(s: &mut TokenStream) -> Result<Expr> {
    parse_or(s)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), pos)
}

fn parse_or(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_and(s)?;
    while s.skip_name("or") {
        s.deepen()?;
        let right = parse_and(s)?;
        left = binary(BinaryOp::Or, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_and(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_not(s)?;
    while s.skip_name("and") {
        s.deepen()?;
        let right = parse_not(s)?;
        left = binary(BinaryOp::And, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_not(s: &mut TokenStream) -> Result<Expr> {
    if s.peek_name("not") {
        let pos = s.expect_name("not")?;
        let operand = s.nested(parse_not)?;
        return Ok(Expr::new(
            ExprKind::Unary(UnaryOp::Not, Box::new(operand)),
            pos,
        ));
    }
    parse_compare(s)
}

fn parse_compare(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_math1(s)?;
    loop {
        let op = match s.peek() {
            Some(t) if t.kind == TokenKind::Operator => match t.text.as_str() {
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "<" => BinaryOp::Lt,
                ">" => BinaryOp::Gt,
                "<=" => BinaryOp::Le,
                ">=" => BinaryOp::Ge,
                _ => break,
            },
            Some(t) if t.is_name("in") => BinaryOp::In,
            Some(t) if t.is_name("not") && s.peek_at(1).is_some_and(|n| n.is_name("in")) => {
                s.next();
                BinaryOp::NotIn
            }
            _ => break,
        };
        s.next();
        s.deepen()?;
        let right = parse_math1(s)?;
        left = binary(op, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_math1(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_concat(s)?;
    loop {
        let op = if s.skip_op("+") {
            BinaryOp::Add
        } else if s.skip_op("-") {
            BinaryOp::Sub
        } else {
            break;
        };
        s.deepen()?;
        let right = parse_concat(s)?;
        left = binary(op, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_concat(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_math2(s)?;
    while s.skip_op("~") {
        s.deepen()?;
        let right = parse_math2(s)?;
        left = binary(BinaryOp::Concat, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_math2(s: &mut TokenStream) -> Result<Expr> {
    let depth = s.depth();
    let mut left = parse_pow(s)?;
    loop {
        let op = match s.peek() {
            Some(t) if t.is_op("*") => BinaryOp::Mul,
            Some(t) if t.is_op("/") => BinaryOp::Div,
            Some(t) if t.is_op("//") => BinaryOp::FloorDiv,
            Some(t) if t.is_op("%") => BinaryOp::Rem,
            _ => break,
        };
        s.next();
        s.deepen()?;
        let right = parse_pow(s)?;
        left = binary(op, left, right);
    }
    s.restore_depth(depth);
    Ok(left)
}

fn parse_pow(s: &mut TokenStream) -> Result<Expr> {
    let left = parse_unary(s, true)?;
    if s.skip_op("**") {
        let right = s.nested(parse_pow)?;
        return Ok(binary(BinaryOp::Pow, left, right));
    }
    Ok(left)
}

fn parse_unary(s: &mut TokenStream, with_filter: bool) -> Result<Expr> {
    let pos = s.position();
    let op = if s.skip_op("-") {
        Some(UnaryOp::Neg)
    } else if s.skip_op("+") {
        Some(UnaryOp::Pos)
    } else {
        None
    };
    let expr = match op {
        Some(op) => Expr::new(
            ExprKind::Unary(op, Box::new(s.nested(|s| parse_unary(s, false))?)),
            pos,
        ),
        None => {
            let primary = parse_primary(s)?;
            parse_postfix(s, primary)?
        }
    };
    if with_filter {
        parse_filter_chain(s, expr)
    } else {
        Ok(expr)
    }
}

fn parse_primary(s: &mut TokenStream) -> Result<Expr> {
    let pos = s.position();
    let Some(token) = s.next() else {
        return Err(s.error("expected an expression, found end of tag"));
    };
    let kind = match token.kind {
        TokenKind::Name => match token.text.as_str() {
            "none" | "None" => ExprKind::Const(Value::NONE),
            _ => ExprKind::Name(token.text),
        },
        TokenKind::Bool => ExprKind::Const(Value::from(token.text.eq_ignore_ascii_case("true"))),
        TokenKind::String => {
            let mut text = token.text;
            while s.peek_kind(TokenKind::String) {
                if let Some(next) = s.next() {
                    text.push_str(&next.text);
                }
            }
            ExprKind::Const(Value::from(text))
        }
        TokenKind::Int => {
            let n: i64 = token
                .text
                .parse()
                .map_err(|_| s.error_at(pos, format!("integer literal {} out of range", token.text)))?;
            ExprKind::Const(Value::from(n))
        }
        TokenKind::Float => {
            let f: f64 = token
                .text
                .parse()
                .map_err(|_| s.error_at(pos, format!("invalid float literal {}", token.text)))?;
            ExprKind::Const(Value::from(f))
        }
        TokenKind::Operator if token.text == "(" => return parse_paren(s, pos),
        TokenKind::Operator if token.text == "[" => {
            let items = parse_items(s, "]")?;
            ExprKind::List(items)
        }
        TokenKind::Operator if token.text == "{" => parse_dict(s)?,
        _ => return Err(s.error_at(pos, format!("unexpected {}", token))),
    };
    Ok(Expr::new(kind, pos))
}

/// `( expr )`, `()`, `(a,)` or `(a, b)`; the opening paren is consumed.
fn parse_paren(s: &mut TokenStream, pos: Position) -> Result<Expr> {
    if s.skip_op(")") {
        return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
    }
    let first = parse_expression(s)?;
    if s.skip_op(")") {
        return Ok(first);
    }
    s.expect_op(",")?;
    let mut items = vec![first];
    items.extend(parse_items(s, ")")?);
    Ok(Expr::new(ExprKind::Tuple(items), pos))
}

/// Comma separated expressions up to `close`, trailing comma allowed.
fn parse_items(s: &mut TokenStream, close: &str) -> Result<Vec<Expr>> {
    let mut items = Vec::new();
    while !s.skip_op(close) {
        if !items.is_empty() {
            s.expect_op(",")?;
            if s.skip_op(close) {
                break;
            }
        }
        items.push(parse_expression(s)?);
    }
    Ok(items)
}

fn parse_dict(s: &mut TokenStream) -> Result<ExprKind> {
    let mut pairs = Vec::new();
    while !s.skip_op("}") {
        if !pairs.is_empty() {
            s.expect_op(",")?;
            if s.skip_op("}") {
                break;
            }
        }
        let key = parse_expression(s)?;
        s.expect_op(":")?;
        let value = parse_expression(s)?;
        pairs.push((key, value));
    }
    Ok(ExprKind::Dict(pairs))
}

fn parse_postfix(s: &mut TokenStream, mut expr: Expr) -> Result<Expr> {
    let depth = s.depth();
    loop {
        let pos = s.position();
        if s.peek_op(".") || s.peek_op("[") || s.peek_op("(") {
            s.deepen()?;
        }
        if s.skip_op(".") {
            let attr = match s.next() {
                Some(t) if t.kind == TokenKind::Name || t.kind == TokenKind::Int => t.text,
                _ => return Err(s.error_at(pos, "expected attribute name after '.'")),
            };
            expr = Expr::new(ExprKind::GetAttr(Box::new(expr), attr), pos);
        } else if s.skip_op("[") {
            expr = parse_subscript(s, expr, pos)?;
        } else if s.skip_op("(") {
            let (args, kwargs) = parse_call_args(s)?;
            expr = Expr::new(
                ExprKind::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                },
                pos,
            );
        } else {
            s.restore_depth(depth);
            return Ok(expr);
        }
    }
}

fn parse_subscript(s: &mut TokenStream, target: Expr, pos: Position) -> Result<Expr> {
    let start = if s.peek_op(":") {
        None
    } else {
        Some(Box::new(parse_expression(s)?))
    };
    if !s.skip_op(":") {
        s.expect_op("]")?;
        let key = start.ok_or_else(|| s.error_at(pos, "empty subscript"))?;
        return Ok(Expr::new(ExprKind::GetItem(Box::new(target), key), pos));
    }
    let stop = if s.peek_op("]") || s.peek_op(":") {
        None
    } else {
        Some(Box::new(parse_expression(s)?))
    };
    let step = if s.skip_op(":") && !s.peek_op("]") {
        Some(Box::new(parse_expression(s)?))
    } else {
        None
    };
    s.expect_op("]")?;
    Ok(Expr::new(
        ExprKind::Slice {
            target: Box::new(target),
            start,
            stop,
            step,
        },
        pos,
    ))
}

/// Arguments after an opening paren, up to and including the closing one.
pub fn parse_call_args(s: &mut TokenStream) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
    let mut args = Vec::new();
    let mut kwargs: Vec<(String, Expr)> = Vec::new();
    let mut first = true;
    while !s.skip_op(")") {
        if !first {
            s.expect_op(",")?;
            if s.skip_op(")") {
                break;
            }
        }
        first = false;
        let is_kwarg = s.peek_kind(TokenKind::Name) && s.peek_at(1).is_some_and(|t| t.is_op("="));
        if is_kwarg {
            let (name, pos) = s.expect_identifier()?;
            s.expect_op("=")?;
            if kwargs.iter().any(|(k, _)| *k == name) {
                return Err(s.error_at(pos, format!("duplicate keyword argument '{}'", name)));
            }
            kwargs.push((name, parse_expression(s)?));
        } else {
            if !kwargs.is_empty() {
                return Err(s.error("positional argument follows keyword argument"));
            }
            args.push(parse_expression(s)?);
        }
    }
    Ok((args, kwargs))
}

/// Whether the next token can start the bare argument of a test.
fn starts_test_argument(s: &TokenStream) -> bool {
    match s.peek() {
        Some(t) => match t.kind {
            TokenKind::Name => !KEYWORDS.contains(&t.text.as_str()),
            TokenKind::String | TokenKind::Int | TokenKind::Float | TokenKind::Bool => true,
            TokenKind::Operator => matches!(t.text.as_str(), "[" | "{"),
            _ => false,
        },
        None => false,
    }
}

fn parse_filter_chain(s: &mut TokenStream, mut expr: Expr) -> Result<Expr> {
    let depth = s.depth();
    loop {
        if s.peek_op("|") {
            s.deepen()?;
            let pos = s.expect_op("|")?;
            let (name, _) = s.expect_identifier()?;
            let (args, kwargs) = if s.skip_op("(") {
                parse_call_args(s)?
            } else {
                (Vec::new(), Vec::new())
            };
            expr = Expr::new(
                ExprKind::Filter {
                    target: Box::new(expr),
                    name,
                    args,
                    kwargs,
                },
                pos,
            );
        } else if s.peek_name("is") {
            s.deepen()?;
            let pos = s.expect_name("is")?;
            let negated = s.skip_name("not");
            let (name, _) = match s.peek() {
                // `none` lexes as a name; accept it as the test name too
                Some(t) if t.kind == TokenKind::Name => s.expect_identifier()?,
                _ => return Err(s.error("expected test name after 'is'")),
            };
            let args = if s.skip_op("(") {
                let (args, kwargs) = parse_call_args(s)?;
                if !kwargs.is_empty() {
                    return Err(s.error_at(pos, "tests take no keyword arguments"));
                }
                args
            } else if starts_test_argument(s) {
                let primary = parse_primary(s)?;
                vec![parse_postfix(s, primary)?]
            } else {
                Vec::new()
            };
            expr = Expr::new(
                ExprKind::Test {
                    target: Box::new(expr),
                    name,
                    args,
                    negated,
                },
                pos,
            );
        } else {
            s.restore_depth(depth);
            return Ok(expr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Syntax;
    use crate::tpl::lexer::Lexer;

    fn parse(src: &str) -> Expr {
        let source = format!("{{{{ {} }}}}", src);
        let mut tokens = Lexer::new("t", &source, &Syntax::default(), false, false)
            .tokenize()
            .unwrap();
        tokens.remove(0);
        tokens.pop();
        let mut s = TokenStream::new("t", tokens, Position::default());
        let expr = parse_expression(&mut s).unwrap();
        s.expect_end().unwrap();
        expr
    }

    fn shape(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Const(v) => v.repr(),
            ExprKind::Name(n) => n.clone(),
            ExprKind::Binary(op, l, r) => format!("({} {} {})", shape(l), op.symbol(), shape(r)),
            ExprKind::Unary(op, x) => format!("({:?} {})", op, shape(x)),
            ExprKind::Filter { target, name, args, .. } => format!(
                "{}|{}({})",
                shape(target),
                name,
                args.iter().map(shape).collect::<Vec<_>>().join(",")
            ),
            ExprKind::Test {
                target,
                name,
                args,
                negated,
            } => format!(
                "{} is{} {}({})",
                shape(target),
                if *negated { " not" } else { "" },
                name,
                args.iter().map(shape).collect::<Vec<_>>().join(",")
            ),
            ExprKind::GetAttr(t, n) => format!("{}.{}", shape(t), n),
            ExprKind::GetItem(t, k) => format!("{}[{}]", shape(t), shape(k)),
            ExprKind::Cond {
                test,
                then,
                otherwise,
            } => format!(
                "({} if {} else {})",
                shape(then),
                shape(test),
                otherwise.as_ref().map(|o| shape(o)).unwrap_or_default()
            ),
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(shape(&parse("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(shape(&parse("a ~ b + c")), "((a ~ b) + c)");
        assert_eq!(shape(&parse("2 ** 3 ** 2")), "(2 ** (3 ** 2))");
        assert_eq!(shape(&parse("-2 ** 2")), "((Neg 2) ** 2)");
        assert_eq!(
            shape(&parse("not a == b or c and d")),
            "((Not (a == b)) or (c and d))"
        );
        assert_eq!(shape(&parse("a not in b")), "(a not in b)");
    }

    #[test]
    fn test_postfix_and_filters() {
        assert_eq!(shape(&parse("user.items.0")), "user.items.0");
        assert_eq!(
            shape(&parse("x['k']|upper|join(', ')")),
            "x['k']|upper()|join(', ')"
        );
        assert_eq!(shape(&parse("-x|abs")), "(Neg x)|abs()");
    }

    #[test]
    fn test_tests() {
        assert_eq!(shape(&parse("n is divisibleby 3")), "n is divisibleby(3)");
        assert_eq!(shape(&parse("x is not none")), "x is not none()");
        assert_eq!(
            shape(&parse("x is defined and y")),
            "(x is defined() and y)"
        );
    }

    #[test]
    fn test_conditional() {
        assert_eq!(shape(&parse("a if b else c")), "(a if b else c)");
        assert_eq!(shape(&parse("a if b")), "(a if b else )");
    }

    #[test]
    fn test_literals_and_slices() {
        assert!(matches!(parse("[1, 2,]").kind, ExprKind::List(ref v) if v.len() == 2));
        assert!(matches!(parse("(1,)").kind, ExprKind::Tuple(ref v) if v.len() == 1));
        assert!(matches!(parse("{'a': 1, 'b': 2}").kind, ExprKind::Dict(ref v) if v.len() == 2));
        assert!(matches!(parse("'a' 'b'").kind, ExprKind::Const(ref v) if *v == Value::from("ab")));
        match parse("x[::-1]").kind {
            ExprKind::Slice { start, stop, step, .. } => {
                assert!(start.is_none() && stop.is_none() && step.is_some());
            }
            other => panic!("expected slice, got {:?}", other),
        }
    }

    #[test]
    fn test_call_arguments() {
        match parse("f(1, b=2)").kind {
            ExprKind::Call { args, kwargs, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs[0].0, "b");
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_errors() {
        let source = "{{ f(a=1, 2) }}";
        let mut tokens = Lexer::new("t", source, &Syntax::default(), false, false)
            .tokenize()
            .unwrap();
        tokens.remove(0);
        tokens.pop();
        let mut s = TokenStream::new("t", tokens, Position::default());
        assert!(parse_expression(&mut s).is_err());
    }
}
