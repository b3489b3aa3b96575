//! Expression AST
//!
//! Loops and conditionals are block constructs of the template language and live in
//! [`crate::legal::template::Node`]; the nodes here cover everything that can appear between
//! a single pair of `{{ }}` or inside a clause condition.

use crate::legal::value::{path_to_string, PathSegment, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        write!(f, "{}", symbol)
    }
}

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<PathSegment>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    /// `[a, b, ...]`
    Array(Vec<Expr>),
}

impl Expr {
    /// The path `this`, bound to the current loop item.
    pub fn this() -> Expr {
        Expr::Path(vec![PathSegment::Key("this".to_string())])
    }

    /// Plain lookups and literals are leaves; anything computed counts as logic.
    pub fn has_logic(&self) -> bool {
        !matches!(self, Expr::Path(_) | Expr::Literal(_))
    }

    /// Every path referenced anywhere in the expression, in source order.
    pub fn paths(&self) -> Vec<&[PathSegment]> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a [PathSegment]>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(path) => out.push(path),
            Expr::Unary(_, inner) => inner.collect_paths(out),
            Expr::Binary(lhs, _, rhs) => {
                lhs.collect_paths(out);
                rhs.collect_paths(out);
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.collect_paths(out);
                then.collect_paths(out);
                otherwise.collect_paths(out);
            }
            Expr::Call(_, args) | Expr::Array(args) => {
                args.iter().for_each(|arg| arg.collect_paths(out))
            }
        }
    }

    /// Name of the outermost helper call, if any.
    pub fn helper_name(&self) -> Option<&str> {
        match self {
            Expr::Call(name, _) => Some(name),
            Expr::Unary(_, inner) => inner.helper_name(),
            Expr::Binary(lhs, _, rhs) => lhs.helper_name().or_else(|| rhs.helper_name()),
            Expr::Ternary(cond, then, otherwise) => cond
                .helper_name()
                .or_else(|| then.helper_name())
                .or_else(|| otherwise.helper_name()),
            Expr::Array(items) => items.iter().find_map(Expr::helper_name),
            Expr::Literal(_) | Expr::Path(_) => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "{:?}", s),
            Expr::Literal(Value::Null) => write!(f, "null"),
            Expr::Literal(value) => write!(f, "{}", value.render()),
            Expr::Path(path) => write!(f, "{}", path_to_string(path)),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "!{}", inner),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-{}", inner),
            Expr::Binary(lhs, op, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Ternary(cond, then, otherwise) => {
                write!(f, "({} ? {} : {})", cond, then, otherwise)
            }
            Expr::Call(name, args) => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> Expr {
        Expr::Path(vec![PathSegment::Key(name.to_string())])
    }

    #[test]
    fn logic_classification() {
        assert!(!path("a").has_logic());
        assert!(!Expr::Literal(Value::Bool(true)).has_logic());
        assert!(Expr::Call("upper".into(), vec![path("a")]).has_logic());
        assert!(Expr::Ternary(
            Box::new(path("a")),
            Box::new(path("b")),
            Box::new(path("c"))
        )
        .has_logic());
    }

    #[test]
    fn collects_paths_in_order() {
        let expr = Expr::Binary(
            Box::new(path("a")),
            BinaryOp::And,
            Box::new(Expr::Call("upper".into(), vec![path("b")])),
        );
        let names: Vec<String> = expr.paths().iter().map(|p| path_to_string(p)).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(expr.helper_name(), Some("upper"));
        assert_eq!(expr.to_string(), "(a && upper(b))");
    }

    #[test]
    fn arrays_collect_element_paths() {
        let expr = Expr::Array(vec![path("a"), Expr::Call("upper".into(), vec![path("b")])]);
        assert!(expr.has_logic());
        assert_eq!(expr.paths().len(), 2);
        assert_eq!(expr.helper_name(), Some("upper"));
        assert_eq!(expr.to_string(), "[a, upper(b)]");
    }
}
