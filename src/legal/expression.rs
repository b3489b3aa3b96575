//! Expression language shared by templates and clause conditions
//!
//! Source text is lexed with logos ([`token`]), parsed into an [`ast::Expr`] with chumsky
//! ([`parser`]) and evaluated against metadata ([`eval`]).

pub mod ast;
pub mod eval;
pub mod parser;
pub mod token;

pub use ast::Expr;
pub use eval::{evaluate, Context, EvalError, Evaluation};
pub use parser::{parse_expression, ExpressionError};
