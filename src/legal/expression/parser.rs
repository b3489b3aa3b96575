//! Expression parser
//!
//! Parser combinators (chumsky) over the logos token stream. Precedence, loosest first:
//!
//! ```text
//! ternary      cond ? a : b
//! or           ||  OR
//! and          &&  AND
//! equality     ==  !=
//! comparison   <  <=  >  >=
//! additive     +  -
//! product      *  /  %
//! unary        !  NOT  -
//! atom         literal | [ items ] | helper(args) | path | . | ( expr )
//! ```

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::token::{tokenize, Token};
use crate::legal::value::{PathSegment, Value};
use chumsky::prelude::*;
use chumsky::Stream;
use std::fmt;

/// Type alias for parser error
type ParserError = Simple<Token>;

/// Why an expression could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    Empty,
    /// Input the lexer does not recognize, at this byte offset.
    Lex(usize),
    Syntax(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionError::Empty => write!(f, "empty expression"),
            ExpressionError::Lex(offset) => write!(f, "unrecognized input at offset {}", offset),
            ExpressionError::Syntax(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ExpressionError {}

/// Parse a complete expression.
pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source).map_err(ExpressionError::Lex)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let len = source.len();
    let stream = Stream::from_iter(len..len + 1, tokens.into_iter());

    expression()
        .then_ignore(end())
        .parse(stream)
        .map_err(|errors| ExpressionError::Syntax(describe(&errors)))
}

fn describe(errors: &[ParserError]) -> String {
    match errors.first() {
        Some(err) => match err.found() {
            Some(token) => format!("unexpected '{}' at offset {}", token, err.span().start),
            None => "unexpected end of expression".to_string(),
        },
        None => "invalid expression".to_string(),
    }
}

fn number_value(raw: &str) -> Value {
    Value::Number(raw.parse::<f64>().unwrap_or(f64::NAN))
}

/// `items.0.1` lexes the trailing `0.1` as one number; split it back into indexes.
fn index_segments(raw: &str) -> Vec<PathSegment> {
    raw.split('.')
        .map(|part| match part.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(part.to_string()),
        })
        .collect()
}

fn binary_level<P, O>(operand: P, operator: O) -> BoxedParser<'static, Token, Expr, ParserError>
where
    P: Parser<Token, Expr, Error = ParserError> + Clone + 'static,
    O: Parser<Token, BinaryOp, Error = ParserError> + Clone + 'static,
{
    operand
        .clone()
        .then(operator.then(operand).repeated())
        .foldl(|lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)))
        .boxed()
}

fn expression() -> impl Parser<Token, Expr, Error = ParserError> + Clone {
    recursive(|expr| {
        let ident = select! { Token::Ident(name) => name };

        let literal = select! {
            Token::Number(n) => Expr::Literal(number_value(&n)),
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
        };

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = ident
            .clone()
            .then(args)
            .map(|(name, args)| Expr::Call(name, args));

        let dotted = just(Token::Dot).ignore_then(select! {
            Token::Ident(name) => vec![PathSegment::Key(name)],
            Token::Number(n) => index_segments(&n),
        });
        let bracketed = select! {
            Token::Number(n) => index_segments(&n),
            Token::Str(s) => vec![PathSegment::Key(s)],
            Token::Ident(name) => vec![PathSegment::Key(name)],
        }
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

        let path = ident
            .then(dotted.or(bracketed).repeated())
            .map(|(head, rest)| {
                let mut segments = vec![PathSegment::Key(head)];
                segments.extend(rest.into_iter().flatten());
                Expr::Path(segments)
            });

        let array = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::Array);

        let current_item = just(Token::Dot).to(Expr::this());

        let atom = literal
            .or(array)
            .or(call)
            .or(path)
            .or(current_item)
            .or(expr
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen)))
            .boxed();

        let unary = just(Token::Not)
            .to(UnaryOp::Not)
            .or(just(Token::Minus).to(UnaryOp::Neg))
            .repeated()
            .then(atom)
            .foldr(|op, operand| Expr::Unary(op, Box::new(operand)))
            .boxed();

        let product = binary_level(
            unary,
            just(Token::Star)
                .to(BinaryOp::Mul)
                .or(just(Token::Slash).to(BinaryOp::Div))
                .or(just(Token::Percent).to(BinaryOp::Rem)),
        );

        let sum = binary_level(
            product,
            just(Token::Plus)
                .to(BinaryOp::Add)
                .or(just(Token::Minus).to(BinaryOp::Sub)),
        );

        let comparison = binary_level(
            sum,
            just(Token::LtEq)
                .to(BinaryOp::LtEq)
                .or(just(Token::GtEq).to(BinaryOp::GtEq))
                .or(just(Token::Lt).to(BinaryOp::Lt))
                .or(just(Token::Gt).to(BinaryOp::Gt)),
        );

        let equality = binary_level(
            comparison,
            just(Token::Eq)
                .to(BinaryOp::Eq)
                .or(just(Token::NotEq).to(BinaryOp::NotEq)),
        );

        let and = binary_level(equality, just(Token::And).to(BinaryOp::And));
        let or = binary_level(and, just(Token::Or).to(BinaryOp::Or));

        or.then(
            just(Token::Question)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Colon))
                .then(expr)
                .or_not(),
        )
        .map(|(cond, branches)| match branches {
            Some((then, otherwise)) => {
                Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise))
            }
            None => cond,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Expr {
        Expr::Path(
            segments
                .iter()
                .map(|s| match s.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(s.to_string()),
                })
                .collect(),
        )
    }

    #[test]
    fn test_simple_path() {
        assert_eq!(parse_expression("client.name").unwrap(), path(&["client", "name"]));
    }

    #[test]
    fn test_indexed_paths() {
        assert_eq!(
            parse_expression("parties[1].name").unwrap(),
            path(&["parties", "1", "name"])
        );
        assert_eq!(
            parse_expression("matrix.0.1").unwrap(),
            path(&["matrix", "0", "1"])
        );
        assert_eq!(
            parse_expression("map['key with space']").unwrap(),
            path(&["map", "key with space"])
        );
    }

    #[test]
    fn test_current_item() {
        assert_eq!(parse_expression(".").unwrap(), Expr::this());
        assert_eq!(parse_expression("this").unwrap(), Expr::this());
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression("42").unwrap(),
            Expr::Literal(Value::Number(42.0))
        );
        assert_eq!(
            parse_expression("'x'").unwrap(),
            Expr::Literal(Value::String("x".into()))
        );
        assert_eq!(
            parse_expression("false").unwrap(),
            Expr::Literal(Value::Bool(false))
        );
    }

    #[test]
    fn test_array_literals() {
        assert_eq!(parse_expression("[]").unwrap(), Expr::Array(vec![]));
        assert_eq!(
            parse_expression("['a', b,]").unwrap(),
            Expr::Array(vec![
                Expr::Literal(Value::String("a".into())),
                path(&["b"]),
            ])
        );
        assert_eq!(
            parse_expression("items[0]").unwrap(),
            path(&["items", "0"])
        );
        assert!(matches!(
            parse_expression("[a"),
            Err(ExpressionError::Syntax(_))
        ));
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("a || b && c == 1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "(a || (b && (c == (1 + (2 * 3)))))");
    }

    #[test]
    fn test_ternary_nests_right() {
        let expr = parse_expression("a ? 'x' : b ? 'y' : 'z'").unwrap();
        assert_eq!(expr.to_string(), "(a ? \"x\" : (b ? \"y\" : \"z\"))");
    }

    #[test]
    fn test_helper_call_with_nested_arguments() {
        let expr = parse_expression("formatCurrency(add(price, fee), 'EUR')").unwrap();
        assert_eq!(expr.to_string(), "formatCurrency(add(price, fee), \"EUR\")");
        assert_eq!(
            parse_expression("today()").unwrap(),
            Expr::Call("today".into(), vec![])
        );
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(parse_expression("!a").unwrap().to_string(), "!a");
        assert_eq!(parse_expression("NOT a AND b").unwrap().to_string(), "(!a && b)");
        assert_eq!(parse_expression("-x").unwrap().to_string(), "-x");
    }

    #[test]
    fn test_parenthesized() {
        assert_eq!(
            parse_expression("(a || b) && c").unwrap().to_string(),
            "((a || b) && c)"
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_expression("   "), Err(ExpressionError::Empty));
        assert_eq!(parse_expression("a # b"), Err(ExpressionError::Lex(2)));
        assert!(matches!(
            parse_expression("a +"),
            Err(ExpressionError::Syntax(_))
        ));
        assert!(matches!(
            parse_expression("upper(a"),
            Err(ExpressionError::Syntax(_))
        ));
        assert!(matches!(
            parse_expression("a b"),
            Err(ExpressionError::Syntax(_))
        ));
    }
}
