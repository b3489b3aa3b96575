//! Token definitions for template expressions
//!
//! Tokenization is handled entirely by logos. Identifiers may contain inner dashes so that
//! metadata keys such as `client-name` or `effective-date` can be referenced directly; a
//! subtraction therefore needs surrounding spaces (`a - b`).

use logos::Logos;
use std::fmt;
use std::ops::Range;

/// All tokens of the expression language
#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[token("&&")]
    #[token("AND")]
    #[token("and")]
    And,
    #[token("||")]
    #[token("OR")]
    #[token("or")]
    Or,
    #[token("!")]
    #[token("NOT")]
    #[token("not")]
    Not,

    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"[A-Za-z_@$][A-Za-z0-9_$]*(-[A-Za-z0-9_$]+)*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(name) => write!(f, "{}", name),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Eq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
        }
    }
}

/// Strip the quotes of a string literal and resolve backslash escapes.
fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Tokenize an expression, returning the byte offset of the first unrecognized input on failure.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Range<usize>)>, usize> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => return Err(lexer.span().start),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_paths_and_dashed_identifiers() {
        assert_eq!(
            kinds("client-name.address[0]"),
            vec![
                Token::Ident("client-name".into()),
                Token::Dot,
                Token::Ident("address".into()),
                Token::LBracket,
                Token::Number("0".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn test_spaced_minus_is_an_operator() {
        assert_eq!(
            kinds("total - 1"),
            vec![
                Token::Ident("total".into()),
                Token::Minus,
                Token::Number("1".into()),
            ]
        );
    }

    #[test]
    fn test_keyword_operators() {
        assert_eq!(
            kinds("a AND NOT b or c"),
            vec![
                Token::Ident("a".into()),
                Token::And,
                Token::Not,
                Token::Ident("b".into()),
                Token::Or,
                Token::Ident("c".into()),
            ]
        );
        assert_eq!(kinds("android"), vec![Token::Ident("android".into())]);
    }

    #[test]
    fn test_string_literals_unescape() {
        assert_eq!(kinds(r#""a \"b\"""#), vec![Token::Str("a \"b\"".into())]);
        assert_eq!(kinds("'it' ''"), vec![Token::Str("it".into()), Token::Str(String::new())]);
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("a >= 1 != b"),
            vec![
                Token::Ident("a".into()),
                Token::GtEq,
                Token::Number("1".into()),
                Token::NotEq,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_unrecognized_input_reports_offset() {
        assert_eq!(tokenize("a # b"), Err(2));
    }

    #[test]
    fn test_display_round_trips_operators() {
        assert_eq!(Token::LtEq.to_string(), "<=");
        assert_eq!(Token::Str("x".into()).to_string(), "\"x\"");
    }
}
