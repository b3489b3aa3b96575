//! Header format patterns
//!
//! A pattern such as `Article %n.` or `%n.%n %s` is parsed once per level into pieces. Counter
//! placeholders bind right-aligned to the counter stack: in a pattern for depth D with k counter
//! placeholders, the i-th one renders the counter of depth `D - k + 1 + i`.
//!
//! | placeholder | renders |
//! |---|---|
//! | `%n` | decimal |
//! | `%A` / `%a` | alphabetic, upper / lower (`Z` is followed by `AA`) |
//! | `%R` / `%r` | Roman numeral, upper / lower |
//! | `%c` | this depth's counter in decimal, not bound positionally |
//! | `%s` | the header text |
//! | `%%` | a literal `%` |

use std::fmt;

/// Pattern used for a level whose configured pattern is malformed.
pub const FALLBACK_PATTERN: &str = "%n.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Decimal,
    UpperAlpha,
    LowerAlpha,
    UpperRoman,
    LowerRoman,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Counter(Style),
    Current,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Blank,
    UnknownPlaceholder(char),
    TrailingPercent,
    TooManyCounters { found: usize, depth: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Blank => write!(f, "pattern is blank"),
            FormatError::UnknownPlaceholder(ch) => write!(f, "unknown placeholder '%{}'", ch),
            FormatError::TrailingPercent => write!(f, "pattern ends with a lone '%'"),
            FormatError::TooManyCounters { found, depth } => write!(
                f,
                "{} counter placeholders but the header is only {} deep",
                found, depth
            ),
        }
    }
}

impl std::error::Error for FormatError {}

/// A parsed pattern for one header depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFormat {
    pieces: Vec<Piece>,
    counters: usize,
    has_text: bool,
}

impl HeaderFormat {
    pub fn parse(pattern: &str, depth: usize) -> Result<Self, FormatError> {
        if pattern.trim().is_empty() {
            return Err(FormatError::Blank);
        }

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            if ch != '%' {
                literal.push(ch);
                continue;
            }
            let piece = match chars.next() {
                None => return Err(FormatError::TrailingPercent),
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('n') => Piece::Counter(Style::Decimal),
                Some('A') => Piece::Counter(Style::UpperAlpha),
                Some('a') => Piece::Counter(Style::LowerAlpha),
                Some('R') => Piece::Counter(Style::UpperRoman),
                Some('r') => Piece::Counter(Style::LowerRoman),
                Some('c') => Piece::Current,
                Some('s') => Piece::Text,
                Some(other) => return Err(FormatError::UnknownPlaceholder(other)),
            };
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(piece);
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        let counters = pieces
            .iter()
            .filter(|p| matches!(p, Piece::Counter(_)))
            .count();
        if counters > depth {
            return Err(FormatError::TooManyCounters {
                found: counters,
                depth,
            });
        }
        let has_text = pieces.contains(&Piece::Text);

        Ok(Self {
            pieces,
            counters,
            has_text,
        })
    }

    pub fn fallback() -> Self {
        Self {
            pieces: vec![
                Piece::Counter(Style::Decimal),
                Piece::Literal(".".to_string()),
            ],
            counters: 1,
            has_text: false,
        }
    }

    fn substitute(&self, counters: &[u32], depth: usize, text: Option<&str>) -> String {
        let first = depth + 1 - self.counters;
        let counter_at = |level: usize| counters.get(level - 1).copied().unwrap_or(0);

        let mut out = String::new();
        let mut position = 0;
        for piece in &self.pieces {
            match piece {
                Piece::Literal(literal) => out.push_str(literal),
                Piece::Counter(style) => {
                    out.push_str(&render_counter(counter_at(first + position), *style));
                    position += 1;
                }
                Piece::Current => out.push_str(&counter_at(depth).to_string()),
                Piece::Text => {
                    if let Some(text) = text {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }

    /// The rendered number: the pattern without `%s`, trimmed.
    ///
    /// `counters[i]` holds the counter of depth `i + 1`.
    pub fn number(&self, counters: &[u32], depth: usize) -> String {
        self.substitute(counters, depth, None).trim().to_string()
    }

    /// The full header line for `text`.
    pub fn line(&self, counters: &[u32], depth: usize, text: &str) -> String {
        if self.has_text {
            return self.substitute(counters, depth, Some(text)).trim().to_string();
        }
        let number = self.number(counters, depth);
        match (number.is_empty(), text.is_empty()) {
            (_, true) => number,
            (true, false) => text.to_string(),
            (false, false) => format!("{} {}", number, text),
        }
    }
}

fn render_counter(n: u32, style: Style) -> String {
    match style {
        Style::Decimal => n.to_string(),
        Style::UpperAlpha => to_alpha(n),
        Style::LowerAlpha => to_alpha(n).to_lowercase(),
        Style::UpperRoman => to_roman(n),
        Style::LowerRoman => to_roman(n).to_lowercase(),
    }
}

/// Spreadsheet-style letters: 1 → `A`, 26 → `Z`, 27 → `AA`. Zero renders as empty.
pub fn to_alpha(mut n: u32) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Upper-case Roman numeral with subtractive notation. Zero renders as empty.
pub fn to_roman(mut n: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, "A")]
    #[case(26, "Z")]
    #[case(27, "AA")]
    #[case(52, "AZ")]
    #[case(703, "AAA")]
    #[case(0, "")]
    fn alphabetic_counters(#[case] n: u32, #[case] expected: &str) {
        assert_eq!(to_alpha(n), expected);
    }

    #[rstest]
    #[case(1, "I")]
    #[case(4, "IV")]
    #[case(9, "IX")]
    #[case(14, "XIV")]
    #[case(1994, "MCMXCIV")]
    #[case(0, "")]
    fn roman_counters(#[case] n: u32, #[case] expected: &str) {
        assert_eq!(to_roman(n), expected);
    }

    #[test]
    fn counters_bind_right_aligned() {
        let counters = [2, 3, 4];
        let format = HeaderFormat::parse("%n.%n", 2).unwrap();
        assert_eq!(format.number(&counters, 2), "2.3");
        let format = HeaderFormat::parse("%n.%n.%n", 3).unwrap();
        assert_eq!(format.number(&counters, 3), "2.3.4");
        let format = HeaderFormat::parse("(%a)", 3).unwrap();
        assert_eq!(format.number(&counters, 3), "(d)");
        let format = HeaderFormat::parse("%R-%c", 2).unwrap();
        assert_eq!(format.number(&counters, 2), "III-3");
    }

    #[test]
    fn text_placeholder_controls_the_line() {
        let counters = [1];
        let format = HeaderFormat::parse("Article %n. %s", 1).unwrap();
        assert_eq!(format.number(&counters, 1), "Article 1.");
        assert_eq!(format.line(&counters, 1, "Intro"), "Article 1. Intro");

        let format = HeaderFormat::parse("%n.", 1).unwrap();
        assert_eq!(format.line(&counters, 1, "Intro"), "1. Intro");
        assert_eq!(format.line(&counters, 1, ""), "1.");
    }

    #[test]
    fn literal_percent() {
        let format = HeaderFormat::parse("%n%%", 1).unwrap();
        assert_eq!(format.number(&[5], 1), "5%");
    }

    #[rstest]
    #[case("   ", FormatError::Blank)]
    #[case("%x", FormatError::UnknownPlaceholder('x'))]
    #[case("%n%", FormatError::TrailingPercent)]
    #[case("%n.%n", FormatError::TooManyCounters { found: 2, depth: 1 })]
    fn malformed_patterns(#[case] pattern: &str, #[case] expected: FormatError) {
        assert_eq!(HeaderFormat::parse(pattern, 1), Err(expected));
    }

    #[test]
    fn fallback_is_decimal() {
        assert_eq!(HeaderFormat::fallback(), HeaderFormat::parse("%n.", 1).unwrap());
        assert_eq!(HeaderFormat::fallback().number(&[0, 7], 2), "7.");
    }
}
