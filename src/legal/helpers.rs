//! Helper registry
//!
//! Template expressions may call a closed set of named helpers: date arithmetic and
//! formatting, currency and number formatting, string case transforms and basic arithmetic.
//! Helpers are plain functions over metadata values and are looked up by name at evaluation
//! time. An unknown name is not an error here; the evaluator reports it.

use crate::legal::value::{format_number, Value};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Failure inside a helper (bad arity or argument types).
#[derive(Debug, Clone, PartialEq)]
pub struct HelperError(pub String);

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HelperError {}

pub type HelperResult = Result<Value, HelperError>;
pub type HelperFn = fn(&[Value]) -> HelperResult;

static HELPERS: Lazy<HashMap<&'static str, HelperFn>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, HelperFn> = HashMap::new();
    // dates
    map.insert("today", today);
    map.insert("formatDate", format_date);
    map.insert("addDays", add_days);
    map.insert("addMonths", add_months);
    map.insert("addYears", add_years);
    // numbers
    map.insert("formatCurrency", format_currency);
    map.insert("formatDollar", format_dollar);
    map.insert("formatNumber", format_number_helper);
    map.insert("formatPercent", format_percent);
    map.insert("round", round);
    map.insert("add", add);
    map.insert("subtract", subtract);
    map.insert("multiply", multiply);
    map.insert("divide", divide);
    map.insert("numberToWords", number_to_words_helper);
    // strings
    map.insert("upper", upper);
    map.insert("lower", lower);
    map.insert("capitalize", capitalize);
    map.insert("capitalizeWords", capitalize_words);
    map.insert("titleCase", title_case);
    map.insert("trim", trim);
    map.insert("truncate", truncate);
    map.insert("concat", concat);
    map.insert("default", default_value);
    map.insert("pluralize", pluralize);
    map.insert("replaceAll", replace_all);
    map
});

/// Look up a helper by name.
pub fn lookup(name: &str) -> Option<HelperFn> {
    HELPERS.get(name).copied()
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), HelperError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(HelperError(format!(
            "{} expects {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn number_arg(name: &str, value: &Value) -> Result<f64, HelperError> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .ok_or_else(|| HelperError(format!("{} expects a number, got '{}'", name, value.render())))
}

fn optional_number(name: &str, args: &[Value], index: usize, default: f64) -> Result<f64, HelperError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => number_arg(name, value),
    }
}

/// Most fraction digits a formatting helper will render.
const MAX_DECIMALS: usize = 12;

fn decimals_arg(
    name: &str,
    args: &[Value],
    index: usize,
    default: f64,
) -> Result<usize, HelperError> {
    let decimals = optional_number(name, args, index, default)?;
    if !(0.0..=MAX_DECIMALS as f64).contains(&decimals) {
        return Err(HelperError(format!(
            "{}: decimals must be between 0 and {}, got {}",
            name,
            MAX_DECIMALS,
            format_number(decimals)
        )));
    }
    Ok(decimals as usize)
}

fn text_arg(value: &Value) -> String {
    value.render()
}

// ---------------------------------------------------------------------------------------------
// dates

fn parse_date(name: &str, value: &Value) -> Result<NaiveDate, HelperError> {
    let raw = value.render();
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Ok(datetime.date_naive());
    }
    for format in ["%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    Err(HelperError(format!("{} expects a date, got '{}'", name, raw)))
}

fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

fn today(args: &[Value]) -> HelperResult {
    arity("today", args, 0, 0)?;
    Ok(date_value(Local::now().date_naive()))
}

fn add_days(args: &[Value]) -> HelperResult {
    arity("addDays", args, 2, 2)?;
    let date = parse_date("addDays", &args[0])?;
    let days = number_arg("addDays", &args[1])? as i64;
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted
        .map(date_value)
        .ok_or_else(|| HelperError("addDays: date out of range".to_string()))
}

fn shift_months(name: &str, date: NaiveDate, months: i64) -> HelperResult {
    let amount = u32::try_from(months.unsigned_abs())
        .map_err(|_| HelperError(format!("{}: offset too large", name)))?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(amount))
    } else {
        date.checked_sub_months(Months::new(amount))
    };
    shifted
        .map(date_value)
        .ok_or_else(|| HelperError(format!("{}: date out of range", name)))
}

fn add_months(args: &[Value]) -> HelperResult {
    arity("addMonths", args, 2, 2)?;
    let date = parse_date("addMonths", &args[0])?;
    let months = number_arg("addMonths", &args[1])? as i64;
    shift_months("addMonths", date, months)
}

fn add_years(args: &[Value]) -> HelperResult {
    arity("addYears", args, 2, 2)?;
    let date = parse_date("addYears", &args[0])?;
    let years = number_arg("addYears", &args[1])? as i64;
    shift_months("addYears", date, years.saturating_mul(12))
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Translate `YYYY-MM-DD` style tokens into strftime directives.
fn translate_date_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == ch {
            run += 1;
        }
        let directive = match (ch, run) {
            ('Y', 4) => Some("%Y"),
            ('Y', 2) => Some("%y"),
            ('M', 4) => Some("%B"),
            ('M', 3) => Some("%b"),
            ('M', 2) => Some("%m"),
            ('M', 1) => Some("%-m"),
            ('D', 2) => Some("%d"),
            ('D', 1) => Some("%-d"),
            ('d', 4) => Some("%A"),
            ('d', 3) => Some("%a"),
            _ => None,
        };
        match directive {
            Some(d) => out.push_str(d),
            None => {
                for _ in 0..run {
                    if ch == '%' {
                        out.push_str("%%");
                    } else {
                        out.push(ch);
                    }
                }
            }
        }
        i += run;
    }
    out
}

fn format_date(args: &[Value]) -> HelperResult {
    arity("formatDate", args, 1, 2)?;
    let date = parse_date("formatDate", &args[0])?;
    let pattern = args
        .get(1)
        .map(text_arg)
        .unwrap_or_else(|| "%Y-%m-%d".to_string());

    let rendered = match pattern.as_str() {
        "legal" => format!("the {} day of {}", ordinal(date.day()), date.format("%B, %Y")),
        "long" => date.format("%B %-d, %Y").to_string(),
        other => {
            let strftime = if other.contains('%') {
                other.to_string()
            } else {
                translate_date_pattern(other)
            };
            if StrftimeItems::new(&strftime).any(|item| matches!(item, Item::Error)) {
                return Err(HelperError(format!(
                    "formatDate: invalid pattern '{}'",
                    other
                )));
            }
            date.format(&strftime).to_string()
        }
    };
    Ok(Value::String(rendered))
}

// ---------------------------------------------------------------------------------------------
// numbers

fn group_thousands(integer: &str) -> String {
    let digits: Vec<char> = integer.chars().collect();
    let mut out = String::new();
    for (i, ch) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*ch);
    }
    out
}

/// Format with a fixed number of decimals and thousands separators.
fn grouped(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (integer, fraction) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };
    let mut out = group_thousands(&integer);
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(&fraction);
    }
    out
}

fn format_currency(args: &[Value]) -> HelperResult {
    arity("formatCurrency", args, 1, 3)?;
    let amount = number_arg("formatCurrency", &args[0])?;
    let code = args
        .get(1)
        .map(|v| v.render().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "USD".to_string());
    let default_decimals = if code == "JPY" { 0.0 } else { 2.0 };
    let decimals = decimals_arg("formatCurrency", args, 2, default_decimals)?;

    let symbol = match code.as_str() {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => format!("{} ", other),
    };
    let sign = if amount < 0.0 { "-" } else { "" };
    Ok(Value::String(format!(
        "{}{}{}",
        sign,
        symbol,
        grouped(amount, decimals)
    )))
}

fn format_dollar(args: &[Value]) -> HelperResult {
    arity("formatDollar", args, 1, 1)?;
    format_currency(&[args[0].clone(), Value::from("USD")])
}

fn format_number_helper(args: &[Value]) -> HelperResult {
    arity("formatNumber", args, 1, 2)?;
    let n = number_arg("formatNumber", &args[0])?;
    let decimals = decimals_arg("formatNumber", args, 1, 0.0)?;
    let sign = if n < 0.0 { "-" } else { "" };
    Ok(Value::String(format!("{}{}", sign, grouped(n, decimals))))
}

fn format_percent(args: &[Value]) -> HelperResult {
    arity("formatPercent", args, 1, 2)?;
    let n = number_arg("formatPercent", &args[0])?;
    let decimals = decimals_arg("formatPercent", args, 1, 0.0)?;
    Ok(Value::String(format!("{:.*}%", decimals, n * 100.0)))
}

fn round(args: &[Value]) -> HelperResult {
    arity("round", args, 1, 2)?;
    let n = number_arg("round", &args[0])?;
    let decimals = optional_number("round", args, 1, 0.0)?.clamp(0.0, MAX_DECIMALS as f64) as i32;
    let factor = 10f64.powi(decimals);
    Ok(Value::Number((n * factor).round() / factor))
}

fn arithmetic(name: &str, args: &[Value], op: fn(f64, f64) -> Option<f64>) -> HelperResult {
    arity(name, args, 2, 2)?;
    let a = number_arg(name, &args[0])?;
    let b = number_arg(name, &args[1])?;
    op(a, b)
        .map(Value::Number)
        .ok_or_else(|| HelperError(format!("{}: division by zero", name)))
}

fn add(args: &[Value]) -> HelperResult {
    arithmetic("add", args, |a, b| Some(a + b))
}

fn subtract(args: &[Value]) -> HelperResult {
    arithmetic("subtract", args, |a, b| Some(a - b))
}

fn multiply(args: &[Value]) -> HelperResult {
    arithmetic("multiply", args, |a, b| Some(a * b))
}

fn divide(args: &[Value]) -> HelperResult {
    arithmetic("divide", args, |a, b| if b == 0.0 { None } else { Some(a / b) })
}

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

fn words_below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(ONES[rest as usize].to_string());
        } else {
            let tens = TENS[(rest / 10) as usize];
            match rest % 10 {
                0 => parts.push(tens.to_string()),
                ones => parts.push(format!("{}-{}", tens, ONES[ones as usize])),
            }
        }
    }
    parts.join(" ")
}

/// Spell out a whole number in English words.
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }
    const SCALES: [&str; 5] = ["", "thousand", "million", "billion", "trillion"];
    let mut chunks = Vec::new();
    let mut remaining = n;
    while remaining > 0 {
        chunks.push(remaining % 1000);
        remaining /= 1000;
    }
    let mut parts = Vec::new();
    for (scale, chunk) in chunks.iter().enumerate().rev() {
        if *chunk == 0 {
            continue;
        }
        let words = words_below_thousand(*chunk);
        match SCALES.get(scale) {
            Some(s) if !s.is_empty() => parts.push(format!("{} {}", words, s)),
            _ => parts.push(words),
        }
    }
    parts.join(" ")
}

fn number_to_words_helper(args: &[Value]) -> HelperResult {
    arity("numberToWords", args, 1, 1)?;
    let n = number_arg("numberToWords", &args[0])?;
    if n < 0.0 || n >= 1e15 {
        return Err(HelperError(format!(
            "numberToWords: {} is out of range",
            format_number(n)
        )));
    }
    Ok(Value::String(number_to_words(n.trunc() as u64)))
}

// ---------------------------------------------------------------------------------------------
// strings

fn upper(args: &[Value]) -> HelperResult {
    arity("upper", args, 1, 1)?;
    Ok(Value::String(text_arg(&args[0]).to_uppercase()))
}

fn lower(args: &[Value]) -> HelperResult {
    arity("lower", args, 1, 1)?;
    Ok(Value::String(text_arg(&args[0]).to_lowercase()))
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize(args: &[Value]) -> HelperResult {
    arity("capitalize", args, 1, 1)?;
    Ok(Value::String(capitalize_first(&text_arg(&args[0]))))
}

fn capitalize_words(args: &[Value]) -> HelperResult {
    arity("capitalizeWords", args, 1, 1)?;
    let text = text_arg(&args[0]);
    let words: Vec<String> = text.split(' ').map(capitalize_first).collect();
    Ok(Value::String(words.join(" ")))
}

fn title_case(args: &[Value]) -> HelperResult {
    arity("titleCase", args, 1, 1)?;
    const MINOR: [&str; 12] = [
        "a", "an", "and", "as", "at", "but", "by", "for", "in", "of", "on", "the",
    ];
    let text = text_arg(&args[0]).to_lowercase();
    let words: Vec<String> = text
        .split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && MINOR.contains(&word) {
                word.to_string()
            } else {
                capitalize_first(word)
            }
        })
        .collect();
    Ok(Value::String(words.join(" ")))
}

fn trim(args: &[Value]) -> HelperResult {
    arity("trim", args, 1, 1)?;
    Ok(Value::String(text_arg(&args[0]).trim().to_string()))
}

fn truncate(args: &[Value]) -> HelperResult {
    arity("truncate", args, 2, 3)?;
    let text = text_arg(&args[0]);
    let limit = number_arg("truncate", &args[1])?.max(0.0) as usize;
    let suffix = args.get(2).map(text_arg).unwrap_or_else(|| "...".to_string());
    if text.chars().count() <= limit {
        return Ok(Value::String(text));
    }
    let cut: String = text.chars().take(limit).collect();
    Ok(Value::String(format!("{}{}", cut.trim_end(), suffix)))
}

fn concat(args: &[Value]) -> HelperResult {
    Ok(Value::String(args.iter().map(text_arg).collect()))
}

fn default_value(args: &[Value]) -> HelperResult {
    arity("default", args, 2, 2)?;
    if args[0].is_empty() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

fn pluralize(args: &[Value]) -> HelperResult {
    arity("pluralize", args, 2, 3)?;
    let word = text_arg(&args[0]);
    let count = number_arg("pluralize", &args[1])?;
    if count == 1.0 {
        return Ok(Value::String(word));
    }
    if let Some(plural) = args.get(2) {
        return Ok(Value::String(text_arg(plural)));
    }
    let plural = if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{}es", word)
    } else if word.ends_with('y')
        && !word.ends_with("ay")
        && !word.ends_with("ey")
        && !word.ends_with("oy")
    {
        format!("{}ies", &word[..word.len() - 1])
    } else {
        format!("{}s", word)
    };
    Ok(Value::String(plural))
}

fn replace_all(args: &[Value]) -> HelperResult {
    arity("replaceAll", args, 3, 3)?;
    let from = text_arg(&args[1]);
    if from.is_empty() {
        return Err(HelperError(
            "replaceAll: search string must not be empty".to_string(),
        ));
    }
    Ok(Value::String(
        text_arg(&args[0]).replace(&from, &text_arg(&args[2])),
    ))
}
