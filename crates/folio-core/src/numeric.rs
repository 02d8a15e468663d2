//! Defensive parsing of rendered dashboard values.
//!
//! Dashboards print values like `$1,234.56`, `<$0.01`, `-$12`, `($3.10)`,
//! `19,033.70 reUSDe` or `+4.2%`. None of these helpers fail: anything that
//! cannot be read as a number, and any inequality-prefixed approximation,
//! becomes zero so one odd cell never sinks a whole extraction.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a USD amount such as `$1,234.56`.
pub fn parse_usd(text: &str) -> Decimal {
    let trimmed = text.trim();
    if trimmed.starts_with('<') || trimmed.starts_with('>') || trimmed.starts_with('≈') {
        return Decimal::ZERO;
    }

    let (negative, body) = strip_sign(trimmed);
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{a0}'))
        .collect();

    let value = parse_decimal(&cleaned);
    if negative && !value.is_zero() {
        -value
    } else {
        value
    }
}

/// Parse the leading number of an amount cell, e.g. `19,033.70 reUSDe`.
pub fn parse_amount(text: &str) -> Decimal {
    let first_line = text.trim().lines().next().unwrap_or_default();
    let token = first_line.split_whitespace().next().unwrap_or_default();
    if token.starts_with('<') || token.starts_with('>') {
        return Decimal::ZERO;
    }
    let (negative, body) = strip_sign(token);
    let value = parse_decimal(&body.replace(',', ""));
    if negative && !value.is_zero() {
        -value
    } else {
        value
    }
}

/// Parse a percentage such as `+4.2%`; the result is in percent units.
pub fn parse_percent(text: &str) -> Decimal {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '+' | ',' | ' '))
        .collect();
    parse_decimal(&cleaned.replace('\u{2212}', "-"))
}

/// Helper to parse string to Decimal, defaulting to zero on error
pub fn parse_decimal(s: &str) -> Decimal {
    if s.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .unwrap_or_default()
}

/// Split a leading `-`, unicode minus or accounting parentheses off a value.
fn strip_sign(text: &str) -> (bool, &str) {
    if let Some(rest) = text.strip_prefix('-').or_else(|| text.strip_prefix('\u{2212}')) {
        return (true, rest.trim_start());
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return (true, inner.trim());
    }
    (false, text)
}
