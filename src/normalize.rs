//! Raw DOM strings to typed listing fields.
//!
//! Every function here is total from the caller's point of view: failures
//! come back as [`NormalizationError`] or degrade to [`Rated::Unrated`].

use crate::error::NormalizationError;
use crate::model::Rated;

/// Decimal separator a source uses when rendering ratings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalMark {
    Dot,
    Comma,
}

impl DecimalMark {
    fn as_char(self) -> char {
        match self {
            DecimalMark::Dot => '.',
            DecimalMark::Comma => ',',
        }
    }
}

/// Strips everything that is not a digit (currency symbols, thousand
/// separators, decimal marks) and parses what is left.
pub fn price(raw: Option<&str>) -> Result<u64, NormalizationError> {
    let raw = raw.ok_or(NormalizationError::Missing)?;
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(NormalizationError::NoDigits(raw.to_string()));
    }
    digits
        .parse()
        .map_err(|_| NormalizationError::Unparseable(raw.to_string()))
}

/// First decimal number in the string, read with the source's decimal mark.
pub fn rating(raw: Option<&str>, mark: DecimalMark) -> Rated<f64> {
    match leading_decimal(raw, mark) {
        Ok(value) => Rated::Value(value),
        Err(err) => {
            if err != NormalizationError::Missing {
                tracing::debug!(error = %err, "rating unparseable, marking unrated");
            }
            Rated::Unrated
        }
    }
}

/// First number in the string with grouping punctuation removed, so
/// `(1.234)` and `1,234 ratings` both read as 1234.
pub fn rating_count(raw: Option<&str>) -> Rated<u64> {
    match grouped_integer(raw) {
        Ok(value) => Rated::Value(value),
        Err(err) => {
            if err != NormalizationError::Missing {
                tracing::debug!(error = %err, "rating count unparseable, marking unrated");
            }
            Rated::Unrated
        }
    }
}

fn leading_decimal(raw: Option<&str>, mark: DecimalMark) -> Result<f64, NormalizationError> {
    let raw = raw.ok_or(NormalizationError::Missing)?;
    let start = raw
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| NormalizationError::NoDigits(raw.to_string()))?;

    let mut number = String::new();
    let mut chars = raw[start..].chars().peekable();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        number.push(c);
        chars.next();
    }

    if chars.next() == Some(mark.as_char()) {
        let fraction: String = chars.take_while(char::is_ascii_digit).collect();
        if !fraction.is_empty() {
            number.push('.');
            number.push_str(&fraction);
        }
    }

    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| NormalizationError::Unparseable(raw.to_string()))
}

fn grouped_integer(raw: Option<&str>) -> Result<u64, NormalizationError> {
    let raw = raw.ok_or(NormalizationError::Missing)?;
    let start = raw
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| NormalizationError::NoDigits(raw.to_string()))?;

    let digits: String = raw[start..]
        .chars()
        .take_while(|&c| c.is_ascii_digit() || is_grouping(c))
        .filter(char::is_ascii_digit)
        .collect();

    digits
        .parse()
        .map_err(|_| NormalizationError::Unparseable(raw.to_string()))
}

fn is_grouping(c: char) -> bool {
    matches!(c, '.' | ',' | '\'' | ' ' | '\u{a0}' | '\u{202f}')
}
