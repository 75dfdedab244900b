//! Price text parsing for scraped retailer pages.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

/// Parse the first price in a piece of display text.
///
/// Accepts the shapes Portuguese and international storefronts render:
/// `"3,10 €"`, `"€3.10"`, `"1.299,00"`, `"1,299.00"`, `"1 299,00"`.
/// A single separator is treated as the decimal mark; with both present the
/// last one is.
pub fn parse_price(text: &str) -> Option<Decimal> {
    static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\d+(?:[.,]\d+|[ \u{a0}\u{202f}]\d{3})*").expect("valid regex")
    });

    let raw = NUMBER_RE.find(text)?.as_str();
    let compact: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let normalized = match (compact.rfind('.'), compact.rfind(',')) {
        (Some(dot), Some(comma)) => {
            if comma > dot {
                compact.replace('.', "").replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
        (None, Some(_)) => single_separator(&compact, ','),
        (Some(_), None) => single_separator(&compact, '.'),
        (None, None) => compact,
    };

    Decimal::from_str(&normalized).ok()
}

/// One kind of separator: a lone occurrence is the decimal mark, repeated
/// occurrences are thousands grouping.
fn single_separator(s: &str, sep: char) -> String {
    if s.matches(sep).count() == 1 {
        s.replace(sep, ".")
    } else {
        s.replace(sep, "")
    }
}
