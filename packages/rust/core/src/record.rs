//! Turning a product's quotes into its persisted record.

use std::collections::HashSet;

use pricebot_shared::{PriceEntry, PriceRecord, Product, Quote};
use rust_decimal::{Decimal, RoundingStrategy};

/// Build the record for `product` from the quotes gathered this run.
///
/// Prices are rounded to cents (half away from zero). If a supermarket appears
/// more than once only its first quote is kept.
pub fn build_record(product: &Product, quotes: &[Quote]) -> PriceRecord {
    let mut seen = HashSet::new();
    let prices = quotes
        .iter()
        .filter(|q| seen.insert(q.source_name.as_str()))
        .map(|q| PriceEntry {
            supermarket: q.source_name.clone(),
            price: round_price(q.price),
        })
        .collect();

    PriceRecord {
        id: product.id.clone(),
        name: title_case(&product.search_term),
        prices,
        last_updated: None,
    }
}

pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Upper-case the first character of every space-separated word.
///
/// The rest of each word is left as is and runs of spaces are preserved.
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
