//! Scope-of-work line items and price-range arithmetic. All money is integer cents.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Spread applied above the subtotal when a price range is derived, in percent.
pub const PRICE_RANGE_SPREAD_PCT: i64 = 15;
pub const MAX_SCOPE_ITEMS: usize = 200;
/// Upper bound on any single price, line total or subtotal ($1B).
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

/// One line of a scope of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeItem {
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price_cents: i64,
}

impl ScopeItem {
    /// Saturates at `i64::MAX`; validation rejects anything above `MAX_PRICE_CENTS`.
    pub fn total_cents(&self) -> i64 {
        (self.quantity * self.unit_price_cents as f64).round() as i64
    }
}

pub fn subtotal_cents(items: &[ScopeItem]) -> i64 {
    items
        .iter()
        .fold(0i64, |acc, item| acc.saturating_add(item.total_cents()))
}

/// `low = subtotal`, `high = subtotal + 15%` (rounded half up).
pub fn derive_price_range(subtotal: i64) -> (i64, i64) {
    let spread = (i128::from(subtotal) * i128::from(PRICE_RANGE_SPREAD_PCT) + 50) / 100;
    let high = (i128::from(subtotal) + spread).min(i128::from(i64::MAX));
    (subtotal, high as i64)
}

pub fn validate_scope_items(items: &[ScopeItem]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::Validation(
            "scope_items must contain at least one item".to_string(),
        ));
    }
    if items.len() > MAX_SCOPE_ITEMS {
        return Err(AppError::Validation(format!(
            "scope_items may contain at most {MAX_SCOPE_ITEMS} items"
        )));
    }
    for (i, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "scope_items[{i}].description cannot be empty"
            )));
        }
        if !item.quantity.is_finite() || item.quantity <= 0.0 {
            return Err(AppError::Validation(format!(
                "scope_items[{i}].quantity must be greater than zero"
            )));
        }
        if item.unit_price_cents < 0 {
            return Err(AppError::Validation(format!(
                "scope_items[{i}].unit_price_cents cannot be negative"
            )));
        }
        if item.unit_price_cents > MAX_PRICE_CENTS || item.total_cents() > MAX_PRICE_CENTS {
            return Err(AppError::Validation(format!(
                "scope_items[{i}] exceeds the maximum of {MAX_PRICE_CENTS} cents"
            )));
        }
    }
    if subtotal_cents(items) > MAX_PRICE_CENTS {
        return Err(AppError::Validation(format!(
            "scope subtotal exceeds the maximum of {MAX_PRICE_CENTS} cents"
        )));
    }
    Ok(())
}

/// Uses the explicit range when both bounds are supplied, derives it from the
/// scope when neither is.
pub fn resolve_price_range(
    items: &[ScopeItem],
    low: Option<i64>,
    high: Option<i64>,
) -> Result<(i64, i64), AppError> {
    match (low, high) {
        (Some(low), Some(high)) => {
            validate_price_range(low, high)?;
            Ok((low, high))
        }
        (None, None) => Ok(derive_price_range(subtotal_cents(items))),
        _ => Err(AppError::Validation(
            "price_low_cents and price_high_cents must be given together".to_string(),
        )),
    }
}

pub fn validate_price_range(low: i64, high: i64) -> Result<(), AppError> {
    if low < 0 || high < 0 {
        return Err(AppError::Validation("prices cannot be negative".to_string()));
    }
    if low > high {
        return Err(AppError::Validation(format!(
            "price_low_cents ({low}) exceeds price_high_cents ({high})"
        )));
    }
    if high > MAX_PRICE_CENTS {
        return Err(AppError::Validation(format!(
            "price_high_cents exceeds the maximum of {MAX_PRICE_CENTS} cents"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(qty: f64, unit_price: i64) -> ScopeItem {
        ScopeItem {
            description: "Tear off existing shingles".to_string(),
            quantity: qty,
            unit: "sq".to_string(),
            unit_price_cents: unit_price,
        }
    }

    #[test]
    fn test_line_total_rounds_fractional_quantities() {
        assert_eq!(item(2.5, 333).total_cents(), 833);
        assert_eq!(item(1.0, 12_000).total_cents(), 12_000);
    }

    #[test]
    fn test_subtotal_sums_lines() {
        assert_eq!(subtotal_cents(&[item(2.0, 100), item(3.0, 50)]), 350);
        assert_eq!(subtotal_cents(&[]), 0);
    }

    #[test]
    fn test_derived_range_adds_spread() {
        assert_eq!(derive_price_range(10_000), (10_000, 11_500));
        // 15% of 333 = 49.95 -> 50
        assert_eq!(derive_price_range(333), (333, 383));
        assert_eq!(derive_price_range(0), (0, 0));
    }

    #[test]
    fn test_validate_rejects_bad_items() {
        assert!(validate_scope_items(&[]).is_err());
        assert!(validate_scope_items(&[item(0.0, 100)]).is_err());
        assert!(validate_scope_items(&[item(f64::NAN, 100)]).is_err());
        assert!(validate_scope_items(&[item(1.0, -1)]).is_err());
        let mut blank = item(1.0, 100);
        blank.description = "   ".to_string();
        assert!(validate_scope_items(&[blank]).is_err());
    }

    #[test]
    fn test_validate_accepts_free_line() {
        assert!(validate_scope_items(&[item(1.0, 0)]).is_ok());
    }

    #[test]
    fn test_resolve_price_range() {
        let items = [item(1.0, 10_000)];
        assert_eq!(resolve_price_range(&items, None, None).unwrap(), (10_000, 11_500));
        assert_eq!(
            resolve_price_range(&items, Some(9_000), Some(12_000)).unwrap(),
            (9_000, 12_000)
        );
        assert!(resolve_price_range(&items, Some(9_000), None).is_err());
        assert!(resolve_price_range(&items, Some(12_000), Some(9_000)).is_err());
        assert!(resolve_price_range(&items, Some(-1), Some(9_000)).is_err());
        assert!(resolve_price_range(&items, Some(0), Some(MAX_PRICE_CENTS + 1)).is_err());
    }

    #[test]
    fn test_huge_prices_are_rejected_not_overflowed() {
        let huge = item(1.0, 1_000_000_000_000_000_000);
        assert!(matches!(
            validate_scope_items(&[huge.clone()]),
            Err(AppError::Validation(_))
        ));
        // Each line is under the cap but the sum is not.
        let near_cap = item(1.0, MAX_PRICE_CENTS);
        assert!(validate_scope_items(&[near_cap.clone()]).is_ok());
        assert!(matches!(
            validate_scope_items(&[near_cap.clone(), near_cap]),
            Err(AppError::Validation(_))
        ));
        // Large quantity times an allowed unit price.
        assert!(validate_scope_items(&[item(1e12, 1_000)]).is_err());
    }

    #[test]
    fn test_arithmetic_saturates() {
        let max = item(1.0, i64::MAX);
        let huge = item(1.0, 1_000_000_000_000_000_000);
        assert_eq!(subtotal_cents(&[huge, max]), i64::MAX);
        assert_eq!(derive_price_range(i64::MAX), (i64::MAX, i64::MAX));
        let (low, high) = derive_price_range(MAX_PRICE_CENTS);
        assert_eq!(low, MAX_PRICE_CENTS);
        assert_eq!(high, 115_000_000_000);
    }
}
