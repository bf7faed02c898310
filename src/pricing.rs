//! Order price computation.
//!
//! All money is integer minor units (cents), which keeps the sums exact and
//! makes the payment amount comparison a plain integer equality.

use std::env;

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Fraction of the items subtotal charged as tax.
    pub tax_rate: f64,
    /// Items subtotal (cents) above which shipping is free.
    pub free_shipping_threshold: i64,
    /// Flat shipping fee (cents) below the threshold.
    pub shipping_fee: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.15,
            free_shipping_threshold: 50_000,
            shipping_fee: 1_000,
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tax_rate: env::var("TAX_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tax_rate),
            free_shipping_threshold: env::var("FREE_SHIPPING_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.free_shipping_threshold),
            shipping_fee: env::var("SHIPPING_FEE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shipping_fee),
        }
    }
}

/// A resolved line item: quantity plus the catalog unit price snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PricedItem {
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct OrderTotals {
    pub items_price: i64,
    pub tax_price: i64,
    pub shipping_price: i64,
    pub total_price: i64,
}

pub fn compute_totals(items: &[PricedItem], config: &PricingConfig) -> AppResult<OrderTotals> {
    if items.is_empty() {
        return Err(AppError::Validation("Order has no items".into()));
    }

    let mut items_price: i64 = 0;
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::Validation("Quantity must be at least 1".into()));
        }
        if item.unit_price < 0 {
            return Err(AppError::Validation("Price cannot be negative".into()));
        }
        items_price += item.unit_price * i64::from(item.quantity);
    }

    let shipping_price = if items_price > config.free_shipping_threshold {
        0
    } else {
        config.shipping_fee
    };

    let tax_price = (items_price as f64 * config.tax_rate).round() as i64;
    let total_price = items_price + tax_price + shipping_price;

    Ok(OrderTotals {
        items_price,
        tax_price,
        shipping_price,
        total_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, unit_price: i64) -> PricedItem {
        PricedItem {
            quantity,
            unit_price,
        }
    }

    #[test]
    fn totals_for_small_order_include_flat_shipping() {
        // 2 x $25.00 stays under the free-shipping threshold.
        let totals = compute_totals(&[item(2, 2_500)], &PricingConfig::default()).unwrap();
        assert_eq!(totals.items_price, 5_000);
        assert_eq!(totals.tax_price, 750);
        assert_eq!(totals.shipping_price, 1_000);
        assert_eq!(totals.total_price, 6_750);
    }

    #[test]
    fn shipping_is_free_above_threshold() {
        let totals = compute_totals(&[item(1, 50_001)], &PricingConfig::default()).unwrap();
        assert_eq!(totals.shipping_price, 0);
        assert_eq!(
            totals.total_price,
            totals.items_price + totals.tax_price + totals.shipping_price
        );
    }

    #[test]
    fn shipping_charged_at_exact_threshold() {
        let totals = compute_totals(&[item(1, 50_000)], &PricingConfig::default()).unwrap();
        assert_eq!(totals.shipping_price, 1_000);
    }

    #[test]
    fn items_price_sums_all_lines() {
        let totals = compute_totals(
            &[item(3, 1_099), item(1, 2_450)],
            &PricingConfig::default(),
        )
        .unwrap();
        assert_eq!(totals.items_price, 3 * 1_099 + 2_450);
    }

    #[test]
    fn tax_rounds_to_nearest_cent() {
        let config = PricingConfig {
            tax_rate: 0.07,
            ..PricingConfig::default()
        };
        // 333 * 0.07 = 23.31 -> 23 cents
        let totals = compute_totals(&[item(1, 333)], &config).unwrap();
        assert_eq!(totals.tax_price, 23);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = compute_totals(&[item(0, 1_000)], &PricingConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn empty_order_is_rejected() {
        let err = compute_totals(&[], &PricingConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
