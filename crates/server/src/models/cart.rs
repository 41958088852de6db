//! Cart and wishlist views.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use greens_core::{CurrencyCode, ProductId};

/// One cart line joined with current product data.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub title: String,
    pub unit_price: Decimal,
    pub currency: CurrencyCode,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub in_stock: bool,
    pub added_at: DateTime<Utc>,
}

/// Sum of lines sharing a currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartTotal {
    pub currency: CurrencyCode,
    pub amount: Decimal,
}

/// The caller's cart at current prices (not a snapshot).
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub item_count: i64,
    /// One entry per currency present, in first-seen order.
    pub totals: Vec<CartTotal>,
}

impl Cart {
    #[must_use]
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let mut totals: Vec<CartTotal> = Vec::new();
        for line in &items {
            match totals.iter_mut().find(|t| t.currency == line.currency) {
                Some(total) => total.amount += line.subtotal,
                None => totals.push(CartTotal {
                    currency: line.currency,
                    amount: line.subtotal,
                }),
            }
        }
        let item_count = items.iter().map(|l| i64::from(l.quantity)).sum();
        Self {
            items,
            item_count,
            totals,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntry {
    pub product_id: ProductId,
    pub title: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub is_available: bool,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i32, currency: CurrencyCode, price: i64, quantity: i32) -> CartLine {
        let unit_price = Decimal::from(price);
        CartLine {
            product_id: ProductId::new(id),
            title: format!("item {id}"),
            unit_price,
            currency,
            quantity,
            subtotal: unit_price * Decimal::from(quantity),
            in_stock: true,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals_group_by_currency() {
        let cart = Cart::from_lines(vec![
            line(1, CurrencyCode::USD, 10, 2),
            line(2, CurrencyCode::EUR, 5, 1),
            line(3, CurrencyCode::USD, 1, 3),
        ]);

        assert_eq!(cart.item_count, 6);
        assert_eq!(
            cart.totals,
            vec![
                CartTotal {
                    currency: CurrencyCode::USD,
                    amount: Decimal::from(23)
                },
                CartTotal {
                    currency: CurrencyCode::EUR,
                    amount: Decimal::from(5)
                },
            ]
        );
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::from_lines(Vec::new());
        assert_eq!(cart.item_count, 0);
        assert!(cart.totals.is_empty());
    }
}
