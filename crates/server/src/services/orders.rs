//! Order placement, status transitions and payment recording.
//!
//! Every write runs in one transaction: product rows are locked in ascending
//! id order, so two concurrent orders over the same products cannot deadlock
//! or oversell.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument};

use greens_core::{
    CurrencyCode, EscrowStatus, OrderId, OrderStatus, Pagination, PaymentStatus, Price, ProductId,
    UserId,
};

use crate::db::notifications::NewNotification;
use crate::db::orders::{ItemSnapshot, OrderHeader};
use crate::db::{
    CartRepository, NotificationRepository, OrderRepository, ProductRepository, RepositoryError,
};
use crate::error::{DomainError, ErrorKind};
use crate::models::Page;
use crate::models::notification::kinds;
use crate::models::order::{NewOrder, Order, OrderLineRequest, OrderRole, PaymentRequest};
use crate::models::product::Product;

/// Upper bound on one line's quantity.
pub const MAX_ITEM_QUANTITY: i32 = 999;
const MAX_ORDER_LINES: usize = 100;
const MAX_NOTES_LENGTH: usize = 1000;
const MAX_METHOD_LENGTH: usize = 50;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order must contain at least one item")]
    EmptyOrder,

    #[error("{0}")]
    Validation(String),

    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("product {0} is your own listing")]
    OwnProduct(ProductId),

    #[error("insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    #[error("all items in an order must share one currency")]
    MixedCurrency,

    #[error("order not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("payment of {received} does not match order total {expected}")]
    PaymentFailed { expected: Decimal, received: Decimal },

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for OrderError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyOrder
            | Self::Validation(_)
            | Self::OwnProduct(_)
            | Self::MixedCurrency
            | Self::PaymentFailed { .. } => ErrorKind::Validation,
            Self::ProductUnavailable(_) | Self::NotFound => ErrorKind::NotFound,
            Self::InsufficientStock { .. } | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::EmptyOrder => "EMPTY_ORDER",
            Self::ProductUnavailable(_) => "PRODUCT_UNAVAILABLE",
            Self::OwnProduct(_) => "OWN_PRODUCT",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::MixedCurrency => "MIXED_CURRENCY",
            Self::NotFound => "ORDER_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::PaymentFailed { .. } => "PAYMENT_FAILED",
            other => other.kind().code(),
        }
    }
}

impl OrderError {
    fn transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Priced line items and totals computed from locked product rows.
#[derive(Debug)]
struct OrderPlan {
    items: Vec<ItemSnapshot>,
    total: Decimal,
    currency: CurrencyCode,
}

pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
        }
    }

    /// Place an order. Either every line is reserved and the order exists,
    /// or nothing changed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InsufficientStock`, `ProductUnavailable`,
    /// `OwnProduct`, `MixedCurrency` or a validation error.
    #[instrument(skip(self, request), fields(buyer = %buyer))]
    pub async fn create(&self, buyer: UserId, request: NewOrder) -> Result<Order, OrderError> {
        let lines = merge_lines(&request.items)?;
        if request
            .shipping_address
            .as_ref()
            .is_some_and(|a| !a.is_object())
        {
            return Err(OrderError::Validation(
                "shipping_address must be a JSON object".to_string(),
            ));
        }
        if request
            .notes
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_NOTES_LENGTH)
        {
            return Err(OrderError::Validation(format!(
                "notes must be at most {MAX_NOTES_LENGTH} characters"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let ids: Vec<ProductId> = lines.keys().copied().collect();
        let locked = ProductRepository::lock_for_update(&mut *tx, &ids).await?;
        let plan = plan_order(buyer, &lines, &locked)?;

        for item in &plan.items {
            ProductRepository::adjust_stock(&mut *tx, item.product_id, -item.quantity).await?;
        }

        let order = OrderRepository::insert(
            &mut *tx,
            &OrderHeader {
                buyer,
                total_amount: plan.total,
                currency: plan.currency,
                shipping_address: request.shipping_address.as_ref(),
                notes: request.notes.as_deref(),
            },
            &plan.items,
        )
        .await?;

        CartRepository::remove_products(&mut *tx, buyer, &ids).await?;

        for seller in order.seller_ids() {
            notify(
                &mut *tx,
                seller,
                kinds::ORDER_PLACED,
                "New order",
                format!("Order #{} includes your products", order.id),
                &order,
            )
            .await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(order_id = %order.id, total = %order.total_amount, "Order placed");
        Ok(order)
    }

    /// An order visible to its buyer and to sellers with items in it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if absent or not visible to `caller`.
    pub async fn get(&self, caller: UserId, id: OrderId) -> Result<Order, OrderError> {
        self.orders
            .get(id)
            .await?
            .filter(|o| visible_to(o, caller))
            .ok_or(OrderError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list(
        &self,
        caller: UserId,
        role: OrderRole,
        pagination: Pagination,
    ) -> Result<Page<Order>, OrderError> {
        let (items, total) = self.orders.list(caller, role, pagination).await?;
        Ok(Page::new(items, pagination, total))
    }

    /// Move an order along its lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` for moves the state machine
    /// forbids, `Forbidden` when the caller's role may not make the move.
    #[instrument(skip(self), fields(caller = %caller, order_id = %id))]
    pub async fn update_status(
        &self,
        caller: UserId,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let order = OrderRepository::get_for_update(&mut *tx, id)
            .await?
            .filter(|o| visible_to(o, caller))
            .ok_or(OrderError::NotFound)?;

        authorize_transition(&order, caller, next)?;

        OrderRepository::set_status(&mut *tx, id, next).await?;

        if next == OrderStatus::Cancelled {
            for item in &order.items {
                ProductRepository::adjust_stock(&mut *tx, item.product_id, item.quantity).await?;
            }
            if order.payment_status == PaymentStatus::Paid {
                OrderRepository::set_payment(
                    &mut *tx,
                    id,
                    PaymentStatus::Refunded,
                    EscrowStatus::Refunded,
                    None,
                )
                .await?;
            }
        }

        let recipients = if caller == order.buyer_id {
            order.seller_ids()
        } else {
            vec![order.buyer_id]
        };
        for recipient in recipients {
            notify(
                &mut *tx,
                recipient,
                kinds::ORDER_STATUS,
                "Order updated",
                format!("Order #{id} is now {next}"),
                &order,
            )
            .await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        info!(from = %order.status, to = %next, "Order status changed");

        self.orders.get(id).await?.ok_or(OrderError::NotFound)
    }

    /// Record the buyer's payment. A matching amount marks the order paid and
    /// holds the funds in escrow; a mismatch marks the payment failed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::PaymentFailed` on an amount mismatch (the failure
    /// is still recorded), `InvalidTransition` if payment is not pending.
    #[instrument(skip(self, payment), fields(caller = %caller, order_id = %id))]
    pub async fn process_payment(
        &self,
        caller: UserId,
        id: OrderId,
        payment: &PaymentRequest,
    ) -> Result<Order, OrderError> {
        let method = payment.method.trim();
        if method.is_empty() || method.chars().count() > MAX_METHOD_LENGTH {
            return Err(OrderError::Validation(format!(
                "method must be 1 to {MAX_METHOD_LENGTH} characters"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let order = OrderRepository::get_for_update(&mut *tx, id)
            .await?
            .filter(|o| visible_to(o, caller))
            .ok_or(OrderError::NotFound)?;

        if order.buyer_id != caller {
            return Err(OrderError::Forbidden("only the buyer can pay for an order"));
        }
        if order.status == OrderStatus::Cancelled {
            return Err(OrderError::transition(order.status, PaymentStatus::Paid));
        }
        if !order.payment_status.can_transition_to(PaymentStatus::Paid) {
            return Err(OrderError::transition(
                order.payment_status,
                PaymentStatus::Paid,
            ));
        }

        if payment.amount != order.total_amount {
            OrderRepository::set_payment(
                &mut *tx,
                id,
                PaymentStatus::Failed,
                order.escrow_status,
                Some(method),
            )
            .await?;
            tx.commit().await.map_err(RepositoryError::from)?;

            info!(amount = %payment.amount, "Payment amount mismatch");
            return Err(OrderError::PaymentFailed {
                expected: order.total_amount,
                received: payment.amount,
            });
        }

        OrderRepository::set_payment(
            &mut *tx,
            id,
            PaymentStatus::Paid,
            EscrowStatus::Held,
            Some(method),
        )
        .await?;
        if order.status == OrderStatus::Pending {
            OrderRepository::set_status(&mut *tx, id, OrderStatus::Paid).await?;
        }

        for seller in order.seller_ids() {
            notify(
                &mut *tx,
                seller,
                kinds::PAYMENT_RECEIVED,
                "Payment received",
                format!("Order #{id} has been paid"),
                &order,
            )
            .await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        info!("Payment recorded");

        self.orders.get(id).await?.ok_or(OrderError::NotFound)
    }
}

fn visible_to(order: &Order, user: UserId) -> bool {
    order.buyer_id == user || order.has_seller(user)
}

/// Check the state machine and who may perform the move.
fn authorize_transition(order: &Order, caller: UserId, next: OrderStatus) -> Result<(), OrderError> {
    if !order.status.can_transition_to(next) {
        return Err(OrderError::transition(order.status, next));
    }

    match next {
        OrderStatus::Shipped | OrderStatus::Delivered if !order.has_seller(caller) => Err(
            OrderError::Forbidden("only a seller on this order can mark it shipped or delivered"),
        ),
        OrderStatus::Paid if order.payment_status != PaymentStatus::Paid => {
            Err(OrderError::transition(order.status, next))
        }
        _ => Ok(()),
    }
}

/// Validate request lines and merge duplicates, keyed in ascending id order.
fn merge_lines(lines: &[OrderLineRequest]) -> Result<BTreeMap<ProductId, i32>, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }
    if lines.len() > MAX_ORDER_LINES {
        return Err(OrderError::Validation(format!(
            "an order can have at most {MAX_ORDER_LINES} lines"
        )));
    }

    let mut merged: BTreeMap<ProductId, i32> = BTreeMap::new();
    for line in lines {
        if line.quantity < 1 {
            return Err(OrderError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        let too_many = || {
            OrderError::Validation(format!("quantity must be at most {MAX_ITEM_QUANTITY}"))
        };
        if line.quantity > MAX_ITEM_QUANTITY {
            return Err(too_many());
        }
        let quantity = merged.entry(line.product_id).or_insert(0);
        *quantity = quantity
            .checked_add(line.quantity)
            .filter(|q| *q <= MAX_ITEM_QUANTITY)
            .ok_or_else(too_many)?;
    }
    Ok(merged)
}

/// Price every line against the locked rows, failing on the first problem.
fn plan_order(
    buyer: UserId,
    lines: &BTreeMap<ProductId, i32>,
    locked: &[Product],
) -> Result<OrderPlan, OrderError> {
    let mut items = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;
    let mut currency = None;

    for (&product_id, &quantity) in lines {
        let product = locked
            .iter()
            .find(|p| p.id == product_id && p.is_active)
            .ok_or(OrderError::ProductUnavailable(product_id))?;

        if product.seller_id == buyer {
            return Err(OrderError::OwnProduct(product_id));
        }
        if product.stock_quantity < quantity {
            return Err(OrderError::InsufficientStock {
                product_id,
                available: product.stock_quantity,
                requested: quantity,
            });
        }
        match currency {
            None => currency = Some(product.currency),
            Some(c) if c != product.currency => return Err(OrderError::MixedCurrency),
            Some(_) => {}
        }

        let subtotal = product
            .price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| OrderError::Validation("order total overflow".to_string()))?;
        total = total
            .checked_add(subtotal)
            .filter(|t| *t <= Price::MAX_AMOUNT)
            .ok_or_else(|| {
                OrderError::Validation(format!("order total cannot exceed {}", Price::MAX_AMOUNT))
            })?;

        items.push(ItemSnapshot {
            product_id,
            seller_id: product.seller_id,
            title: product.title.clone(),
            unit_price: product.price,
            quantity,
            subtotal,
        });
    }

    Ok(OrderPlan {
        items,
        total,
        currency: currency.unwrap_or_default(),
    })
}

async fn notify(
    conn: &mut PgConnection,
    user: UserId,
    kind: &'static str,
    title: &str,
    message: String,
    order: &Order,
) -> Result<(), RepositoryError> {
    NotificationRepository::insert(
        conn,
        &NewNotification {
            user_id: user,
            kind,
            title: title.to_string(),
            message,
            payload: serde_json::json!({ "order_id": order.id }),
        },
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use greens_core::{OrderItemId, ProductCondition};

    use super::*;
    use crate::models::order::OrderItem;

    const BUYER: UserId = UserId::new(1);
    const SELLER: UserId = UserId::new(2);

    fn product(id: i32, price: &str, stock: i32) -> Product {
        Product {
            id: ProductId::new(id),
            seller_id: SELLER,
            category_id: None,
            title: format!("Product {id}"),
            description: String::new(),
            price: Decimal::from_str(price).unwrap_or_default(),
            currency: CurrencyCode::USD,
            condition: ProductCondition::New,
            stock_quantity: stock,
            specifications: serde_json::json!({}),
            images: Vec::new(),
            is_active: true,
            view_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(id: i32, quantity: i32) -> OrderLineRequest {
        OrderLineRequest {
            product_id: ProductId::new(id),
            quantity,
        }
    }

    fn order(status: OrderStatus, payment: PaymentStatus) -> Order {
        Order {
            id: OrderId::new(9),
            buyer_id: BUYER,
            status,
            payment_status: payment,
            escrow_status: EscrowStatus::None,
            total_amount: Decimal::TEN,
            currency: CurrencyCode::USD,
            shipping_address: None,
            notes: None,
            payment_method: None,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            escrow_released_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(9),
                product_id: ProductId::new(10),
                seller_id: SELLER,
                title: "Kale".to_string(),
                unit_price: Decimal::TEN,
                quantity: 1,
                subtotal: Decimal::TEN,
            }],
        }
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(matches!(merge_lines(&[]), Err(OrderError::EmptyOrder)));
    }

    #[test]
    fn test_duplicate_lines_merged_in_id_order() {
        let merged = merge_lines(&[line(5, 1), line(2, 2), line(5, 3)]).unwrap_or_default();
        let pairs: Vec<(i32, i32)> = merged.iter().map(|(k, v)| (k.as_i32(), *v)).collect();
        assert_eq!(pairs, vec![(2, 2), (5, 4)]);
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        assert!(matches!(
            merge_lines(&[line(1, 0)]),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn test_huge_quantities_rejected_without_overflow() {
        assert!(matches!(
            merge_lines(&[line(1, 999), line(1, i32::MAX)]),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            merge_lines(&[line(1, 600), line(1, 400)]),
            Err(OrderError::Validation(_))
        ));
        assert!(merge_lines(&[line(1, 500), line(1, 499)]).is_ok());
    }

    #[test]
    fn test_plan_total_bounded_by_storage() {
        let lines = merge_lines(&[line(1, 999), line(2, 999)]).unwrap_or_default();
        let err = plan_order(
            BUYER,
            &lines,
            &[
                product(1, "9000000000.00", 999),
                product(2, "9000000000.00", 999),
            ],
        )
        .err();
        assert!(matches!(err, Some(OrderError::Validation(_))));
    }

    #[test]
    fn test_plan_totals() {
        let lines = merge_lines(&[line(10, 3)]).unwrap_or_default();
        let plan = plan_order(BUYER, &lines, &[product(10, "10.00", 5)]);
        let plan = plan.ok();

        assert_eq!(plan.as_ref().map(|p| p.total), Decimal::from_str("30.00").ok());
        assert_eq!(plan.as_ref().map(|p| p.items.len()), Some(1));
    }

    #[test]
    fn test_plan_insufficient_stock() {
        let lines = merge_lines(&[line(10, 3)]).unwrap_or_default();
        let err = plan_order(BUYER, &lines, &[product(10, "10.00", 2)]).err();

        assert!(matches!(
            err,
            Some(OrderError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_plan_one_bad_line_fails_all() {
        let lines = merge_lines(&[line(1, 1), line(2, 1)]).unwrap_or_default();
        let err = plan_order(BUYER, &lines, &[product(1, "1.00", 5)]).err();
        assert!(matches!(err, Some(OrderError::ProductUnavailable(id)) if id == ProductId::new(2)));
    }

    #[test]
    fn test_plan_rejects_own_and_inactive_products() {
        let lines = merge_lines(&[line(1, 1)]).unwrap_or_default();

        let mut own = product(1, "1.00", 5);
        own.seller_id = BUYER;
        assert!(matches!(
            plan_order(BUYER, &lines, &[own]),
            Err(OrderError::OwnProduct(_))
        ));

        let mut inactive = product(1, "1.00", 5);
        inactive.is_active = false;
        assert!(matches!(
            plan_order(BUYER, &lines, &[inactive]),
            Err(OrderError::ProductUnavailable(_))
        ));
    }

    #[test]
    fn test_plan_rejects_mixed_currency() {
        let lines = merge_lines(&[line(1, 1), line(2, 1)]).unwrap_or_default();
        let mut euro = product(2, "1.00", 5);
        euro.currency = CurrencyCode::EUR;
        assert!(matches!(
            plan_order(BUYER, &lines, &[product(1, "1.00", 5), euro]),
            Err(OrderError::MixedCurrency)
        ));
    }

    #[test]
    fn test_pending_cannot_be_delivered() {
        let pending = order(OrderStatus::Pending, PaymentStatus::Pending);
        let err = authorize_transition(&pending, SELLER, OrderStatus::Delivered).err();
        assert!(matches!(err, Some(OrderError::InvalidTransition { .. })));
        assert_eq!(err.map(|e| e.code()), Some("INVALID_TRANSITION"));
    }

    #[test]
    fn test_either_party_can_cancel_pending() {
        let pending = order(OrderStatus::Pending, PaymentStatus::Pending);
        assert!(authorize_transition(&pending, BUYER, OrderStatus::Cancelled).is_ok());
        assert!(authorize_transition(&pending, SELLER, OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_only_seller_ships() {
        let paid = order(OrderStatus::Paid, PaymentStatus::Paid);
        assert!(matches!(
            authorize_transition(&paid, BUYER, OrderStatus::Shipped),
            Err(OrderError::Forbidden(_))
        ));
        assert!(authorize_transition(&paid, SELLER, OrderStatus::Shipped).is_ok());
    }

    #[test]
    fn test_paid_requires_payment() {
        let unpaid = order(OrderStatus::Pending, PaymentStatus::Pending);
        assert!(matches!(
            authorize_transition(&unpaid, SELLER, OrderStatus::Paid),
            Err(OrderError::InvalidTransition { .. })
        ));
    }
}
