use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = u64;
pub type OrderId = u64;
pub type ProductId = u64;
pub type PriceId = u64;

/// A platform user, optionally linked to a customer record at the payment processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub external_customer_id: Option<String>,
    pub default_payment_method: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: name.into(),
            external_customer_id: None,
            default_payment_method: None,
            last_seen_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub external_product_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    OneTime,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,
    pub product_id: ProductId,
    pub amount: Amount,
    pub currency: String,
    pub interval: BillingInterval,
    pub external_price_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Succeeded,
    Cancelled,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Succeeded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Succeeded => "succeeded",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub price_id: PriceId,
    pub quantity: u32,
}

/// A purchase intent. Owns its items; processor identifiers are filled in as the
/// order is linked to remote resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub external_customer_id: Option<String>,
    pub external_invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            status: OrderStatus::Pending,
            items: Vec::new(),
            external_customer_id: None,
            external_invoice_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, price_id: PriceId, quantity: u32) -> Self {
        self.items.push(OrderItem { price_id, quantity });
        self
    }
}

/// How a mid-cycle price change is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationBehavior {
    #[default]
    CreateProrations,
    AlwaysInvoice,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentBehavior {
    #[default]
    AllowIncomplete,
    DefaultIncomplete,
    ErrorIfIncomplete,
    PendingIfIncomplete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    pub proration_behavior: Option<ProrationBehavior>,
    pub backdate_start_date: Option<DateTime<Utc>>,
    pub billing_cycle_anchor: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub external_id: String,
    pub user_id: UserId,
    pub price_id: PriceId,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub external_id: String,
    pub customer_id: String,
    pub amount_paid: rust_decimal::Decimal,
    pub status: String,
}

/// A held unit of stock for a pending checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: u64,
    pub product_id: ProductId,
    pub order_id: Option<OrderId>,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_cancel_and_refund_predicates() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Succeeded.can_cancel());
        assert!(OrderStatus::Succeeded.can_refund());
        assert!(!OrderStatus::Refunded.can_refund());
    }

    #[test]
    fn test_order_builder_attaches_items() {
        let order = Order::new(7, 1).with_item(10, 2).with_item(11, 1);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].price_id, 10);
    }
}
