use super::order::{Order, Subscription, User, UserId};
use super::payout::Payout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every event the core produces or consumes.
///
/// Serialises with a `type` tag equal to the dotted [`DomainEventKind`] name, which
/// is also the shape webhook templates see as `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    #[serde(rename = "payout.created")]
    PayoutCreated { payout: Payout },
    #[serde(rename = "payout.processed")]
    PayoutProcessed { payout: Payout },
    #[serde(rename = "payout.failed")]
    PayoutFailed { payout: Payout, reason: String },
    #[serde(rename = "payout.cancelled")]
    PayoutCancelled {
        payout: Payout,
        reason: Option<String>,
    },
    #[serde(rename = "order.created")]
    OrderCreated { order: Order },
    #[serde(rename = "order.cancelled")]
    OrderCancelled { order: Order },
    #[serde(rename = "order.refunded")]
    OrderRefunded {
        order: Order,
        reason: Option<String>,
    },
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded {
        order: Order,
        invoice_id: Option<String>,
    },
    #[serde(rename = "subscription.created")]
    SubscriptionCreated { subscription: Subscription },
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated { subscription: Subscription },
    #[serde(rename = "subscription.deleted")]
    SubscriptionDeleted { subscription: Subscription },
    #[serde(rename = "user.created")]
    UserCreated { user: User },
    #[serde(rename = "user.updated")]
    UserUpdated { user: User },
    #[serde(rename = "user.deleted")]
    UserDeleted { user: User },
}

impl DomainEvent {
    pub fn kind(&self) -> DomainEventKind {
        match self {
            DomainEvent::PayoutCreated { .. } => DomainEventKind::PayoutCreated,
            DomainEvent::PayoutProcessed { .. } => DomainEventKind::PayoutProcessed,
            DomainEvent::PayoutFailed { .. } => DomainEventKind::PayoutFailed,
            DomainEvent::PayoutCancelled { .. } => DomainEventKind::PayoutCancelled,
            DomainEvent::OrderCreated { .. } => DomainEventKind::OrderCreated,
            DomainEvent::OrderCancelled { .. } => DomainEventKind::OrderCancelled,
            DomainEvent::OrderRefunded { .. } => DomainEventKind::OrderRefunded,
            DomainEvent::PaymentSucceeded { .. } => DomainEventKind::PaymentSucceeded,
            DomainEvent::SubscriptionCreated { .. } => DomainEventKind::SubscriptionCreated,
            DomainEvent::SubscriptionUpdated { .. } => DomainEventKind::SubscriptionUpdated,
            DomainEvent::SubscriptionDeleted { .. } => DomainEventKind::SubscriptionDeleted,
            DomainEvent::UserCreated { .. } => DomainEventKind::UserCreated,
            DomainEvent::UserUpdated { .. } => DomainEventKind::UserUpdated,
            DomainEvent::UserDeleted { .. } => DomainEventKind::UserDeleted,
        }
    }

    /// The user whose group memberships may have changed, if any.
    pub fn subscription_owner(&self) -> Option<UserId> {
        match self {
            DomainEvent::SubscriptionCreated { subscription }
            | DomainEvent::SubscriptionUpdated { subscription }
            | DomainEvent::SubscriptionDeleted { subscription } => Some(subscription.user_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DomainEventKind {
    #[serde(rename = "payout.created")]
    PayoutCreated,
    #[serde(rename = "payout.processed")]
    PayoutProcessed,
    #[serde(rename = "payout.failed")]
    PayoutFailed,
    #[serde(rename = "payout.cancelled")]
    PayoutCancelled,
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "order.refunded")]
    OrderRefunded,
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded,
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,
    #[serde(rename = "subscription.deleted")]
    SubscriptionDeleted,
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "user.deleted")]
    UserDeleted,
}

impl DomainEventKind {
    pub const ALL: [DomainEventKind; 14] = [
        DomainEventKind::PayoutCreated,
        DomainEventKind::PayoutProcessed,
        DomainEventKind::PayoutFailed,
        DomainEventKind::PayoutCancelled,
        DomainEventKind::OrderCreated,
        DomainEventKind::OrderCancelled,
        DomainEventKind::OrderRefunded,
        DomainEventKind::PaymentSucceeded,
        DomainEventKind::SubscriptionCreated,
        DomainEventKind::SubscriptionUpdated,
        DomainEventKind::SubscriptionDeleted,
        DomainEventKind::UserCreated,
        DomainEventKind::UserUpdated,
        DomainEventKind::UserDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventKind::PayoutCreated => "payout.created",
            DomainEventKind::PayoutProcessed => "payout.processed",
            DomainEventKind::PayoutFailed => "payout.failed",
            DomainEventKind::PayoutCancelled => "payout.cancelled",
            DomainEventKind::OrderCreated => "order.created",
            DomainEventKind::OrderCancelled => "order.cancelled",
            DomainEventKind::OrderRefunded => "order.refunded",
            DomainEventKind::PaymentSucceeded => "payment.succeeded",
            DomainEventKind::SubscriptionCreated => "subscription.created",
            DomainEventKind::SubscriptionUpdated => "subscription.updated",
            DomainEventKind::SubscriptionDeleted => "subscription.deleted",
            DomainEventKind::UserCreated => "user.created",
            DomainEventKind::UserUpdated => "user.updated",
            DomainEventKind::UserDeleted => "user.deleted",
        }
    }
}

impl fmt::Display for DomainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainEventKind {
    type Err = crate::error::PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DomainEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                crate::error::PaymentError::ValidationError(format!("Unknown event kind: {s}"))
            })
    }
}
