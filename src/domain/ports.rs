use super::events::{DomainEvent, DomainEventKind};
use super::jobs::{Batch, BatchHandle, QueuedJob};
use super::money::{Amount, Balance};
use super::order::{
    InventoryReservation, Invoice, Order, OrderId, PaymentBehavior, Price, PriceId, Product,
    ProductId, ProrationBehavior, Subscription, SubscriptionOptions, User, UserId,
};
use super::payout::{
    Commission, CommissionId, Payout, PayoutId, PayoutStatus, ProcessorPayout, SellerId, Transfer,
};
use super::webhook::{SignedRequest, TransportResponse, Webhook, WebhookLog, WebhookLogId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The remote payment processor as seen by orders and subscriptions.
///
/// Transport and retry semantics belong to implementations; the core treats every
/// call as a single opaque request.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn current_subscription(&self, user: &User) -> Result<Option<Subscription>>;
    async fn swap_subscription(
        &self,
        user: &User,
        price: &Price,
        proration_behavior: ProrationBehavior,
        payment_behavior: PaymentBehavior,
    ) -> Result<Subscription>;
    async fn start_subscription(
        &self,
        order: &Order,
        options: &SubscriptionOptions,
    ) -> Result<Subscription>;
    async fn cancel_order(&self, order: &Order) -> Result<()>;
    async fn refund_order(
        &self,
        order: &Order,
        reason: Option<&str>,
        notes: Option<&str>,
    ) -> Result<()>;
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>>;
    async fn create_customer(&self, user: &User) -> Result<Option<String>>;
    async fn create_product(&self, product: &Product) -> Result<Option<String>>;
    async fn create_price(&self, price: &Price, external_product_id: &str)
    -> Result<Option<String>>;
    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<String>>;
    async fn default_payment_method(&self, customer_id: &str) -> Result<Option<String>>;
    async fn set_default_payment_method(&self, customer_id: &str, method_id: &str) -> Result<()>;
    async fn find_invoice(&self, invoice_id: &str) -> Result<Option<Invoice>>;
}

/// The processor's payout surface. `None` means the driver produced no object.
#[async_trait]
pub trait PayoutGateway: Send + Sync {
    async fn create_transfer(&self, seller_id: SellerId, amount: Amount)
    -> Result<Option<Transfer>>;
    async fn create_payout(&self, payout: &Payout) -> Result<Option<ProcessorPayout>>;
    async fn platform_balance(&self) -> Result<Balance>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn store(&self, user: User) -> Result<()>;
    async fn get(&self, id: UserId) -> Result<Option<User>>;
    async fn all(&self) -> Result<Vec<User>>;
    async fn delete(&self, id: UserId) -> Result<Option<User>>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn store_product(&self, product: Product) -> Result<()>;
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;
    async fn store_price(&self, price: Price) -> Result<()>;
    async fn price(&self, id: PriceId) -> Result<Option<Price>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn store(&self, order: Order) -> Result<()>;
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Order>>;
    async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Persists a new payout, assigning its id when `payout.id` is 0.
    async fn insert(&self, payout: Payout) -> Result<Payout>;
    async fn get(&self, id: PayoutId) -> Result<Option<Payout>>;
    /// Writes `payout` only if the stored version still equals `payout.version`,
    /// returning the stored copy with its version bumped. A stale write is a
    /// `Conflict`.
    async fn update(&self, payout: Payout) -> Result<Payout>;
    async fn by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>>;
    async fn all(&self) -> Result<Vec<Payout>>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    async fn store(&self, commission: Commission) -> Result<()>;
    async fn get(&self, id: CommissionId) -> Result<Option<Commission>>;
    async fn for_payout(&self, payout_id: PayoutId) -> Result<Vec<Commission>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn store(&self, webhook: Webhook) -> Result<()>;
    async fn subscribed_to(&self, kind: DomainEventKind) -> Result<Vec<Webhook>>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Persists a new log row, assigning its id.
    async fn create(&self, log: WebhookLog) -> Result<WebhookLog>;
    async fn get(&self, id: WebhookLogId) -> Result<Option<WebhookLog>>;
    async fn update(&self, log: WebhookLog) -> Result<()>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>>;
    async fn release(&self, id: u64) -> Result<()>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: QueuedJob) -> Result<()>;
    async fn dispatch_batch(&self, batch: Batch) -> Result<BatchHandle>;
}

/// The consuming side of a job queue.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Takes the oldest job, optionally restricted to one queue name.
    async fn next_job(&self, queue: Option<&str>) -> Option<QueuedJob>;
    /// Resolves when new work may be available.
    async fn wait_for_job(&self);
}

/// Recomputes a user's community group memberships from their entitlements.
#[async_trait]
pub trait GroupSynchronizer: Send + Sync {
    async fn sync_groups(&self, user_id: UserId) -> Result<()>;
}

#[async_trait]
pub trait FraudScreen: Send + Sync {
    async fn is_flagged(&self, fingerprint: &str) -> Result<bool>;
    async fn block(&self, fingerprint: &str) -> Result<()>;
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &SignedRequest) -> Result<TransportResponse>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type PayoutGatewayRef = Arc<dyn PayoutGateway>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
pub type UserStoreRef = Arc<dyn UserStore>;
pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PayoutStoreRef = Arc<dyn PayoutStore>;
pub type CommissionStoreRef = Arc<dyn CommissionStore>;
pub type WebhookStoreRef = Arc<dyn WebhookStore>;
pub type WebhookLogStoreRef = Arc<dyn WebhookLogStore>;
pub type ReservationStoreRef = Arc<dyn ReservationStore>;
pub type JobQueueRef = Arc<dyn JobQueue>;
pub type JobSourceRef = Arc<dyn JobSource>;
pub type GroupSynchronizerRef = Arc<dyn GroupSynchronizer>;
pub type FraudScreenRef = Arc<dyn FraudScreen>;
pub type WebhookTransportRef = Arc<dyn WebhookTransport>;
