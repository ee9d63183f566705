use crate::domain::events::{DomainEvent, DomainEventKind};
use crate::domain::jobs::{Batch, BatchHandle, QueuedJob};
use crate::domain::order::{InventoryReservation, Order, OrderId, OrderStatus, Price, PriceId};
use crate::domain::order::{Product, ProductId, User, UserId};
use crate::domain::payout::{Commission, CommissionId, Payout, PayoutId, PayoutStatus};
use crate::domain::ports::{
    CatalogStore, CommissionStore, EventPublisher, FraudScreen, GroupSynchronizer, JobQueue,
    JobSource, OrderStore, PayoutStore, ReservationStore, UserStore, WebhookLogStore, WebhookStore,
};
use crate::domain::webhook::{Webhook, WebhookLog, WebhookLogId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify, RwLock};
use uuid::Uuid;

/// A thread-safe in-memory store for users.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<BTreeMap<UserId, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn store(&self, user: User) -> Result<()> {
        self.users.write().await.insert(user.id, user);
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.write().await.remove(&id))
    }
}

/// Products and prices, keyed by local id.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    prices: Arc<RwLock<HashMap<PriceId, Price>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn store_product(&self, product: Product) -> Result<()> {
        self.products.write().await.insert(product.id, product);
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn store_price(&self, price: Price) -> Result<()> {
        self.prices.write().await.insert(price.id, price);
        Ok(())
    }

    async fn price(&self, id: PriceId) -> Result<Option<Price>> {
        Ok(self.prices.read().await.get(&id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<BTreeMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn store(&self, order: Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn pending_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect())
    }
}

/// Payouts with version-checked updates.
///
/// The write lock is held across the version comparison and the write, which is
/// what makes `update` a compare-and-swap.
#[derive(Default, Clone)]
pub struct InMemoryPayoutStore {
    payouts: Arc<RwLock<BTreeMap<PayoutId, Payout>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryPayoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn insert(&self, mut payout: Payout) -> Result<Payout> {
        let mut payouts = self.payouts.write().await;
        if payout.id == 0 {
            payout.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.next_id.fetch_max(payout.id, Ordering::SeqCst);
        }
        if payouts.contains_key(&payout.id) {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: payout.id,
            });
        }
        payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        Ok(self.payouts.read().await.get(&id).cloned())
    }

    async fn update(&self, mut payout: Payout) -> Result<Payout> {
        let mut payouts = self.payouts.write().await;
        let stored = payouts.get(&payout.id).ok_or(PaymentError::NotFound {
            entity: "payout",
            id: payout.id,
        })?;
        if stored.version != payout.version {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: payout.id,
            });
        }
        payout.version += 1;
        payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn by_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payout>> {
        Ok(self.payouts.read().await.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryCommissionStore {
    commissions: Arc<RwLock<BTreeMap<CommissionId, Commission>>>,
}

impl InMemoryCommissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    async fn store(&self, commission: Commission) -> Result<()> {
        self.commissions
            .write()
            .await
            .insert(commission.id, commission);
        Ok(())
    }

    async fn get(&self, id: CommissionId) -> Result<Option<Commission>> {
        Ok(self.commissions.read().await.get(&id).cloned())
    }

    async fn for_payout(&self, payout_id: PayoutId) -> Result<Vec<Commission>> {
        let commissions = self.commissions.read().await;
        Ok(commissions
            .values()
            .filter(|c| c.payout_id == Some(payout_id))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryWebhookStore {
    webhooks: Arc<RwLock<BTreeMap<u64, Webhook>>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn store(&self, webhook: Webhook) -> Result<()> {
        self.webhooks.write().await.insert(webhook.id, webhook);
        Ok(())
    }

    async fn subscribed_to(&self, kind: DomainEventKind) -> Result<Vec<Webhook>> {
        let webhooks = self.webhooks.read().await;
        Ok(webhooks
            .values()
            .filter(|w| w.subscribes_to(kind))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryWebhookLogStore {
    logs: Arc<RwLock<BTreeMap<WebhookLogId, WebhookLog>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryWebhookLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<WebhookLog> {
        self.logs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryWebhookLogStore {
    async fn create(&self, mut log: WebhookLog) -> Result<WebhookLog> {
        log.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.logs.write().await.insert(log.id, log.clone());
        Ok(log)
    }

    async fn get(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn update(&self, log: WebhookLog) -> Result<()> {
        let mut logs = self.logs.write().await;
        if !logs.contains_key(&log.id) {
            return Err(PaymentError::NotFound {
                entity: "webhook log",
                id: log.id,
            });
        }
        logs.insert(log.id, log);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryReservationStore {
    reservations: Arc<RwLock<BTreeMap<u64, InventoryReservation>>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn hold(&self, reservation: InventoryReservation) {
        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation);
    }

    pub async fn len(&self) -> usize {
        self.reservations.read().await.len()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<InventoryReservation>> {
        let reservations = self.reservations.read().await;
        Ok(reservations
            .values()
            .filter(|r| r.expires_at <= now)
            .cloned()
            .collect())
    }

    async fn release(&self, id: u64) -> Result<()> {
        self.reservations.write().await.remove(&id);
        Ok(())
    }
}

/// Records every published event in order.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<DomainEventKind> {
        self.events.lock().await.iter().map(DomainEvent::kind).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// A dispatched batch as the queue remembers it.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    pub id: Uuid,
    pub name: String,
    pub total_jobs: usize,
}

/// A FIFO job queue with named sub-queues, shared between producers and workers.
#[derive(Default, Clone)]
pub struct InMemoryJobQueue {
    jobs: Arc<Mutex<VecDeque<QueuedJob>>>,
    batches: Arc<Mutex<Vec<BatchRecord>>>,
    notify: Arc<Notify>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest job, optionally restricted to one queue name.
    pub async fn pop(&self, queue: Option<&str>) -> Option<QueuedJob> {
        let mut jobs = self.jobs.lock().await;
        let index = jobs
            .iter()
            .position(|job| queue.is_none_or(|name| job.queue == name))?;
        jobs.remove(index)
    }

    pub async fn pending(&self) -> Vec<QueuedJob> {
        self.jobs.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    pub async fn batches(&self) -> Vec<BatchRecord> {
        self.batches.lock().await.clone()
    }

    /// Resolves when a job is pushed after the call.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, job: QueuedJob) -> Result<()> {
        self.jobs.lock().await.push_back(job);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dispatch_batch(&self, batch: Batch) -> Result<BatchHandle> {
        let handle = batch.handle();
        self.batches.lock().await.push(BatchRecord {
            id: handle.id,
            name: handle.name.clone(),
            total_jobs: handle.total_jobs,
        });
        self.jobs.lock().await.extend(batch.into_queued());
        self.notify.notify_waiters();
        Ok(handle)
    }
}

#[async_trait]
impl JobSource for InMemoryJobQueue {
    async fn next_job(&self, queue: Option<&str>) -> Option<QueuedJob> {
        self.pop(queue).await
    }

    async fn wait_for_job(&self) {
        self.notified().await;
    }
}

/// Records which users had their groups synchronised.
#[derive(Default, Clone)]
pub struct RecordingGroupSynchronizer {
    synced: Arc<Mutex<Vec<UserId>>>,
}

impl RecordingGroupSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn synced(&self) -> Vec<UserId> {
        self.synced.lock().await.clone()
    }
}

#[async_trait]
impl GroupSynchronizer for RecordingGroupSynchronizer {
    async fn sync_groups(&self, user_id: UserId) -> Result<()> {
        self.synced.lock().await.push(user_id);
        Ok(())
    }
}

/// A fingerprint deny list.
#[derive(Default, Clone)]
pub struct InMemoryFraudScreen {
    flagged: Arc<RwLock<HashSet<String>>>,
    blocked: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryFraudScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn flag(&self, fingerprint: &str) {
        self.flagged.write().await.insert(fingerprint.to_string());
    }

    pub async fn is_blocked(&self, fingerprint: &str) -> bool {
        self.blocked.read().await.contains(fingerprint)
    }
}

#[async_trait]
impl FraudScreen for InMemoryFraudScreen {
    async fn is_flagged(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.flagged.read().await.contains(fingerprint))
    }

    async fn block(&self, fingerprint: &str) -> Result<()> {
        self.blocked.write().await.insert(fingerprint.to_string());
        Ok(())
    }
}
