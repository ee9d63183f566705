#![allow(dead_code)]

use async_trait::async_trait;
use payflow::application::events::{EventBus, GroupSyncListener};
use payflow::application::jobs::{JobContext, JobRunner};
use payflow::application::payouts::PayoutService;
use payflow::application::worker::Worker;
use payflow::domain::events::DomainEventKind;
use payflow::domain::money::{Amount, Balance};
use payflow::domain::payout::{Commission, CommissionId, CommissionStatus, SellerId};
use payflow::domain::ports::{CommissionStore, WebhookTransport};
use payflow::domain::webhook::{HttpMethod, RenderEngine, SignedRequest, TransportResponse, Webhook};
use payflow::error::{PaymentError, Result};
use payflow::infrastructure::in_memory::{
    InMemoryCatalogStore, InMemoryCommissionStore, InMemoryFraudScreen, InMemoryJobQueue,
    InMemoryOrderStore, InMemoryPayoutStore, InMemoryReservationStore, InMemoryUserStore,
    InMemoryWebhookLogStore, InMemoryWebhookStore, RecordingGroupSynchronizer,
};
use payflow::infrastructure::sandbox::SandboxProcessor;
use payflow::webhooks::caller::WebhookCaller;
use payflow::webhooks::dispatcher::WebhookDispatcher;
use payflow::webhooks::recorder::WebhookLogRecorder;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Answers with scripted statuses (200 once the script runs out) and keeps
/// every request it was handed.
#[derive(Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<u16>>>,
    requests: Mutex<Vec<SignedRequest>>,
}

impl RecordingTransport {
    pub async fn respond_with(&self, status: u16) {
        self.script.lock().await.push_back(Ok(status));
    }

    pub async fn fail_with(&self, message: &str) {
        self.script
            .lock()
            .await
            .push_back(Err(PaymentError::GatewayError(message.to_string())));
    }

    pub async fn requests(&self) -> Vec<SignedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, request: &SignedRequest) -> Result<TransportResponse> {
        self.requests.lock().await.push(request.clone());
        let status = self.script.lock().await.pop_front().unwrap_or(Ok(200))?;
        Ok(TransportResponse {
            status,
            body: format!("{{\"status\":{status}}}"),
            headers: BTreeMap::from([("x-request-id".to_string(), "req-1".to_string())]),
        })
    }
}

/// Every adapter wired together in memory, with webhook dispatch and group
/// sync listening on the event bus.
pub struct World {
    pub processor: Arc<SandboxProcessor>,
    pub users: InMemoryUserStore,
    pub catalog: InMemoryCatalogStore,
    pub orders: InMemoryOrderStore,
    pub payouts: InMemoryPayoutStore,
    pub commissions: InMemoryCommissionStore,
    pub webhooks: InMemoryWebhookStore,
    pub logs: InMemoryWebhookLogStore,
    pub queue: InMemoryJobQueue,
    pub groups: RecordingGroupSynchronizer,
    pub transport: Arc<RecordingTransport>,
    pub events: Arc<EventBus>,
    next_commission: AtomicU64,
}

impl World {
    pub fn new(platform_balance: Decimal) -> Self {
        let queue = InMemoryJobQueue::new();
        let webhooks = InMemoryWebhookStore::new();
        let logs = InMemoryWebhookLogStore::new();
        let dispatcher = WebhookDispatcher::new(
            Arc::new(webhooks.clone()),
            Arc::new(logs.clone()),
            Arc::new(queue.clone()),
        );
        let events = EventBus::new()
            .with_listener(Arc::new(dispatcher))
            .with_listener(Arc::new(GroupSyncListener::new(Arc::new(queue.clone()))));

        Self {
            processor: Arc::new(SandboxProcessor::new(Balance::new(platform_balance))),
            users: InMemoryUserStore::new(),
            catalog: InMemoryCatalogStore::new(),
            orders: InMemoryOrderStore::new(),
            payouts: InMemoryPayoutStore::new(),
            commissions: InMemoryCommissionStore::new(),
            webhooks,
            logs,
            queue,
            groups: RecordingGroupSynchronizer::new(),
            transport: Arc::new(RecordingTransport::default()),
            events: Arc::new(events),
            next_commission: AtomicU64::new(1),
        }
    }

    pub fn payout_service(&self) -> PayoutService {
        PayoutService::new(
            self.processor.clone(),
            Arc::new(self.payouts.clone()),
            Arc::new(self.commissions.clone()),
            self.events.clone(),
        )
    }

    pub fn runner(&self) -> Arc<JobRunner> {
        Arc::new(JobRunner::new(JobContext {
            gateway: self.processor.clone(),
            users: Arc::new(self.users.clone()),
            catalog: Arc::new(self.catalog.clone()),
            orders: Arc::new(self.orders.clone()),
            reservations: Arc::new(InMemoryReservationStore::new()),
            groups: Arc::new(self.groups.clone()),
            fraud: Arc::new(InMemoryFraudScreen::new()),
            events: self.events.clone(),
            webhook_caller: Arc::new(WebhookCaller::new(
                self.transport.clone(),
                3,
                Duration::from_millis(1),
            )),
            webhook_recorder: Arc::new(WebhookLogRecorder::new(Arc::new(self.logs.clone()))),
            pending_order_ttl: chrono::Duration::hours(24),
            inactive_user_ttl: chrono::Duration::days(365),
        }))
    }

    pub fn worker(&self) -> Worker {
        Worker::new(Arc::new(self.queue.clone()), self.runner())
    }

    /// Stores one pending commission per amount for `seller_id`.
    pub async fn seed_commissions(
        &self,
        seller_id: SellerId,
        amounts: &[Decimal],
    ) -> Vec<CommissionId> {
        let mut ids = Vec::with_capacity(amounts.len());
        for amount in amounts {
            let id = self.next_commission.fetch_add(1, Ordering::SeqCst);
            self.commissions
                .store(Commission {
                    id,
                    order_id: 1000 + id,
                    seller_id,
                    amount: Amount::new(*amount).unwrap(),
                    status: CommissionStatus::Pending,
                    payout_id: None,
                })
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }
}

pub fn expression_webhook(id: u64, events: &[DomainEventKind], payload: serde_json::Value) -> Webhook {
    Webhook {
        id,
        url: format!("https://hooks.example.com/{id}"),
        method: HttpMethod::Post,
        headers: BTreeMap::new(),
        secret: format!("secret-{id}"),
        events: events.to_vec(),
        render: RenderEngine::Expression,
        payload_json: Some(payload),
        payload_text: None,
        enabled: true,
    }
}

/// Writes a commissions CSV with the given `(commission, order, seller, amount)` rows.
pub fn write_commissions_csv(path: &Path, rows: &[(u64, u64, u64, &str)]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "commission, order, seller, amount")?;
    for (commission, order, seller, amount) in rows {
        writeln!(file, "{commission}, {order}, {seller}, {amount}")?;
    }
    Ok(())
}
