use super::render::{self, Rendered};
use crate::application::events::EventListener;
use crate::domain::events::DomainEvent;
use crate::domain::jobs::{Job, QueuedJob, WebhookCall};
use crate::domain::ports::{JobQueueRef, WebhookLogStoreRef, WebhookStoreRef};
use crate::domain::webhook::{DeliveryStatus, Webhook, WebhookLog, WebhookLogId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const WEBHOOK_QUEUE: &str = "webhooks";

/// Renders and queues a delivery for every webhook subscribed to an event.
pub struct WebhookDispatcher {
    webhooks: WebhookStoreRef,
    logs: WebhookLogStoreRef,
    queue: JobQueueRef,
    queue_name: String,
}

impl WebhookDispatcher {
    pub fn new(webhooks: WebhookStoreRef, logs: WebhookLogStoreRef, queue: JobQueueRef) -> Self {
        Self {
            webhooks,
            logs,
            queue,
            queue_name: WEBHOOK_QUEUE.to_string(),
        }
    }

    pub fn on_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Returns the ids of the log rows created, one per queued delivery.
    #[tracing::instrument(skip_all, fields(event = %event.kind()))]
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<Vec<WebhookLogId>> {
        let hooks = self.webhooks.subscribed_to(event.kind()).await?;
        if hooks.is_empty() {
            return Ok(Vec::new());
        }

        let scope = render::scope(event)?;
        let mut queued = Vec::with_capacity(hooks.len());
        for hook in hooks {
            match render::render(&hook, &scope) {
                Rendered::Payload(payload) => {
                    queued.push(self.enqueue(&hook, event, payload).await?);
                }
                Rendered::Skipped(reason) => {
                    tracing::warn!(webhook_id = hook.id, reason = %reason, "webhook delivery skipped");
                }
            }
        }
        Ok(queued)
    }

    async fn enqueue(
        &self,
        hook: &Webhook,
        event: &DomainEvent,
        payload: Map<String, Value>,
    ) -> Result<WebhookLogId> {
        let payload = Value::Object(payload);
        let mut headers: BTreeMap<String, String> = hook.headers.clone();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let log = self
            .logs
            .create(WebhookLog {
                id: 0,
                webhook_id: hook.id,
                event: event.kind(),
                endpoint: hook.url.clone(),
                method: hook.method,
                request_body: payload.clone(),
                request_headers: headers,
                response_status: None,
                response_body: None,
                response_headers: BTreeMap::new(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                created_at: Utc::now(),
                completed_at: None,
            })
            .await?;

        let call = WebhookCall {
            log_id: log.id,
            url: hook.url.clone(),
            method: hook.method,
            headers: hook.headers.clone(),
            secret: hook.secret.clone(),
            payload,
        };
        self.queue
            .push(QueuedJob::new(Job::CallWebhook(call)).on_queue(self.queue_name.clone()))
            .await?;
        tracing::debug!(webhook_id = hook.id, log_id = log.id, "webhook delivery queued");
        Ok(log.id)
    }
}

#[async_trait]
impl EventListener for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "WebhookDispatcher"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.dispatch(event).await.map(|_| ())
    }
}
