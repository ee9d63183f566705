use super::orders::OrderService;
use super::pipeline::ImportPipeline;
use crate::domain::events::DomainEvent;
use crate::domain::jobs::{Job, QueuedJob, WebhookCall};
use crate::domain::order::{
    Order, PaymentBehavior, Price, ProrationBehavior, SubscriptionOptions, User,
};
use crate::domain::ports::{
    CatalogStoreRef, EventPublisherRef, FraudScreenRef, GroupSynchronizerRef, OrderStoreRef,
    PaymentGatewayRef, ReservationStoreRef, UserStoreRef,
};
use crate::error::Result;
use crate::webhooks::caller::WebhookCaller;
use crate::webhooks::recorder::WebhookLogRecorder;
use chrono::Utc;
use std::sync::Arc;

/// Collaborators a job body may need.
pub struct JobContext {
    pub gateway: PaymentGatewayRef,
    pub users: UserStoreRef,
    pub catalog: CatalogStoreRef,
    pub orders: OrderStoreRef,
    pub reservations: ReservationStoreRef,
    pub groups: GroupSynchronizerRef,
    pub fraud: FraudScreenRef,
    pub events: EventPublisherRef,
    pub webhook_caller: Arc<WebhookCaller>,
    pub webhook_recorder: Arc<WebhookLogRecorder>,
    pub pending_order_ttl: chrono::Duration,
    pub inactive_user_ttl: chrono::Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// The owning batch was cancelled before the job started.
    Cancelled,
    /// The job failed in a way that is logged and not retried.
    Abandoned(String),
}

/// Executes queued jobs against the application's ports.
pub struct JobRunner {
    ctx: JobContext,
    pipeline: ImportPipeline,
}

impl JobRunner {
    pub fn new(ctx: JobContext) -> Self {
        let pipeline =
            ImportPipeline::new(ctx.gateway.clone(), ctx.users.clone(), ctx.catalog.clone());
        Self { ctx, pipeline }
    }

    pub fn with_pipeline(mut self, pipeline: ImportPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    #[tracing::instrument(skip_all, fields(job = job.job.name(), queue = %job.queue, batch_id = ?job.batch_id))]
    pub async fn run(&self, job: QueuedJob) -> Result<JobOutcome> {
        if job.is_cancelled() {
            tracing::info!("batch cancelled, skipping job");
            return Ok(JobOutcome::Cancelled);
        }

        match job.job {
            Job::SwapSubscription {
                user,
                price,
                proration_behavior,
                payment_behavior,
            } => {
                self.swap_subscription(&user, &price, proration_behavior, payment_behavior)
                    .await
            }
            Job::SyncGroups { user_id } => {
                self.ctx.groups.sync_groups(user_id).await?;
                Ok(JobOutcome::Completed)
            }
            Job::ImportSubscription { order, options } => {
                self.import_subscription(order, &options).await
            }
            Job::CheckFingerprintForFraud { fingerprint } => {
                self.check_fingerprint(&fingerprint).await
            }
            Job::ClearPendingOrders => self.clear_pending_orders().await,
            Job::RemoveInactiveUsers => self.remove_inactive_users().await,
            Job::ReleaseExpiredInventoryReservations => self.release_reservations().await,
            Job::CallWebhook(call) => self.call_webhook(&call).await,
        }
    }

    async fn swap_subscription(
        &self,
        user: &User,
        price: &Price,
        proration_behavior: ProrationBehavior,
        payment_behavior: PaymentBehavior,
    ) -> Result<JobOutcome> {
        let subscription = self
            .ctx
            .gateway
            .swap_subscription(user, price, proration_behavior, payment_behavior)
            .await?;
        tracing::info!(user_id = user.id, price_id = price.id, "subscription swapped");
        self.ctx
            .events
            .publish(DomainEvent::SubscriptionUpdated { subscription })
            .await?;
        Ok(JobOutcome::Completed)
    }

    async fn import_subscription(
        &self,
        order: Order,
        options: &SubscriptionOptions,
    ) -> Result<JobOutcome> {
        let (order_id, user_id) = (order.id, order.user_id);

        let linked = match self.pipeline.run(order).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(user_id, order_id, error = %e, "subscription import failed");
                return Ok(JobOutcome::Abandoned(e.to_string()));
            }
        };
        self.ctx.orders.store(linked.clone()).await?;

        match self.ctx.gateway.start_subscription(&linked, options).await {
            Ok(subscription) => {
                tracing::info!(user_id, order_id, subscription = %subscription.external_id, "subscription imported");
                self.ctx
                    .events
                    .publish(DomainEvent::SubscriptionCreated { subscription })
                    .await?;
                Ok(JobOutcome::Completed)
            }
            Err(e) => {
                tracing::error!(user_id, order_id, error = %e, "subscription import failed");
                Ok(JobOutcome::Abandoned(e.to_string()))
            }
        }
    }

    async fn check_fingerprint(&self, fingerprint: &str) -> Result<JobOutcome> {
        if self.ctx.fraud.is_flagged(fingerprint).await? {
            self.ctx.fraud.block(fingerprint).await?;
            tracing::warn!(fingerprint, "fingerprint flagged for fraud and blocked");
        } else {
            tracing::debug!(fingerprint, "fingerprint clean");
        }
        Ok(JobOutcome::Completed)
    }

    /// Cancels stale pending orders through the regular cancel path, so the
    /// processor side is cancelled too. One order failing never stops the sweep.
    async fn clear_pending_orders(&self) -> Result<JobOutcome> {
        let cutoff = Utc::now() - self.ctx.pending_order_ttl;
        let orders = OrderService::new(
            self.ctx.gateway.clone(),
            self.ctx.orders.clone(),
            self.ctx.events.clone(),
        );
        let mut cleared = 0usize;

        for order in self.ctx.orders.pending_before(cutoff).await? {
            match orders.cancel(order.id).await {
                Ok(_) => cleared += 1,
                Err(e) => {
                    tracing::warn!(order_id = order.id, error = %e, "stale order not cancelled")
                }
            }
        }
        tracing::info!(cleared, "pending orders cleared");
        Ok(JobOutcome::Completed)
    }

    async fn remove_inactive_users(&self) -> Result<JobOutcome> {
        let cutoff = Utc::now() - self.ctx.inactive_user_ttl;
        let mut removed = 0usize;

        for user in self.ctx.users.all().await? {
            if user.last_seen_at >= cutoff {
                continue;
            }
            if !self.ctx.orders.for_user(user.id).await?.is_empty() {
                continue;
            }
            if let Some(user) = self.ctx.users.delete(user.id).await? {
                removed += 1;
                self.ctx
                    .events
                    .publish(DomainEvent::UserDeleted { user })
                    .await?;
            }
        }
        tracing::info!(removed, "inactive users removed");
        Ok(JobOutcome::Completed)
    }

    async fn release_reservations(&self) -> Result<JobOutcome> {
        let expired = self.ctx.reservations.expired(Utc::now()).await?;
        let released = expired.len();
        for reservation in expired {
            self.ctx.reservations.release(reservation.id).await?;
        }
        tracing::info!(released, "expired inventory reservations released");
        Ok(JobOutcome::Completed)
    }

    async fn call_webhook(&self, call: &WebhookCall) -> Result<JobOutcome> {
        let outcome = self.ctx.webhook_caller.call(call).await?;
        self.ctx.webhook_recorder.record(outcome).await?;
        Ok(JobOutcome::Completed)
    }
}
