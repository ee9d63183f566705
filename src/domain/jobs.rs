use super::order::{Order, PaymentBehavior, Price, ProrationBehavior, SubscriptionOptions, User, UserId};
use super::webhook::{HttpMethod, WebhookLogId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_QUEUE: &str = "default";

/// Message contracts for background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    SwapSubscription {
        user: User,
        price: Price,
        proration_behavior: ProrationBehavior,
        payment_behavior: PaymentBehavior,
    },
    SyncGroups {
        user_id: UserId,
    },
    ImportSubscription {
        order: Order,
        options: SubscriptionOptions,
    },
    CheckFingerprintForFraud {
        fingerprint: String,
    },
    ClearPendingOrders,
    RemoveInactiveUsers,
    ReleaseExpiredInventoryReservations,
    CallWebhook(WebhookCall),
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::SwapSubscription { .. } => "SwapSubscription",
            Job::SyncGroups { .. } => "SyncGroups",
            Job::ImportSubscription { .. } => "ImportSubscription",
            Job::CheckFingerprintForFraud { .. } => "CheckFingerprintForFraud",
            Job::ClearPendingOrders => "ClearPendingOrders",
            Job::RemoveInactiveUsers => "RemoveInactiveUsers",
            Job::ReleaseExpiredInventoryReservations => "ReleaseExpiredInventoryReservations",
            Job::CallWebhook(_) => "CallWebhook",
        }
    }
}

/// Everything the webhook caller needs to deliver one payload, tagged with its log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookCall {
    pub log_id: WebhookLogId,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub secret: String,
    pub payload: serde_json::Value,
}

/// A job on its way to a worker, with its queue and owning batch if any.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub queue: String,
    pub job: Job,
    pub batch_id: Option<Uuid>,
    pub cancellation: Option<CancellationToken>,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            job,
            batch_id: None,
            cancellation: None,
        }
    }

    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// A named group of jobs dispatched together and cancelled together.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub jobs: Vec<Job>,
    pub token: CancellationToken,
}

impl Batch {
    pub fn new(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            jobs,
            token: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            id: self.id,
            name: self.name.clone(),
            total_jobs: self.jobs.len(),
            token: self.token.clone(),
        }
    }

    /// Splits the batch into queue messages sharing the batch's cancellation token.
    pub fn into_queued(self) -> Vec<QueuedJob> {
        let Batch { id, jobs, token, .. } = self;
        jobs.into_iter()
            .map(|job| QueuedJob {
                queue: DEFAULT_QUEUE.to_string(),
                job,
                batch_id: Some(id),
                cancellation: Some(token.clone()),
            })
            .collect()
    }
}

/// Caller-side view of a dispatched batch.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub id: Uuid,
    pub name: String,
    pub total_jobs: usize,
    token: CancellationToken,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelling_handle_reaches_every_job() {
        let batch = Batch::new(
            "Sync User Groups (Chunk 1)",
            vec![Job::SyncGroups { user_id: 1 }, Job::SyncGroups { user_id: 2 }],
        );
        let handle = batch.handle();
        let queued = batch.into_queued();
        assert_eq!(handle.total_jobs, 2);
        assert!(queued.iter().all(|q| !q.is_cancelled()));

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(queued.iter().all(QueuedJob::is_cancelled));
        assert!(queued.iter().all(|q| q.batch_id == Some(handle.id)));
    }

    #[test]
    fn test_standalone_job_is_never_cancelled() {
        let job = QueuedJob::new(Job::ClearPendingOrders).on_queue("maintenance");
        assert_eq!(job.queue, "maintenance");
        assert!(!job.is_cancelled());
    }
}
