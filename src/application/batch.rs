use crate::domain::jobs::{Batch, BatchHandle, Job};
use crate::domain::order::{PaymentBehavior, Price, ProrationBehavior, User, UserId};
use crate::domain::ports::JobQueueRef;
use crate::error::{PaymentError, Result};

pub const SWAP_SUBSCRIPTIONS_BATCH: &str = "Swap User Subscriptions";
pub const DEFAULT_GROUP_SYNC_CHUNK_SIZE: usize = 1000;

pub fn group_sync_batch_name(chunk: usize) -> String {
    format!("Sync User Groups (Chunk {chunk})")
}

/// Fans a per-user operation out into batches of independent jobs.
pub struct BatchOrchestrator {
    queue: JobQueueRef,
    chunk_size: usize,
}

impl BatchOrchestrator {
    pub fn new(queue: JobQueueRef) -> Self {
        Self {
            queue,
            chunk_size: DEFAULT_GROUP_SYNC_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Moves every given user onto `price` in a single batch.
    #[tracing::instrument(skip_all, fields(users = users.len(), price_id = price.id))]
    pub async fn swap_subscriptions(
        &self,
        users: Vec<User>,
        price: &Price,
        proration_behavior: ProrationBehavior,
        payment_behavior: PaymentBehavior,
    ) -> Result<BatchHandle> {
        let jobs = users
            .into_iter()
            .map(|user| Job::SwapSubscription {
                user,
                price: price.clone(),
                proration_behavior,
                payment_behavior,
            })
            .collect();
        let handle = self
            .queue
            .dispatch_batch(Batch::new(SWAP_SUBSCRIPTIONS_BATCH, jobs))
            .await?;
        tracing::info!(batch_id = %handle.id, jobs = handle.total_jobs, "dispatched subscription swaps");
        Ok(handle)
    }

    /// Re-syncs group memberships using the configured chunk size.
    pub async fn sync_groups(&self, user_ids: &[UserId]) -> Result<Vec<BatchHandle>> {
        self.sync_groups_chunked(user_ids, self.chunk_size).await
    }

    /// Dispatches one batch per chunk of `chunk_size` users, numbered from 1.
    #[tracing::instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    pub async fn sync_groups_chunked(
        &self,
        user_ids: &[UserId],
        chunk_size: usize,
    ) -> Result<Vec<BatchHandle>> {
        if chunk_size == 0 {
            return Err(PaymentError::ValidationError(
                "Chunk size must be at least 1".to_string(),
            ));
        }

        let mut handles = Vec::with_capacity(user_ids.len().div_ceil(chunk_size));
        for (index, chunk) in user_ids.chunks(chunk_size).enumerate() {
            let jobs = chunk
                .iter()
                .map(|&user_id| Job::SyncGroups { user_id })
                .collect();
            let handle = self
                .queue
                .dispatch_batch(Batch::new(group_sync_batch_name(index + 1), jobs))
                .await?;
            tracing::debug!(batch = %handle.name, jobs = handle.total_jobs, "dispatched group sync chunk");
            handles.push(handle);
        }
        Ok(handles)
    }
}
