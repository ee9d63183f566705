use crate::domain::events::DomainEvent;
use crate::domain::jobs::{Job, QueuedJob};
use crate::domain::ports::{EventPublisher, JobQueueRef};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reacts to domain events after they are published.
#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Publishes each event to every registered listener in registration order.
///
/// A failing listener is logged and does not stop the others or the publisher.
#[derive(Default, Clone)]
pub struct EventBus {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let kind = event.kind();
        tracing::debug!(event = %kind, listeners = self.listeners.len(), "publishing event");
        for listener in &self.listeners {
            if let Err(e) = listener.handle(&event).await {
                tracing::error!(
                    event = %kind,
                    listener = listener.name(),
                    error = %e,
                    "event listener failed"
                );
            }
        }
        Ok(())
    }
}

/// Queues a group re-sync for the owner of a created, updated or deleted subscription.
pub struct GroupSyncListener {
    queue: JobQueueRef,
}

impl GroupSyncListener {
    pub fn new(queue: JobQueueRef) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl EventListener for GroupSyncListener {
    fn name(&self) -> &'static str {
        "GroupSyncListener"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if let Some(user_id) = event.subscription_owner() {
            self.queue
                .push(QueuedJob::new(Job::SyncGroups { user_id }))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, Subscription};
    use crate::error::PaymentError;
    use crate::infrastructure::in_memory::InMemoryJobQueue;
    use tokio::sync::Mutex;

    struct Failing;

    #[async_trait]
    impl EventListener for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            Err(PaymentError::GatewayError("down".to_string()))
        }
    }

    #[derive(Default)]
    struct Counting(Mutex<usize>);

    #[async_trait]
    impl EventListener for Counting {
        fn name(&self) -> &'static str {
            "Counting"
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            *self.0.lock().await += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let counting = Arc::new(Counting::default());
        let bus = EventBus::new()
            .with_listener(Arc::new(Failing))
            .with_listener(counting.clone());

        bus.publish(DomainEvent::OrderCreated {
            order: Order::new(1, 1),
        })
        .await
        .unwrap();

        assert_eq!(*counting.0.lock().await, 1);
    }

    #[tokio::test]
    async fn test_subscription_events_queue_group_sync() {
        let queue = InMemoryJobQueue::new();
        let bus = EventBus::new().with_listener(Arc::new(GroupSyncListener::new(Arc::new(
            queue.clone(),
        ))));

        bus.publish(DomainEvent::SubscriptionCreated {
            subscription: Subscription {
                external_id: "sub_1".to_string(),
                user_id: 8,
                price_id: 1,
                status: "active".to_string(),
            },
        })
        .await
        .unwrap();
        bus.publish(DomainEvent::OrderCreated {
            order: Order::new(1, 8),
        })
        .await
        .unwrap();

        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job, Job::SyncGroups { user_id: 8 });
    }
}
