use crate::domain::events::DomainEvent;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::{EventPublisherRef, OrderStoreRef, PaymentGatewayRef};
use crate::error::{PaymentError, Result};

/// Direct order transitions: placement, payment confirmation, cancel and refund.
///
/// These are single-row updates; unlike payout processing there is no claim step.
pub struct OrderService {
    gateway: PaymentGatewayRef,
    orders: OrderStoreRef,
    events: EventPublisherRef,
}

impl OrderService {
    pub fn new(gateway: PaymentGatewayRef, orders: OrderStoreRef, events: EventPublisherRef) -> Self {
        Self {
            gateway,
            orders,
            events,
        }
    }

    async fn load(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(id)
            .await?
            .ok_or(PaymentError::NotFound { entity: "order", id })
    }

    fn illegal(order: &Order, action: &'static str) -> PaymentError {
        PaymentError::IllegalOrderState {
            order_id: order.id,
            action,
            status: order.status.to_string(),
        }
    }

    pub async fn place(&self, order: Order) -> Result<Order> {
        if order.items.is_empty() {
            return Err(PaymentError::ValidationError(format!(
                "Order {} has no items",
                order.id
            )));
        }
        self.orders.store(order.clone()).await?;
        self.events
            .publish(DomainEvent::OrderCreated {
                order: order.clone(),
            })
            .await?;
        Ok(order)
    }

    /// Confirms payment against the processor's invoice and marks the order paid.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, id: OrderId, invoice_id: &str) -> Result<Order> {
        let mut order = self.load(id).await?;
        if order.status == OrderStatus::Succeeded {
            return Ok(order);
        }
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Processing) {
            return Err(Self::illegal(&order, "confirm payment for"));
        }
        let invoice = self
            .gateway
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| PaymentError::GatewayError(format!("Invoice {invoice_id} not found")))?;
        if invoice.status != "paid" {
            return Err(PaymentError::GatewayError(format!(
                "Invoice {invoice_id} is {}",
                invoice.status
            )));
        }

        order.status = OrderStatus::Succeeded;
        order.external_invoice_id = Some(invoice.external_id.clone());
        order.external_customer_id.get_or_insert(invoice.customer_id);
        self.orders.store(order.clone()).await?;
        self.events
            .publish(DomainEvent::PaymentSucceeded {
                order: order.clone(),
                invoice_id: Some(invoice.external_id),
            })
            .await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId) -> Result<Order> {
        let mut order = self.load(id).await?;
        if !order.status.can_cancel() {
            return Err(Self::illegal(&order, "cancel"));
        }
        self.gateway.cancel_order(&order).await?;
        order.status = OrderStatus::Cancelled;
        self.orders.store(order.clone()).await?;
        tracing::info!(order_id = order.id, "order cancelled");
        self.events
            .publish(DomainEvent::OrderCancelled {
                order: order.clone(),
            })
            .await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn refund(
        &self,
        id: OrderId,
        reason: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Order> {
        let mut order = self.load(id).await?;
        if !order.status.can_refund() {
            return Err(Self::illegal(&order, "refund"));
        }
        self.gateway.refund_order(&order, reason, notes).await?;
        order.status = OrderStatus::Refunded;
        self.orders.store(order.clone()).await?;
        tracing::info!(order_id = order.id, "order refunded");
        self.events
            .publish(DomainEvent::OrderRefunded {
                order: order.clone(),
                reason: reason.map(str::to_string),
            })
            .await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DomainEventKind;
    use crate::domain::money::Balance;
    use crate::domain::order::Invoice;
    use crate::domain::ports::OrderStore;
    use crate::infrastructure::in_memory::{InMemoryOrderStore, RecordingPublisher};
    use crate::infrastructure::sandbox::SandboxProcessor;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn service() -> (SandboxProcessor, InMemoryOrderStore, RecordingPublisher, OrderService) {
        let sandbox = SandboxProcessor::new(Balance::ZERO);
        let orders = InMemoryOrderStore::new();
        let events = RecordingPublisher::new();
        let service = OrderService::new(
            Arc::new(sandbox.clone()),
            Arc::new(orders.clone()),
            Arc::new(events.clone()),
        );
        (sandbox, orders, events, service)
    }

    #[tokio::test]
    async fn test_cancel_pending_order() {
        let (sandbox, _orders, events, service) = service();
        service.place(Order::new(1, 5).with_item(10, 1)).await.unwrap();

        let order = service.cancel(1).await.unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(sandbox.cancelled_orders().await, vec![1]);
        assert_eq!(
            events.kinds().await,
            vec![DomainEventKind::OrderCreated, DomainEventKind::OrderCancelled]
        );
    }

    #[tokio::test]
    async fn test_refund_requires_succeeded() {
        let (sandbox, orders, _events, service) = service();
        orders.store(Order::new(1, 5).with_item(10, 1)).await.unwrap();

        let err = service.refund(1, Some("requested"), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::IllegalOrderState { .. }));

        sandbox
            .add_invoice(Invoice {
                external_id: "in_1".to_string(),
                customer_id: "cus_1".to_string(),
                amount_paid: dec!(1500),
                status: "paid".to_string(),
            })
            .await;
        service.confirm_payment(1, "in_1").await.unwrap();
        let order = service.refund(1, Some("requested"), None).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(sandbox.refunded_orders().await, vec![1]);
    }

    #[tokio::test]
    async fn test_confirm_payment_with_unknown_invoice_fails() {
        let (_sandbox, orders, events, service) = service();
        orders.store(Order::new(1, 5).with_item(10, 1)).await.unwrap();

        assert!(service.confirm_payment(1, "in_missing").await.is_err());
        assert!(events.events().await.is_empty());
    }
}
