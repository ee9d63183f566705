mod common;

use common::{World, expression_webhook};
use payflow::application::payouts::PAYOUT_RETURNED_NOTHING;
use payflow::domain::events::DomainEventKind;
use payflow::domain::payout::{CommissionStatus, PayoutStatus};
use payflow::domain::money::Balance;
use payflow::domain::ports::{CommissionStore, PayoutGateway, WebhookStore};
use payflow::domain::webhook::DeliveryStatus;
use payflow::infrastructure::sandbox::Fault;
use payflow::webhooks::caller::{SIGNATURE_HEADER, sign};
use payflow::webhooks::dispatcher::WEBHOOK_QUEUE;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_processed_payout_is_delivered_to_webhook() {
    let world = World::new(dec!(10000));
    world
        .webhooks
        .store(expression_webhook(
            1,
            &[DomainEventKind::PayoutProcessed],
            json!({
                "payout": "{{ event.payout.id }}",
                "status": "{{ event.payout.status }}",
                "type": "{{ event.type }}"
            }),
        ))
        .await
        .unwrap();
    let service = world.payout_service();
    let ids = world.seed_commissions(42, &[dec!(3000), dec!(2000)]).await;

    let payout = service.create(42, &ids, Some(1)).await.unwrap();
    assert_eq!(payout.amount.value(), dec!(5000));
    let payout = service.process(payout.id).await.unwrap();

    assert_eq!(payout.status, PayoutStatus::Completed);
    for id in &ids {
        let commission = world.commissions.get(*id).await.unwrap().unwrap();
        assert_eq!(commission.status, CommissionStatus::Paid);
    }

    let report = world.worker().on_queue(WEBHOOK_QUEUE).run_until_idle().await;
    assert_eq!(report.completed, 1);

    let requests = world.transport.requests().await;
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(
        body,
        json!({ "payout": payout.id, "status": "completed", "type": "payout.processed" })
    );
    assert_eq!(
        requests[0].headers[SIGNATURE_HEADER],
        sign("secret-1", &requests[0].body)
    );

    let log = world.logs.all().await.remove(0);
    assert_eq!(log.status, DeliveryStatus::Succeeded);
    assert_eq!(log.response_status, Some(200));
    assert_eq!(log.attempts, 1);
    assert!(log.completed_at.is_some());
}

#[tokio::test]
async fn test_failed_payout_retried_after_driver_recovers() {
    let world = World::new(dec!(10000));
    world
        .webhooks
        .store(expression_webhook(
            7,
            &[DomainEventKind::PayoutFailed],
            json!({ "reason": "{{ event.reason }}" }),
        ))
        .await
        .unwrap();
    let service = world.payout_service();
    let ids = world.seed_commissions(42, &[dec!(5000)]).await;
    let payout = service.create(42, &ids, None).await.unwrap();

    world.processor.set_payout_fault(Fault::ReturnNothing).await;
    let failed = service.process(payout.id).await.unwrap();
    assert_eq!(failed.status, PayoutStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some(PAYOUT_RETURNED_NOTHING));

    world.processor.set_payout_fault(Fault::None).await;
    let retried = service.retry(payout.id).await.unwrap();
    assert_eq!(retried.status, PayoutStatus::Completed);
    assert!(retried.failure_reason.is_none());

    world.worker().run_until_idle().await;
    let log = world.logs.all().await.remove(0);
    assert_eq!(log.request_body, json!({ "reason": PAYOUT_RETURNED_NOTHING }));
    assert_eq!(log.status, DeliveryStatus::Succeeded);
}

#[tokio::test]
async fn test_webhook_endpoint_down_is_logged_as_failed() {
    let world = World::new(dec!(10000));
    world
        .webhooks
        .store(expression_webhook(
            2,
            &[DomainEventKind::PayoutCancelled],
            json!({ "id": "{{ event.payout.id }}" }),
        ))
        .await
        .unwrap();
    for _ in 0..3 {
        world.transport.respond_with(503).await;
    }
    let service = world.payout_service();
    let ids = world.seed_commissions(9, &[dec!(10)]).await;
    let payout = service.create(9, &ids, None).await.unwrap();
    service.cancel(payout.id, Some("seller closed")).await.unwrap();

    world.worker().run_until_idle().await;

    assert_eq!(world.transport.requests().await.len(), 3);
    let log = world.logs.all().await.remove(0);
    assert_eq!(log.status, DeliveryStatus::Failed);
    assert_eq!(log.attempts, 3);
    assert_eq!(log.response_status, Some(503));
}

#[tokio::test]
async fn test_concurrent_processing_pays_out_once() {
    let world = World::new(dec!(10000));
    let service = Arc::new(world.payout_service());
    let ids = world.seed_commissions(5, &[dec!(100)]).await;
    let payout = service.create(5, &ids, None).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.process(payout.id).await })
        })
        .collect();
    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(world.processor.transfers().await.len(), 1);
    assert_eq!(world.processor.payouts().await.len(), 1);
}

#[tokio::test]
async fn test_sweep_stops_paying_when_balance_runs_out() {
    let world = World::new(dec!(150));
    let service = world.payout_service();
    for seller in [1, 2, 3] {
        let ids = world.seed_commissions(seller, &[dec!(60)]).await;
        service.create(seller, &ids, None).await.unwrap();
    }

    let summary = service.process_pending().await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        world.processor.platform_balance().await.unwrap(),
        Balance::new(dec!(30))
    );
}
