use crate::domain::events::DomainEvent;
use crate::domain::money::Amount;
use crate::domain::order::UserId;
use crate::domain::payout::{
    CommissionId, CommissionStatus, Payout, PayoutId, PayoutStatus, ProcessorPayout, SellerId,
    Transfer,
};
use crate::domain::ports::{CommissionStoreRef, EventPublisherRef, PayoutGatewayRef, PayoutStoreRef};
use crate::error::{PaymentError, Result};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

pub const TRANSFER_RETURNED_NOTHING: &str = "Driver returned null - transfer creation failed";
pub const PAYOUT_RETURNED_NOTHING: &str = "Driver returned null - payout creation failed";

/// How long a processing claim is honoured before another caller may take it over.
pub const DEFAULT_CLAIM_TTL: Duration = Duration::minutes(15);

/// Counts from a sweep over pending payouts.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Drives payouts through `Pending -> Completed | Failed | Cancelled`.
///
/// Processing is two-phase: a transfer from the platform balance to the seller,
/// and only after it succeeds, the payout request itself. Driver failures are
/// recorded on the payout and never escape `process`; precondition violations
/// do. A payout stays claimed while it is processed and cannot be cancelled
/// until the claim is released or expires.
pub struct PayoutService {
    gateway: PayoutGatewayRef,
    payouts: PayoutStoreRef,
    commissions: CommissionStoreRef,
    events: EventPublisherRef,
    claim_ttl: Duration,
}

impl PayoutService {
    pub fn new(
        gateway: PayoutGatewayRef,
        payouts: PayoutStoreRef,
        commissions: CommissionStoreRef,
        events: EventPublisherRef,
    ) -> Self {
        Self {
            gateway,
            payouts,
            commissions,
            events,
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }

    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    async fn load(&self, id: PayoutId) -> Result<Payout> {
        self.payouts.get(id).await?.ok_or(PaymentError::NotFound {
            entity: "payout",
            id,
        })
    }

    /// Loads a payout, dropping a claim left behind by a caller that never
    /// recorded an outcome.
    async fn load_unclaimed(&self, id: PayoutId) -> Result<Payout> {
        let mut payout = self.load(id).await?;
        if payout.claim_expired(Utc::now(), self.claim_ttl) {
            tracing::warn!(
                payout_id = id,
                claimed_at = ?payout.claimed_at,
                "releasing expired payout claim"
            );
            payout.release_claim();
        }
        Ok(payout)
    }

    async fn emit(&self, event: DomainEvent) {
        let kind = event.kind();
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(event = %kind, error = %e, "failed to publish payout event");
        }
    }

    /// Creates a pending payout for a seller's unpaid commissions.
    #[tracing::instrument(skip(self, commission_ids))]
    pub async fn create(
        &self,
        seller_id: SellerId,
        commission_ids: &[CommissionId],
        created_by: Option<UserId>,
    ) -> Result<Payout> {
        if commission_ids.is_empty() {
            return Err(PaymentError::ValidationError(
                "A payout needs at least one commission".to_string(),
            ));
        }

        let mut commissions = Vec::with_capacity(commission_ids.len());
        for id in commission_ids {
            let commission = self
                .commissions
                .get(*id)
                .await?
                .ok_or(PaymentError::NotFound {
                    entity: "commission",
                    id: *id,
                })?;
            if commission.seller_id != seller_id
                || commission.status != CommissionStatus::Pending
                || commission.payout_id.is_some()
            {
                return Err(PaymentError::ValidationError(format!(
                    "Commission {id} is not an unpaid commission of seller {seller_id}"
                )));
            }
            commissions.push(commission);
        }

        let total: Decimal = commissions.iter().map(|c| c.amount.value()).sum();
        let mut payout = Payout::new(0, seller_id, Amount::new(total)?);
        payout.created_by = created_by;
        payout.commission_ids = commission_ids.to_vec();
        let payout = self.payouts.insert(payout).await?;

        for mut commission in commissions {
            commission.payout_id = Some(payout.id);
            self.commissions.store(commission).await?;
        }

        tracing::info!(payout_id = payout.id, amount = %payout.amount, "payout created");
        self.emit(DomainEvent::PayoutCreated {
            payout: payout.clone(),
        })
        .await;
        Ok(payout)
    }

    async fn execute(
        &self,
        payout: &mut Payout,
    ) -> std::result::Result<(Transfer, ProcessorPayout), String> {
        let transfer = match self
            .gateway
            .create_transfer(payout.seller_id, payout.amount)
            .await
        {
            Ok(Some(transfer)) => transfer,
            Ok(None) => return Err(TRANSFER_RETURNED_NOTHING.to_string()),
            Err(e) => return Err(driver_message(e)),
        };
        // Recorded even if the second phase fails so the transfer can be reconciled.
        payout.external_transfer_id = Some(transfer.id.clone());

        match self.gateway.create_payout(payout).await {
            Ok(Some(remote)) => Ok((transfer, remote)),
            Ok(None) => Err(PAYOUT_RETURNED_NOTHING.to_string()),
            Err(e) => Err(driver_message(e)),
        }
    }

    /// Processes a pending payout. Returns the payout in its final state.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, id: PayoutId) -> Result<Payout> {
        let mut payout = self.load_unclaimed(id).await?;
        payout.claim(Utc::now())?;
        let mut payout = self.payouts.update(payout).await?;

        match self.execute(&mut payout).await {
            Ok((transfer, remote)) => {
                payout.complete(transfer.id, remote.id, Utc::now());
                let payout = self.record_outcome(payout).await?;
                if let Err(e) = self.mark_commissions_paid(&payout).await {
                    tracing::error!(payout_id = payout.id, error = %e, "commissions not marked paid");
                }
                tracing::info!(payout_id = payout.id, "payout completed");
                self.emit(DomainEvent::PayoutProcessed {
                    payout: payout.clone(),
                })
                .await;
                Ok(payout)
            }
            Err(reason) => {
                payout.fail(reason.clone());
                let payout = self.record_outcome(payout).await?;
                tracing::warn!(payout_id = payout.id, reason = %reason, "payout failed");
                self.emit(DomainEvent::PayoutFailed {
                    payout: payout.clone(),
                    reason,
                })
                .await;
                Ok(payout)
            }
        }
    }

    /// Persists the result of the remote calls. On failure the stored payout
    /// keeps its claim until it expires.
    async fn record_outcome(&self, payout: Payout) -> Result<Payout> {
        let (id, status) = (payout.id, payout.status);
        let transfer_id = payout.external_transfer_id.clone();
        self.payouts.update(payout).await.inspect_err(|e| {
            tracing::error!(
                payout_id = id,
                status = %status,
                transfer_id = ?transfer_id,
                error = %e,
                "payout outcome not persisted, reconcile with the processor"
            );
        })
    }

    async fn mark_commissions_paid(&self, payout: &Payout) -> Result<()> {
        for mut commission in self.commissions.for_payout(payout.id).await? {
            commission.status = CommissionStatus::Paid;
            self.commissions.store(commission).await?;
        }
        Ok(())
    }

    /// Processes every pending payout. One payout failing never stops the sweep.
    pub async fn process_pending(&self) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();
        for payout in self.payouts.by_status(PayoutStatus::Pending).await? {
            match self.process(payout.id).await {
                Ok(p) if p.status == PayoutStatus::Completed => summary.completed += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    tracing::warn!(payout_id = payout.id, error = %e, "payout skipped");
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: PayoutId, reason: Option<&str>) -> Result<Payout> {
        let mut payout = self.load_unclaimed(id).await?;
        payout.cancel(reason)?;
        let payout = self.payouts.update(payout).await?;
        tracing::info!(payout_id = payout.id, "payout cancelled");
        self.emit(DomainEvent::PayoutCancelled {
            payout: payout.clone(),
            reason: reason.map(str::to_string),
        })
        .await;
        Ok(payout)
    }

    /// Resets a failed payout to pending and processes it again right away.
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, id: PayoutId) -> Result<Payout> {
        let mut payout = self.load(id).await?;
        payout.reset_for_retry()?;
        self.payouts.update(payout).await?;
        self.process(id).await
    }
}

fn driver_message(e: PaymentError) -> String {
    match e {
        PaymentError::GatewayError(message) => message,
        other => other.to_string(),
    }
}
