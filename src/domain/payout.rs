use super::money::Amount;
use super::order::{OrderId, UserId};
use crate::error::PaymentError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PayoutId = u64;
pub type CommissionId = u64;
pub type SellerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn can_process(&self) -> bool {
        matches!(self, PayoutStatus::Pending)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, PayoutStatus::Pending)
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, PayoutStatus::Failed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A disbursement of accumulated commission earnings to a seller.
///
/// `version` is bumped on every write and used by stores as a compare-and-swap
/// token. `claimed_at` is set while a worker holds the payout for processing;
/// a claim older than the service's claim TTL is considered abandoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub seller_id: SellerId,
    pub amount: Amount,
    pub currency: String,
    pub status: PayoutStatus,
    pub failure_reason: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub commission_ids: Vec<CommissionId>,
    pub external_transfer_id: Option<String>,
    pub external_payout_id: Option<String>,
    pub version: u64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payout {
    pub fn new(id: PayoutId, seller_id: SellerId, amount: Amount) -> Self {
        Self {
            id,
            seller_id,
            amount,
            currency: "usd".to_string(),
            status: PayoutStatus::Pending,
            failure_reason: None,
            notes: None,
            created_by: None,
            commission_ids: Vec::new(),
            external_transfer_id: None,
            external_payout_id: None,
            version: 0,
            claimed_at: None,
            processed_at: None,
        }
    }

    fn illegal(&self, action: &'static str) -> PaymentError {
        PaymentError::IllegalPayoutState {
            payout_id: self.id,
            action,
            status: self.status,
        }
    }

    /// Marks the payout as held by the current worker.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), PaymentError> {
        if !self.status.can_process() {
            return Err(self.illegal("process"));
        }
        if self.claimed_at.is_some() {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: self.id,
            });
        }
        self.claimed_at = Some(now);
        Ok(())
    }

    /// True when a claim is held but was taken more than `ttl` ago.
    pub fn claim_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.claimed_at.is_some_and(|at| now - at >= ttl)
    }

    pub fn release_claim(&mut self) {
        self.claimed_at = None;
    }

    pub fn complete(&mut self, transfer_id: String, payout_id: String, now: DateTime<Utc>) {
        self.status = PayoutStatus::Completed;
        self.external_transfer_id = Some(transfer_id);
        self.external_payout_id = Some(payout_id);
        self.failure_reason = None;
        self.claimed_at = None;
        self.processed_at = Some(now);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = PayoutStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.claimed_at = None;
    }

    pub fn cancel(&mut self, reason: Option<&str>) -> Result<(), PaymentError> {
        if !self.status.can_cancel() {
            return Err(self.illegal("cancel"));
        }
        if self.claimed_at.is_some() {
            return Err(PaymentError::Conflict {
                entity: "payout",
                id: self.id,
            });
        }
        if let Some(reason) = reason.filter(|r| !r.trim().is_empty()) {
            let line = format!("Cancelled: {}", reason.trim());
            self.notes = Some(match self.notes.take() {
                Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
                _ => line,
            });
        }
        self.status = PayoutStatus::Cancelled;
        self.claimed_at = None;
        Ok(())
    }

    /// Puts a failed payout back into the queue of processable payouts.
    pub fn reset_for_retry(&mut self) -> Result<(), PaymentError> {
        if !self.status.can_retry() {
            return Err(self.illegal("retry"));
        }
        self.status = PayoutStatus::Pending;
        self.failure_reason = None;
        self.created_by = None;
        self.claimed_at = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

/// The seller's share of an order. Referenced by a payout, never owned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub amount: Amount,
    pub status: CommissionStatus,
    pub payout_id: Option<PayoutId>,
}

/// Funds moved from the platform balance to a seller's connected account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub seller_id: SellerId,
    pub amount: Amount,
}

/// The payout request as acknowledged by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorPayout {
    pub id: String,
    pub status: String,
}
