use super::caller::CallOutcome;
use crate::domain::ports::WebhookLogStoreRef;
use crate::domain::webhook::DeliveryStatus;
use crate::error::{PaymentError, Result};
use chrono::Utc;

/// Writes call outcomes back onto their log rows.
pub struct WebhookLogRecorder {
    logs: WebhookLogStoreRef,
}

impl WebhookLogRecorder {
    pub fn new(logs: WebhookLogStoreRef) -> Self {
        Self { logs }
    }

    pub async fn record(&self, outcome: CallOutcome) -> Result<()> {
        let id = outcome.log_id();
        let mut log = self.logs.get(id).await?.ok_or(PaymentError::NotFound {
            entity: "webhook log",
            id,
        })?;

        match outcome {
            CallOutcome::Succeeded {
                attempts, response, ..
            } => {
                log.status = DeliveryStatus::Succeeded;
                log.attempts = attempts;
                log.response_status = Some(response.status);
                log.response_body = Some(response.body);
                log.response_headers = response.headers;
            }
            CallOutcome::FailedPermanently {
                attempts,
                response,
                error,
                ..
            } => {
                tracing::warn!(log_id = id, attempts, error = %error, "webhook delivery failed permanently");
                log.status = DeliveryStatus::Failed;
                log.attempts = attempts;
                match response {
                    Some(response) => {
                        log.response_status = Some(response.status);
                        log.response_body = Some(response.body);
                        log.response_headers = response.headers;
                    }
                    None => log.response_body = Some(error),
                }
            }
        }
        log.completed_at = Some(Utc::now());
        self.logs.update(log).await
    }
}
