use crate::domain::jobs::WebhookCall;
use crate::domain::ports::WebhookTransportRef;
use crate::domain::webhook::{SignedRequest, TransportResponse, WebhookLogId};
use crate::error::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Signature";

/// Upper bound on the wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Hex-encoded HMAC-SHA256 of `body` keyed with the webhook secret.
pub fn sign(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// What became of a webhook call after all attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Succeeded {
        log_id: WebhookLogId,
        attempts: u32,
        response: TransportResponse,
    },
    FailedPermanently {
        log_id: WebhookLogId,
        attempts: u32,
        response: Option<TransportResponse>,
        error: String,
    },
}

impl CallOutcome {
    pub fn log_id(&self) -> WebhookLogId {
        match self {
            CallOutcome::Succeeded { log_id, .. } | CallOutcome::FailedPermanently { log_id, .. } => {
                *log_id
            }
        }
    }
}

/// Delivers signed webhook payloads, retrying with exponential backoff.
pub struct WebhookCaller {
    transport: WebhookTransportRef,
    tries: u32,
    backoff: Duration,
}

impl WebhookCaller {
    pub fn new(transport: WebhookTransportRef, tries: u32, backoff: Duration) -> Self {
        Self {
            transport,
            tries: tries.max(1),
            backoff,
        }
    }

    /// Wait after the given failed attempt: `backoff * 2^(attempt - 1)`, capped
    /// at `MAX_BACKOFF`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.backoff.checked_mul(factor))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    pub fn build_request(call: &WebhookCall) -> Result<SignedRequest> {
        let body = serde_json::to_string(&call.payload)?;
        let mut headers = call.headers.clone();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert(SIGNATURE_HEADER.to_string(), sign(&call.secret, &body));
        Ok(SignedRequest {
            url: call.url.clone(),
            method: call.method,
            headers,
            body,
        })
    }

    #[tracing::instrument(skip(self, call), fields(log_id = call.log_id, url = %call.url))]
    pub async fn call(&self, call: &WebhookCall) -> Result<CallOutcome> {
        let request = Self::build_request(call)?;
        let mut last_response = None;
        let mut last_error = String::new();

        for attempt in 1..=self.tries {
            match self.transport.send(&request).await {
                Ok(response) if response.is_success() => {
                    tracing::info!(attempt, status = response.status, "webhook delivered");
                    return Ok(CallOutcome::Succeeded {
                        log_id: call.log_id,
                        attempts: attempt,
                        response,
                    });
                }
                Ok(response) => {
                    last_error = format!("endpoint responded with status {}", response.status);
                    last_response = Some(response);
                }
                Err(e) => {
                    last_error = e.to_string();
                    last_response = None;
                }
            }
            tracing::warn!(attempt, error = %last_error, "webhook attempt failed");

            if attempt < self.tries {
                tokio::time::sleep(self.delay_after(attempt)).await;
            }
        }

        Ok(CallOutcome::FailedPermanently {
            log_id: call.log_id,
            attempts: self.tries,
            response: last_response,
            error: last_error,
        })
    }
}
