use super::events::DomainEventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type WebhookId = u64;
pub type WebhookLogId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The template language a webhook payload is authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderEngine {
    /// `payload_json` is a JSON document whose `{{ path }}` leaves are evaluated.
    Expression,
    /// `payload_text` is a text template rendered and then parsed as JSON.
    TemplateString,
}

/// A user-configured endpoint subscribed to a set of domain events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub secret: String,
    pub events: Vec<DomainEventKind>,
    pub render: RenderEngine,
    pub payload_json: Option<serde_json::Value>,
    pub payload_text: Option<String>,
    pub enabled: bool,
}

impl Webhook {
    pub fn subscribes_to(&self, kind: DomainEventKind) -> bool {
        self.enabled && self.events.contains(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One delivery of one event to one webhook, request and response side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: WebhookLogId,
    pub webhook_id: WebhookId,
    pub event: DomainEventKind,
    pub endpoint: String,
    pub method: HttpMethod,
    pub request_body: serde_json::Value,
    pub request_headers: BTreeMap<String, String>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_headers: BTreeMap<String, String>,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A fully rendered and signed HTTP request ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
