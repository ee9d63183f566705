use crate::domain::payout::PayoutStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// A state transition was requested that the current status does not allow.
    #[error("Cannot {action} payout {payout_id} in status {status}")]
    IllegalPayoutState {
        payout_id: u64,
        action: &'static str,
        status: PayoutStatus,
    },
    #[error("Cannot {action} order {order_id} in status {status}")]
    IllegalOrderState {
        order_id: u64,
        action: &'static str,
        status: String,
    },
    /// Another worker changed the row between read and write.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: u64 },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("Gateway error: {0}")]
    GatewayError(String),
    #[error("Failed to create remote {kind} for local id {local_id}")]
    ResourceCreation { kind: &'static str, local_id: u64 },
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(e: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(e))
    }
}
