use thiserror::Error;

use crate::domain::{ActorRole, Order, OrderStatus};

/// Rejections from the lifecycle engine. The order is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Not authorized: {role} may not move order to {to}")]
    NotAuthorized { role: ActorRole, to: OrderStatus },
}

/// Failures of the key-value snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Snapshot serialization error: {0}")]
    Serialization(String),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Storage lock poisoned")]
    Poisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Failures of the wallet collaborator while charging a penalty.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PenaltyError {
    #[error("Penalty declined: {0}")]
    Declined(String),
    #[error("Penalty ledger error: {0}")]
    Ledger(String),
}

/// Rejections of an externally received status-change payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("Malformed status change: {0}")]
    Malformed(String),
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
    #[error("Status change without order id")]
    MissingOrderId,
}

/// Errors that can occur during order operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Not authorized: {role} may not move order to {to}")]
    NotAuthorized { role: ActorRole, to: OrderStatus },
    #[error("Order validation error: {0}")]
    ValidationError(String),
    /// The snapshot write failed. `order` is the successor that would have
    /// been stored; it was not broadcast.
    #[error("Persistence write failure: {reason}")]
    PersistenceWriteFailure { reason: String, order: Option<Box<Order>> },
    #[error("Snapshot read failure: {0}")]
    SnapshotReadFailure(String),
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}

impl From<LifecycleError> for OrderError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::InvalidTransition { from, to } => OrderError::InvalidTransition { from, to },
            LifecycleError::NotAuthorized { role, to } => OrderError::NotAuthorized { role, to },
        }
    }
}

/// Problems loading [`crate::app_system::SyncConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
