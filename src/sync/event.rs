use serde::{Deserialize, Serialize};

use crate::domain::{Order, OrderStatus};
use crate::error::SignalError;

/// Payload published for every persisted status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub order_id: String,
    pub new_status: OrderStatus,
    /// Epoch milliseconds at publication.
    pub timestamp: i64,
    /// Label of the view or job that caused the change.
    pub source: String,
    /// Set when listeners should re-read even if the status did not move.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_update: bool,
}

impl StatusChange {
    pub fn for_order(order: &Order, timestamp: i64, source: impl Into<String>) -> Self {
        Self {
            order_id: order.id.clone(),
            new_status: order.status,
            timestamp,
            source: source.into(),
            force_update: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force_update = true;
        self
    }

    /// Parses and validates a payload received from outside the process.
    pub fn parse(raw: &str) -> Result<Self, SignalError> {
        let wire: WireStatusChange =
            serde_json::from_str(raw).map_err(|e| SignalError::Malformed(e.to_string()))?;
        if wire.order_id.trim().is_empty() {
            return Err(SignalError::MissingOrderId);
        }
        Ok(Self {
            order_id: wire.order_id,
            new_status: wire.new_status.parse()?,
            timestamp: wire.timestamp,
            source: wire.source,
            force_update: wire.force_update,
        })
    }

    pub fn to_json(&self) -> String {
        // Plain strings, an enum and an integer cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Loosely typed form of [`StatusChange`] so an unknown status is reported
/// as such instead of a generic parse error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatusChange {
    #[serde(default)]
    order_id: String,
    new_status: String,
    timestamp: i64,
    #[serde(default)]
    source: String,
    #[serde(default)]
    force_update: bool,
}
