use tracing::{debug, warn};

use super::{KvBackend, OrderRepository};
use crate::domain::{Order, OrderStatus};
use crate::error::StoreError;

const ORDER_PREFIX: &str = "order:";
const STATUS_PREFIX: &str = "order_status:";

pub fn order_key(id: &str) -> String {
    format!("{ORDER_PREFIX}{id}")
}

pub fn status_key(id: &str) -> String {
    format!("{STATUS_PREFIX}{id}")
}

/// Order snapshot laid out over a [`KvBackend`]: one JSON record per order
/// plus a status shortcut entry. The full record is authoritative.
#[derive(Debug, Clone)]
pub struct SnapshotStore<B: KvBackend> {
    backend: B,
}

impl<B: KvBackend> SnapshotStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Raw JSON of the stored record, exactly as written.
    pub fn raw(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.backend.get(&order_key(id))
    }

    /// Fast-path status read. Falls back to the full record when the
    /// shortcut is missing or unreadable.
    pub fn latest_status(&self, id: &str) -> Result<Option<OrderStatus>, StoreError> {
        if let Some(cached) = self.backend.get(&status_key(id))? {
            if let Ok(status) = cached.parse::<OrderStatus>() {
                return Ok(Some(status));
            }
            warn!(order_id = %id, cached = %cached, "Ignoring unreadable status shortcut");
        }
        Ok(self.get(id)?.map(|order| order.status))
    }
}

impl<B: KvBackend> OrderRepository for SnapshotStore<B> {
    fn get(&self, id: &str) -> Result<Option<Order>, StoreError> {
        match self.backend.get(&order_key(id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, order: &Order) -> Result<(), StoreError> {
        let json = serde_json::to_string(order)?;
        self.backend.set(&order_key(&order.id), &json)?;
        // The shortcut is a cache; a failed write there must not fail the put.
        if let Err(e) = self.backend.set(&status_key(&order.id), order.status.as_str()) {
            warn!(order_id = %order.id, error = %e, "Status shortcut write failed");
            let _ = self.backend.remove(&status_key(&order.id));
        }
        debug!(order_id = %order.id, status = %order.status, "Order persisted");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = Vec::new();
        for key in self.backend.keys(ORDER_PREFIX)? {
            let Some(json) = self.backend.get(&key)? else { continue };
            match serde_json::from_str(&json) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(key = %key, error = %e, "Skipping undecodable order record"),
            }
        }
        Ok(orders)
    }
}
