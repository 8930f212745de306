//! Order store: the persisted snapshot every view reads from.

mod kv;
mod snapshot;

pub use kv::*;
pub use snapshot::*;

use std::time::Duration;

use crate::domain::Order;
use crate::error::StoreError;
use crate::lifecycle::sweep_stale_pending;

/// Repository over the order snapshot. The order service owns one and is
/// the only writer inside a process.
pub trait OrderRepository: Send + 'static {
    fn get(&self, id: &str) -> Result<Option<Order>, StoreError>;
    fn put(&mut self, order: &Order) -> Result<(), StoreError>;
    /// Every stored order, sorted by id.
    fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Cancelled successors of every stale pending order. Nothing is
    /// written; the caller persists each one before announcing it.
    fn stale_pending(&self, now_millis: i64, stale_after: Duration) -> Result<Vec<Order>, StoreError> {
        let orders = self.list()?;
        let swept = sweep_stale_pending(&orders, now_millis, stale_after);
        Ok(orders
            .iter()
            .zip(swept)
            .filter(|(before, after)| *before != after)
            .map(|(_, after)| after)
            .collect())
    }
}
