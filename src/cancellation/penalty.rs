use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::domain::Order;
use crate::error::PenaltyError;

/// The wallet side of a cancellation fee. Implemented outside this crate;
/// [`RecordingLedger`] keeps charges in memory.
pub trait PenaltyLedger: Send + 'static {
    fn charge(&mut self, order_id: &str, customer_id: &str, amount: f64) -> Result<(), PenaltyError>;
}

/// A charge accepted by a [`RecordingLedger`].
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyCharge {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
}

/// In-memory ledger. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingLedger {
    charges: Arc<Mutex<Vec<PenaltyCharge>>>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charges(&self) -> Vec<PenaltyCharge> {
        self.charges.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn charges_for(&self, order_id: &str) -> usize {
        self.charges().iter().filter(|c| c.order_id == order_id).count()
    }
}

impl PenaltyLedger for RecordingLedger {
    fn charge(&mut self, order_id: &str, customer_id: &str, amount: f64) -> Result<(), PenaltyError> {
        self.charges
            .lock()
            .map_err(|_| PenaltyError::Ledger("ledger lock poisoned".to_string()))?
            .push(PenaltyCharge {
                order_id: order_id.to_string(),
                customer_id: customer_id.to_string(),
                amount,
            });
        Ok(())
    }
}

/// Charges the late-cancellation fee for `order`.
///
/// Returns `Ok(Some(successor))` with `penalty_charged` set when the ledger
/// accepted the charge, and `Ok(None)` without calling the ledger when the
/// order was already charged.
pub fn charge_cancellation_penalty(
    order: &Order,
    amount: f64,
    ledger: &mut dyn PenaltyLedger,
) -> Result<Option<Order>, PenaltyError> {
    if order.penalty_charged {
        warn!(order_id = %order.id, "Penalty already charged, skipping");
        return Ok(None);
    }
    ledger.charge(&order.id, &order.customer_id, amount)?;
    info!(order_id = %order.id, amount, "Cancellation penalty charged");
    Ok(Some(Order {
        penalty_charged: true,
        ..order.clone()
    }))
}
