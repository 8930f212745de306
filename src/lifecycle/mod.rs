//! Order lifecycle engine.
//!
//! Pure decision functions: given an order, a requested status and the
//! role asking for it, decide whether the move is legal and produce the
//! successor value. Nothing here persists or publishes; the order service
//! does that with whatever these functions return.
//!
//! ```text
//!            ┌──────────► accepted ──────► completed
//!            │               │
//!  pending ──┼──────────► declined
//!            │               │
//!            └──────────► cancelled ◄──────┘
//! ```

use std::time::Duration;

use tracing::debug;

use crate::domain::{ActorRole, Order, OrderStatus};
use crate::error::LifecycleError;

/// Pending orders older than this are cancelled by the sweeper.
pub const STALE_PENDING_AFTER: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// 1. TRANSITION TABLE
// =============================================================================

/// `true` if `to` is directly reachable from `from`.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from.successors().contains(&to)
}

// =============================================================================
// 2. AUTHORIZATION
// =============================================================================

/// Role check for a human-requested transition.
///
/// Admins and riders may drive the whole lifecycle. Customers may only
/// cancel, and only while the order is still pending.
pub fn is_authorized(role: ActorRole, order: &Order, to: OrderStatus) -> bool {
    match (role, to) {
        (ActorRole::Admin | ActorRole::Rider, _) => true,
        (ActorRole::Customer, OrderStatus::Cancelled) => order.status == OrderStatus::Pending,
        (ActorRole::Customer, _) => false,
    }
}

// =============================================================================
// 3. TRANSITIONS
// =============================================================================

/// Validates a transition and returns the successor order.
///
/// The table is checked before the role, so a move that is impossible for
/// everyone reports `InvalidTransition` regardless of who asked.
pub fn request_transition(
    order: &Order,
    requested: OrderStatus,
    role: ActorRole,
) -> Result<Order, LifecycleError> {
    if !can_transition(order.status, requested) {
        return Err(LifecycleError::InvalidTransition {
            from: order.status,
            to: requested,
        });
    }
    if !is_authorized(role, order, requested) {
        return Err(LifecycleError::NotAuthorized { role, to: requested });
    }
    debug!(order_id = %order.id, from = %order.status, to = %requested, role = %role, "Transition accepted");
    Ok(order.with_status(requested))
}

/// Cancels every pending order older than `stale_after`.
///
/// This is a system transition and skips the role check. Orders that are
/// not stale come back unchanged, so `result == orders` means there is
/// nothing to persist.
pub fn sweep_stale_pending(orders: &[Order], now_millis: i64, stale_after: Duration) -> Vec<Order> {
    let limit = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
    orders
        .iter()
        .map(|order| {
            let stale = order.status == OrderStatus::Pending
                && now_millis.saturating_sub(order.created_at) > limit;
            if stale {
                order.with_status(OrderStatus::Cancelled)
            } else {
                order.clone()
            }
        })
        .collect()
}
