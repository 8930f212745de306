use tokio::sync::oneshot;

use crate::cancellation::CancellationState;
use crate::domain::{Actor, Order, OrderCreate, OrderStatus};
use crate::error::OrderError;

/// Generic type aliases for service communication
pub type ServiceResult<T, E> = std::result::Result<T, E>;
pub type ServiceResponse<T, E> = oneshot::Sender<ServiceResult<T, E>>;

/// What happened to the cancellation fee during a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PenaltyOutcome {
    /// Not a customer cancellation.
    NotApplicable,
    /// Cancelled inside the penalty-free window.
    Waived,
    Charged { amount: f64 },
    AlreadyCharged,
    /// The cancellation stands; only the charge failed.
    Failed(String),
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// The order as persisted after the transition (and penalty, if any).
    pub order: Order,
    /// Window state at the moment of a cancellation.
    pub window: Option<CancellationState>,
    pub penalty: PenaltyOutcome,
    /// Set when the penalty flag could not be persisted after charging.
    pub warning: Option<String>,
}

/// Typed messages for the order service. Each variant carries a oneshot
/// channel for the response.
#[derive(Debug)]
pub enum OrderRequest {
    PlaceOrder {
        order: OrderCreate,
        respond_to: ServiceResponse<Order, OrderError>,
    },
    GetOrder {
        id: String,
        respond_to: ServiceResponse<Option<Order>, OrderError>,
    },
    ListOrders {
        respond_to: ServiceResponse<Vec<Order>, OrderError>,
    },
    RequestTransition {
        id: String,
        status: OrderStatus,
        actor: Actor,
        source: String,
        respond_to: ServiceResponse<TransitionOutcome, OrderError>,
    },
    GetCancellationState {
        id: String,
        respond_to: ServiceResponse<CancellationState, OrderError>,
    },
    SweepStale {
        respond_to: ServiceResponse<Vec<Order>, OrderError>,
    },
    Shutdown,
}
