use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::cancellation::CancellationState;
use crate::domain::{Actor, Order, OrderCreate, OrderStatus};
use crate::error::OrderError;
use crate::messages::{OrderRequest, TransitionOutcome};

/// Client for interacting with the order service.
#[derive(Clone)]
pub struct OrderClient {
    sender: mpsc::Sender<OrderRequest>,
}

impl OrderClient {
    pub fn new(sender: mpsc::Sender<OrderRequest>) -> Self {
        Self { sender }
    }

    /// Customer-facing cancel; the penalty outcome is in the result.
    #[instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn cancel_order(
        &self,
        id: String,
        actor: Actor,
        source: String,
    ) -> Result<TransitionOutcome, OrderError> {
        self.request_transition(id, OrderStatus::Cancelled, actor, source).await
    }

    /// Manual methods for special cases (no response needed)
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), OrderError> {
        debug!("Sending shutdown request");
        self.sender
            .send(OrderRequest::Shutdown)
            .await
            .map_err(|e| OrderError::ActorCommunicationError(e.to_string()))
    }
}

client_method!(OrderClient => fn place_order(order: OrderCreate) -> Order as OrderRequest::PlaceOrder, Error = OrderError);
client_method!(OrderClient => fn get_order(id: String) -> Option<Order> as OrderRequest::GetOrder, Error = OrderError);
client_method!(OrderClient => fn list_orders() -> Vec<Order> as OrderRequest::ListOrders, Error = OrderError);
client_method!(OrderClient => fn request_transition(id: String, status: OrderStatus, actor: Actor, source: String) -> TransitionOutcome as OrderRequest::RequestTransition, Error = OrderError);
client_method!(OrderClient => fn cancellation_state(id: String) -> CancellationState as OrderRequest::GetCancellationState, Error = OrderError);
client_method!(OrderClient => fn sweep_stale() -> Vec<Order> as OrderRequest::SweepStale, Error = OrderError);
