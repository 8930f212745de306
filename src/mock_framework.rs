//! # Mock Framework
//!
//! Utilities for testing code that talks to the order service without
//! spinning up the service itself.
//!
//! Use [`create_mock_client`] to get a client and a receiver.
//! Then use helpers like [`expect_get`] or [`expect_transition`] to assert behavior.

use tokio::sync::{mpsc, oneshot};

use crate::clients::OrderClient;
use crate::domain::{Actor, Order, OrderStatus};
use crate::error::OrderError;
use crate::messages::{OrderRequest, TransitionOutcome};

/// Creates a mock client and a receiver for asserting requests.
///
/// The test plays the service: it reads each request from `receiver`,
/// checks it, and answers through the embedded oneshot sender.
pub fn create_mock_client(buffer_size: usize) -> (OrderClient, mpsc::Receiver<OrderRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (OrderClient::new(sender), receiver)
}

/// Helper to verify that the next message is a GetOrder request
pub async fn expect_get(
    receiver: &mut mpsc::Receiver<OrderRequest>,
) -> Option<(String, oneshot::Sender<Result<Option<Order>, OrderError>>)> {
    match receiver.recv().await {
        Some(OrderRequest::GetOrder { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a ListOrders request
pub async fn expect_list(
    receiver: &mut mpsc::Receiver<OrderRequest>,
) -> Option<oneshot::Sender<Result<Vec<Order>, OrderError>>> {
    match receiver.recv().await {
        Some(OrderRequest::ListOrders { respond_to }) => Some(respond_to),
        _ => None,
    }
}

/// A transition request as seen by the service.
pub struct ExpectedTransition {
    pub id: String,
    pub status: OrderStatus,
    pub actor: Actor,
    pub source: String,
    pub respond_to: oneshot::Sender<Result<TransitionOutcome, OrderError>>,
}

/// Helper to verify that the next message is a RequestTransition request
pub async fn expect_transition(receiver: &mut mpsc::Receiver<OrderRequest>) -> Option<ExpectedTransition> {
    match receiver.recv().await {
        Some(OrderRequest::RequestTransition {
            id,
            status,
            actor,
            source,
            respond_to,
        }) => Some(ExpectedTransition {
            id,
            status,
            actor,
            source,
            respond_to,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderCreate, OrderItem};
    use crate::messages::PenaltyOutcome;

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client(10);

        let task = tokio::spawn(async move {
            client
                .request_transition("order_1".into(), OrderStatus::Accepted, Actor::admin("adm"), "admin-dialog".into())
                .await
        });

        let request = expect_transition(&mut receiver).await.expect("Expected transition request");
        assert_eq!(request.id, "order_1");
        assert_eq!(request.status, OrderStatus::Accepted);
        assert_eq!(request.source, "admin-dialog");

        let order = Order::placed("order_1", 0, OrderCreate::new("c", vec![OrderItem::new("x", 1.0, 1)]))
            .with_status(OrderStatus::Accepted);
        let outcome = TransitionOutcome {
            order,
            window: None,
            penalty: PenaltyOutcome::NotApplicable,
            warning: None,
        };
        request.respond_to.send(Ok(outcome.clone())).unwrap();

        assert_eq!(task.await.unwrap(), Ok(outcome));
    }

    #[tokio::test]
    async fn dropped_service_is_a_communication_error() {
        let (client, receiver) = create_mock_client(1);
        drop(receiver);
        let result = client.get_order("order_1".into()).await;
        assert!(matches!(result, Err(OrderError::ActorCommunicationError(_))));
    }
}
