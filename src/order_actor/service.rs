use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::cancellation::{
    cancellation_state_with_window, charge_cancellation_penalty, CancellationState, CountdownClient,
    PenaltyLedger, PENALTY_FREE_WINDOW,
};
use crate::clients::OrderClient;
use crate::clock::Clock;
use crate::domain::{Actor, ActorRole, Order, OrderCreate, OrderStatus};
use crate::error::OrderError;
use crate::lifecycle::{self, STALE_PENDING_AFTER};
use crate::messages::{OrderRequest, PenaltyOutcome, ServiceResponse, TransitionOutcome};
use crate::store::OrderRepository;
use crate::sync::{Broadcaster, StatusChange};

const PLACEMENT_SOURCE: &str = "placement";
const SWEEP_SOURCE: &str = "auto-cancel";
const PENALTY_SOURCE: &str = "penalty";

/// Tunables of the order service.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPolicy {
    pub penalty_window: Duration,
    pub stale_after: Duration,
    pub cancellation_penalty: f64,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            penalty_window: PENALTY_FREE_WINDOW,
            stale_after: STALE_PENDING_AFTER,
            cancellation_penalty: 5.0,
        }
    }
}

/// Owner of the order snapshot.
///
/// Every change follows the same path: the lifecycle engine decides, the
/// repository persists, and only then is the change published on the bus.
/// A failed write is never published.
pub struct OrderService<R: OrderRepository> {
    receiver: mpsc::Receiver<OrderRequest>,
    repo: R,
    bus: Broadcaster,
    clock: Arc<dyn Clock>,
    ledger: Box<dyn PenaltyLedger>,
    countdown: Option<CountdownClient>,
    policy: OrderPolicy,
    next_id_fn: Box<dyn Fn() -> String + Send + Sync>,
}

impl<R: OrderRepository> OrderService<R> {
    pub fn new(
        buffer_size: usize,
        repo: R,
        bus: Broadcaster,
        clock: Arc<dyn Clock>,
        ledger: impl PenaltyLedger,
        next_id_fn: impl Fn() -> String + Send + Sync + 'static,
    ) -> (Self, OrderClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let service = Self {
            receiver,
            repo,
            bus,
            clock,
            ledger: Box::new(ledger),
            countdown: None,
            policy: OrderPolicy::default(),
            next_id_fn: Box::new(next_id_fn),
        };
        (service, OrderClient::new(sender))
    }

    pub fn with_policy(mut self, policy: OrderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Keeps the countdown ticker in step: pending orders are tracked,
    /// anything that leaves pending is dropped.
    pub fn with_countdown(mut self, countdown: CountdownClient) -> Self {
        self.countdown = Some(countdown);
        self
    }

    #[instrument(name = "order_service", skip(self))]
    pub async fn run(mut self) {
        info!("OrderService starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                OrderRequest::PlaceOrder { order, respond_to } => {
                    self.handle_place_order(order, respond_to).await;
                }
                OrderRequest::GetOrder { id, respond_to } => {
                    self.handle_get_order(id, respond_to);
                }
                OrderRequest::ListOrders { respond_to } => {
                    self.handle_list_orders(respond_to);
                }
                OrderRequest::RequestTransition {
                    id,
                    status,
                    actor,
                    source,
                    respond_to,
                } => {
                    self.handle_request_transition(id, status, actor, source, respond_to)
                        .await;
                }
                OrderRequest::GetCancellationState { id, respond_to } => {
                    self.handle_cancellation_state(id, respond_to);
                }
                OrderRequest::SweepStale { respond_to } => {
                    self.handle_sweep_stale(respond_to).await;
                }
                OrderRequest::Shutdown => {
                    info!("OrderService shutting down");
                    break;
                }
            }
        }

        info!("OrderService stopped");
    }

    #[instrument(fields(customer_id = %order.customer_id, items = order.items.len()), skip(self, order, respond_to))]
    async fn handle_place_order(&mut self, order: OrderCreate, respond_to: ServiceResponse<Order, OrderError>) {
        debug!("Processing place_order request");

        if let Err(reason) = order.validate() {
            error!(reason = %reason, "Validation failed");
            let _ = respond_to.send(Err(OrderError::ValidationError(reason)));
            return;
        }

        let now = self.clock.now_millis();
        let placed = Order::placed((self.next_id_fn)(), now, order);
        if let Err(e) = self.publish_status_change(&placed, now, PLACEMENT_SOURCE, false) {
            let _ = respond_to.send(Err(e));
            return;
        }
        self.track(&placed).await;

        info!(order_id = %placed.id, total = placed.total, "Order placed");
        let _ = respond_to.send(Ok(placed));
    }

    #[instrument(fields(order_id = %id), skip(self, respond_to))]
    fn handle_get_order(&self, id: String, respond_to: ServiceResponse<Option<Order>, OrderError>) {
        debug!("Processing get_order request");
        let result = self
            .repo
            .get(&id)
            .map_err(|e| OrderError::SnapshotReadFailure(e.to_string()));
        let _ = respond_to.send(result);
    }

    #[instrument(skip(self, respond_to))]
    fn handle_list_orders(&self, respond_to: ServiceResponse<Vec<Order>, OrderError>) {
        debug!("Processing list_orders request");
        let result = self
            .repo
            .list()
            .map_err(|e| OrderError::SnapshotReadFailure(e.to_string()));
        if let Ok(orders) = &result {
            debug!(order_count = orders.len(), "Listed orders");
        }
        let _ = respond_to.send(result);
    }

    #[instrument(
        fields(order_id = %id, status = %status, role = %actor.role, actor_id = %actor.id, source = %source),
        skip(self, actor, source, respond_to)
    )]
    async fn handle_request_transition(
        &mut self,
        id: String,
        status: OrderStatus,
        actor: Actor,
        source: String,
        respond_to: ServiceResponse<TransitionOutcome, OrderError>,
    ) {
        debug!("Processing request_transition request");

        let current = match self.load(&id) {
            Ok(order) => order,
            Err(e) => {
                let _ = respond_to.send(Err(e));
                return;
            }
        };

        let mut successor = match lifecycle::request_transition(&current, status, actor.role) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Transition rejected");
                let _ = respond_to.send(Err(e.into()));
                return;
            }
        };

        // A rider who accepts an unassigned order takes it.
        if actor.role == ActorRole::Rider && status == OrderStatus::Accepted && successor.rider_id.is_none() {
            successor.rider_id = Some(actor.id.clone());
        }

        let now = self.clock.now_millis();
        let window = (status == OrderStatus::Cancelled).then(|| {
            cancellation_state_with_window(current.created_at, now, self.policy.penalty_window)
        });

        if let Err(e) = self.publish_status_change(&successor, now, &source, false) {
            let _ = respond_to.send(Err(e));
            return;
        }
        if current.status == OrderStatus::Pending {
            self.untrack(&id).await;
        }
        info!(from = %current.status, "Order status changed");

        let mut outcome = TransitionOutcome {
            order: successor,
            window,
            penalty: PenaltyOutcome::NotApplicable,
            warning: None,
        };
        if let (Some(window), ActorRole::Customer) = (window, actor.role) {
            self.apply_penalty(&mut outcome, window, now);
        }

        let _ = respond_to.send(Ok(outcome));
    }

    /// Charges the late-cancellation fee. Only customer cancellations reach
    /// this; admin, rider and sweep cancellations are never charged.
    ///
    /// Runs after the cancellation is already persisted and published. A
    /// failure here is reported in the outcome, never as an error.
    fn apply_penalty(&mut self, outcome: &mut TransitionOutcome, window: CancellationState, now: i64) {
        if window.is_penalty_free {
            debug!(remaining_seconds = window.remaining_seconds, "Cancelled inside the penalty-free window");
            outcome.penalty = PenaltyOutcome::Waived;
            return;
        }

        let amount = self.policy.cancellation_penalty;
        match charge_cancellation_penalty(&outcome.order, amount, self.ledger.as_mut()) {
            Ok(Some(charged)) => {
                if let Err(e) = self.publish_status_change(&charged, now, PENALTY_SOURCE, true) {
                    warn!(error = %e, "Penalty charged but flag not persisted");
                    outcome.warning = Some(format!("penalty flag not persisted: {e}"));
                }
                outcome.order = charged;
                outcome.penalty = PenaltyOutcome::Charged { amount };
            }
            Ok(None) => outcome.penalty = PenaltyOutcome::AlreadyCharged,
            Err(e) => {
                error!(error = %e, "Penalty charge failed");
                outcome.penalty = PenaltyOutcome::Failed(e.to_string());
            }
        }
    }

    #[instrument(fields(order_id = %id), skip(self, respond_to))]
    fn handle_cancellation_state(&self, id: String, respond_to: ServiceResponse<CancellationState, OrderError>) {
        debug!("Processing cancellation_state request");
        let now = self.clock.now_millis();
        let result = self
            .load(&id)
            .map(|order| cancellation_state_with_window(order.created_at, now, self.policy.penalty_window));
        let _ = respond_to.send(result);
    }

    /// Cancels stale pending orders one by one. Every order whose write
    /// succeeded is announced and untracked, even when a later write fails.
    #[instrument(skip(self, respond_to))]
    async fn handle_sweep_stale(&mut self, respond_to: ServiceResponse<Vec<Order>, OrderError>) {
        debug!("Processing sweep_stale request");
        let now = self.clock.now_millis();

        let stale = match self.repo.stale_pending(now, self.policy.stale_after) {
            Ok(stale) => stale,
            Err(e) => {
                error!(error = %e, "Sweep could not read the snapshot");
                let _ = respond_to.send(Err(OrderError::SnapshotReadFailure(e.to_string())));
                return;
            }
        };

        let mut cancelled = Vec::with_capacity(stale.len());
        let mut first_failure = None;
        for order in stale {
            match self.publish_status_change(&order, now, SWEEP_SOURCE, false) {
                Ok(_) => {
                    self.untrack(&order.id).await;
                    cancelled.push(order);
                }
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }

        if !cancelled.is_empty() {
            info!(cancelled = cancelled.len(), "Stale pending orders cancelled");
        }
        let result = match first_failure {
            Some(e) => Err(e),
            None => Ok(cancelled),
        };
        let _ = respond_to.send(result);
    }

    /// Persists `order` and, only once the write succeeded, announces it on
    /// the bus. Returns the sequence number of the announcement.
    fn publish_status_change(
        &mut self,
        order: &Order,
        now: i64,
        source: &str,
        force_update: bool,
    ) -> Result<u64, OrderError> {
        if let Err(e) = self.repo.put(order) {
            error!(order_id = %order.id, error = %e, "Snapshot write failed");
            return Err(OrderError::PersistenceWriteFailure {
                reason: e.to_string(),
                order: Some(Box::new(order.clone())),
            });
        }
        let change = StatusChange::for_order(order, now, source);
        let change = if force_update { change.forced() } else { change };
        Ok(self.bus.publish(change))
    }

    fn load(&self, id: &str) -> Result<Order, OrderError> {
        match self.repo.get(id) {
            Ok(Some(order)) => Ok(order),
            Ok(None) => {
                debug!(order_id = %id, "Order not found");
                Err(OrderError::NotFound(id.to_string()))
            }
            Err(e) => Err(OrderError::SnapshotReadFailure(e.to_string())),
        }
    }

    async fn track(&mut self, order: &Order) {
        if let Some(countdown) = &self.countdown {
            if let Err(e) = countdown.track(order.id.clone(), order.created_at).await {
                warn!(error = %e, "Countdown ticker unavailable");
            }
        }
    }

    async fn untrack(&mut self, id: &str) {
        if let Some(countdown) = &self.countdown {
            if let Err(e) = countdown.untrack(id.to_string()).await {
                warn!(error = %e, "Countdown ticker unavailable");
            }
        }
    }
}
