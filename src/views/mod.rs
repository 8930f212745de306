//! View adapters: the order list, detail dialog and badge surfaces.
//!
//! A view keeps its own copy of the orders it shows. It never trusts the
//! payload of a change for the data itself; it re-reads the snapshot, so a
//! missed or duplicated signal only delays convergence.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::clients::OrderClient;
use crate::domain::{Actor, Order, OrderStatus};
use crate::error::OrderError;
use crate::messages::TransitionOutcome;
use crate::sync::{Broadcaster, Subscription, SyncEvent};

/// Which orders a view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewScope {
    All,
    Customer(String),
    Rider(String),
}

impl ViewScope {
    pub fn contains(&self, order: &Order) -> bool {
        match self {
            Self::All => true,
            Self::Customer(id) => order.customer_id == *id,
            Self::Rider(id) => order.rider_id.as_deref() == Some(id.as_str()),
        }
    }
}

/// What processing one event did to the view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    Upserted(Order),
    Removed(String),
    Unchanged(String),
    Reloaded(usize),
    /// The re-read failed. The cached copy stays until a later change or
    /// `refresh` succeeds.
    Stale(String),
}

/// Per-status counts for dashboard badges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBadge {
    pub counts: BTreeMap<OrderStatus, usize>,
}

impl StatusBadge {
    pub fn count(&self, status: OrderStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Orders still waiting for someone to act on them.
    pub fn open(&self) -> usize {
        self.count(OrderStatus::Pending) + self.count(OrderStatus::Accepted)
    }
}

/// A mounted view over the order snapshot.
pub struct OrderView {
    label: String,
    client: OrderClient,
    subscription: Subscription,
    scope: ViewScope,
    orders: BTreeMap<String, Order>,
    latency: Duration,
}

impl OrderView {
    /// Subscribes first and reads the snapshot second, so nothing published
    /// in between can be missed.
    #[instrument(skip(client, bus))]
    pub async fn mount(
        label: &str,
        client: OrderClient,
        bus: &Broadcaster,
        scope: ViewScope,
    ) -> Result<Self, OrderError> {
        let subscription = bus.subscribe();
        let mut view = Self {
            label: label.to_string(),
            client,
            subscription,
            scope,
            orders: BTreeMap::new(),
            latency: Duration::ZERO,
        };
        view.refresh().await?;
        info!(orders = view.orders.len(), "View mounted");
        Ok(view)
    }

    /// Pause applied before each transition request, standing in for a
    /// slow round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<OrderStatus> {
        self.orders.get(id).map(|order| order.status)
    }

    pub fn badge(&self) -> StatusBadge {
        let mut badge = StatusBadge::default();
        for order in self.orders.values() {
            *badge.counts.entry(order.status).or_default() += 1;
        }
        badge
    }

    /// Reloads every order in scope from the snapshot.
    #[instrument(skip(self), fields(view = %self.label))]
    pub async fn refresh(&mut self) -> Result<usize, OrderError> {
        let orders = self.client.list_orders().await?;
        self.orders = orders
            .into_iter()
            .filter(|order| self.scope.contains(order))
            .map(|order| (order.id.clone(), order))
            .collect();
        debug!(orders = self.orders.len(), "View refreshed");
        Ok(self.orders.len())
    }

    /// Waits for and applies the next change. `None` once the bus is gone.
    pub async fn process_next(&mut self) -> Option<ViewUpdate> {
        let event = self.subscription.recv().await?;
        Some(self.apply(event).await)
    }

    /// Applies every change that is already waiting. Returns how many were
    /// processed; a failed re-read does not stop the rest.
    pub async fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.subscription.try_recv() {
            self.apply(event).await;
            processed += 1;
        }
        processed
    }

    /// Every change is acknowledged, including one whose re-read failed.
    #[instrument(skip(self, event), fields(view = %self.label))]
    async fn apply(&mut self, event: SyncEvent) -> ViewUpdate {
        match event {
            SyncEvent::Change(envelope) => {
                let id = envelope.change.order_id.clone();
                let update = match self.client.get_order(id.clone()).await {
                    Err(e) => {
                        warn!(order_id = %id, error = %e, "Re-read failed, keeping cached order");
                        ViewUpdate::Stale(e.to_string())
                    }
                    Ok(Some(order)) if self.scope.contains(&order) => {
                        if self.orders.get(&id) == Some(&order) && !envelope.change.force_update {
                            ViewUpdate::Unchanged(id)
                        } else {
                            debug!(order_id = %id, status = %order.status, "View updated");
                            self.orders.insert(id, order.clone());
                            ViewUpdate::Upserted(order)
                        }
                    }
                    Ok(_) => match self.orders.remove(&id) {
                        Some(_) => ViewUpdate::Removed(id),
                        None => ViewUpdate::Unchanged(id),
                    },
                };
                self.subscription.ack(envelope.seq);
                update
            }
            SyncEvent::Resync { missed } => {
                warn!(missed, "View missed changes, reloading snapshot");
                match self.refresh().await {
                    Ok(count) => ViewUpdate::Reloaded(count),
                    Err(e) => {
                        warn!(error = %e, "Reload failed, keeping cached orders");
                        ViewUpdate::Stale(e.to_string())
                    }
                }
            }
        }
    }

    /// Asks the service for a transition on behalf of this view.
    ///
    /// The simulated latency is a cooperative sleep: dropping the returned
    /// future (or the view) before it elapses means no request is sent.
    #[instrument(skip(self, actor), fields(view = %self.label, role = %actor.role))]
    pub async fn request_transition(
        &self,
        id: &str,
        status: OrderStatus,
        actor: Actor,
    ) -> Result<TransitionOutcome, OrderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.client
            .request_transition(id.to_string(), status, actor, self.label.clone())
            .await
    }

    /// Tears the view down. Dropping it has the same effect.
    pub fn unmount(self) {
        info!(view = %self.label, "View unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderCreate, OrderItem};
    use crate::mock_framework::{create_mock_client, expect_get, expect_list, expect_transition};
    use crate::sync::StatusChange;

    fn order(id: &str, customer: &str) -> Order {
        Order::placed(id, 0, OrderCreate::new(customer, vec![OrderItem::new("Tea", 2.0, 1)]))
    }

    #[tokio::test]
    async fn mount_reads_snapshot_filtered_by_scope() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);

        let mount = tokio::spawn(async move {
            OrderView::mount("customer-orders", client, &bus, ViewScope::Customer("alice".into())).await
        });
        let respond_to = expect_list(&mut rx).await.expect("Expected list request");
        respond_to
            .send(Ok(vec![order("o1", "alice"), order("o2", "bob")]))
            .unwrap();

        let view = mount.await.unwrap().unwrap();
        assert_eq!(view.orders().count(), 1);
        assert_eq!(view.status_of("o1"), Some(OrderStatus::Pending));
        assert_eq!(view.badge().count(OrderStatus::Pending), 1);
    }

    #[tokio::test]
    async fn change_signal_triggers_snapshot_reread() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);
        let publisher = bus.clone();

        let view_task = tokio::spawn(async move {
            let mut view = OrderView::mount("rider-list", client, &bus, ViewScope::All).await?;
            let update = view.process_next().await;
            Ok::<_, OrderError>((view.status_of("o1"), update))
        });

        expect_list(&mut rx).await.unwrap().send(Ok(vec![order("o1", "alice")])).unwrap();

        let accepted = order("o1", "alice").with_status(OrderStatus::Accepted);
        publisher.publish(StatusChange::for_order(&accepted, 10, "admin-dialog"));

        let (id, respond_to) = expect_get(&mut rx).await.expect("Expected get request");
        assert_eq!(id, "o1");
        respond_to.send(Ok(Some(accepted.clone()))).unwrap();

        let (status, update) = view_task.await.unwrap().unwrap();
        assert_eq!(status, Some(OrderStatus::Accepted));
        assert_eq!(update, Some(ViewUpdate::Upserted(accepted)));
    }

    #[tokio::test]
    async fn transition_request_carries_view_label_as_source() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);

        let task = tokio::spawn(async move {
            let view = OrderView::mount("admin-dialog", client, &bus, ViewScope::All).await?;
            view.request_transition("o1", OrderStatus::Declined, Actor::admin("adm_1")).await
        });
        expect_list(&mut rx).await.unwrap().send(Ok(vec![])).unwrap();

        let request = expect_transition(&mut rx).await.expect("Expected transition request");
        assert_eq!(request.source, "admin-dialog");
        assert_eq!(request.actor, Actor::admin("adm_1"));
        request
            .respond_to
            .send(Err(OrderError::NotFound("o1".into())))
            .unwrap();

        assert_eq!(task.await.unwrap(), Err(OrderError::NotFound("o1".into())));
    }

    #[tokio::test]
    async fn unmount_releases_the_subscription() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);
        let observer = bus.clone();

        let mount = tokio::spawn(async move { OrderView::mount("badge", client, &bus, ViewScope::All).await });
        expect_list(&mut rx).await.unwrap().send(Ok(vec![])).unwrap();
        let view = mount.await.unwrap().unwrap();

        assert_eq!(observer.subscriber_count(), 1);
        view.unmount();
        assert_eq!(observer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_a_delayed_request_sends_nothing() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);

        let mount = tokio::spawn(async move { OrderView::mount("slow", client, &bus, ViewScope::All).await });
        expect_list(&mut rx).await.unwrap().send(Ok(vec![])).unwrap();
        let view = mount.await.unwrap().unwrap().with_latency(Duration::from_secs(30));

        let pending = view.request_transition("o1", OrderStatus::Accepted, Actor::rider("r1"));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());
        drop(view);

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failed_reread_is_acked_and_does_not_stop_the_drain() {
        let (client, mut rx) = create_mock_client(8);
        let bus = Broadcaster::new(8, 8);
        let publisher = bus.clone();

        let mount = tokio::spawn(async move { OrderView::mount("badge", client, &bus, ViewScope::All).await });
        expect_list(&mut rx).await.unwrap().send(Ok(vec![order("o1", "alice")])).unwrap();
        let mut view = mount.await.unwrap().unwrap();

        let accepted = order("o1", "alice").with_status(OrderStatus::Accepted);
        publisher.publish(StatusChange::for_order(&accepted, 10, "admin-dialog"));
        publisher.publish(StatusChange::for_order(&order("o2", "bob"), 11, "placement"));

        let drain = tokio::spawn(async move {
            let processed = view.drain().await;
            (view, processed)
        });
        let (id, respond_to) = expect_get(&mut rx).await.unwrap();
        assert_eq!(id, "o1");
        respond_to
            .send(Err(OrderError::SnapshotReadFailure("bad record".into())))
            .unwrap();
        let (id, respond_to) = expect_get(&mut rx).await.unwrap();
        assert_eq!(id, "o2");
        respond_to.send(Ok(Some(order("o2", "bob")))).unwrap();

        let (view, processed) = drain.await.unwrap();
        assert_eq!(processed, 2);
        assert_eq!(view.status_of("o1"), Some(OrderStatus::Pending));
        assert_eq!(view.status_of("o2"), Some(OrderStatus::Pending));
        assert!(publisher.lagging().is_empty());
    }
}
