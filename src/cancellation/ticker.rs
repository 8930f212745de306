use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument};

use super::{cancellation_state_with_window, CancellationState};
use crate::clock::Clock;

/// Latest countdown for every tracked order, keyed by order id.
pub type Countdowns = BTreeMap<String, CancellationState>;

#[derive(Debug)]
pub enum TickerRequest {
    Track { order_id: String, created_at: i64 },
    Untrack { order_id: String },
    Shutdown,
}

/// The single countdown owner. Views subscribe to its output instead of
/// polling the clock themselves.
pub struct CountdownTicker {
    receiver: mpsc::Receiver<TickerRequest>,
    tracked: HashMap<String, i64>,
    clock: Arc<dyn Clock>,
    window: Duration,
    interval: Duration,
    states: watch::Sender<Countdowns>,
}

impl CountdownTicker {
    pub fn new(
        buffer_size: usize,
        clock: Arc<dyn Clock>,
        window: Duration,
        interval: Duration,
    ) -> (Self, CountdownClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (states, states_rx) = watch::channel(Countdowns::new());
        let ticker = Self {
            receiver,
            tracked: HashMap::new(),
            clock,
            window,
            interval,
            states,
        };
        let client = CountdownClient {
            sender,
            states: states_rx,
        };
        (ticker, client)
    }

    /// Starts with `orders` (id, created_at) already tracked, e.g. pending
    /// orders reloaded from a file snapshot. They are published on the
    /// first tick.
    pub fn with_tracked(mut self, orders: impl IntoIterator<Item = (String, i64)>) -> Self {
        self.tracked.extend(orders);
        self
    }

    #[instrument(name = "countdown_ticker", skip(self))]
    pub async fn run(mut self) {
        info!("CountdownTicker starting");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(TickerRequest::Track { order_id, created_at }) => {
                        debug!(order_id = %order_id, "Tracking cancellation window");
                        self.tracked.insert(order_id, created_at);
                        self.tick();
                    }
                    Some(TickerRequest::Untrack { order_id }) => {
                        debug!(order_id = %order_id, "Untracking cancellation window");
                        self.tracked.remove(&order_id);
                        self.states.send_modify(|states| {
                            states.remove(&order_id);
                        });
                    }
                    Some(TickerRequest::Shutdown) | None => {
                        info!("CountdownTicker shutting down");
                        break;
                    }
                },
                _ = interval.tick() => self.tick(),
            }
        }

        info!("CountdownTicker stopped");
    }

    /// Recomputes every tracked window. An expired window is published once
    /// with zero remaining and then dropped from tracking.
    fn tick(&mut self) {
        if self.tracked.is_empty() {
            return;
        }
        let now = self.clock.now_millis();
        let mut snapshot = self.states.borrow().clone();
        let mut expired = Vec::new();

        for (order_id, created_at) in &self.tracked {
            let state = cancellation_state_with_window(*created_at, now, self.window);
            if !state.is_penalty_free {
                expired.push(order_id.clone());
            }
            snapshot.insert(order_id.clone(), state);
        }

        for order_id in expired {
            debug!(order_id = %order_id, "Penalty-free window closed");
            self.tracked.remove(&order_id);
        }
        self.states.send_replace(snapshot);
    }
}

/// Handle to the [`CountdownTicker`].
#[derive(Clone)]
pub struct CountdownClient {
    sender: mpsc::Sender<TickerRequest>,
    states: watch::Receiver<Countdowns>,
}

impl CountdownClient {
    #[instrument(skip(self))]
    pub async fn track(&self, order_id: String, created_at: i64) -> Result<(), String> {
        debug!("Sending track request");
        self.sender
            .send(TickerRequest::Track { order_id, created_at })
            .await
            .map_err(|e| e.to_string())
    }

    #[instrument(skip(self))]
    pub async fn untrack(&self, order_id: String) -> Result<(), String> {
        debug!("Sending untrack request");
        self.sender
            .send(TickerRequest::Untrack { order_id })
            .await
            .map_err(|e| e.to_string())
    }

    /// Latest published countdowns.
    pub fn current(&self) -> Countdowns {
        self.states.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Countdowns> {
        self.states.clone()
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), String> {
        debug!("Sending shutdown request");
        self.sender
            .send(TickerRequest::Shutdown)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    async fn wait_for<F>(rx: &mut watch::Receiver<Countdowns>, mut done: F) -> Countdowns
    where
        F: FnMut(&Countdowns) -> bool,
    {
        let found = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|states| done(states)))
            .await
            .expect("countdown did not update in time")
            .expect("ticker stopped");
        found.clone()
    }

    #[tokio::test]
    async fn ticker_counts_down_from_the_injected_clock() {
        let clock = ManualClock::new(0);
        let (ticker, client) = CountdownTicker::new(
            8,
            Arc::new(clock.clone()),
            Duration::from_secs(600),
            Duration::from_millis(5),
        );
        let handle = tokio::spawn(ticker.run());
        let mut rx = client.subscribe();

        client.track("order_1".into(), 0).await.unwrap();
        let states = wait_for(&mut rx, |s| s.contains_key("order_1")).await;
        assert_eq!(states["order_1"].remaining_seconds, 600);

        clock.advance(Duration::from_secs(90));
        let states = wait_for(&mut rx, |s| s.get("order_1").map(|c| c.remaining_seconds) == Some(510)).await;
        assert!(states["order_1"].is_penalty_free);

        client.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn preloaded_orders_are_published_without_a_track_request() {
        let clock = ManualClock::new(120_000);
        let (ticker, client) = CountdownTicker::new(
            8,
            Arc::new(clock.clone()),
            Duration::from_secs(600),
            Duration::from_millis(5),
        );
        let ticker = ticker.with_tracked([("order_1".to_string(), 0)]);
        let handle = tokio::spawn(ticker.run());
        let mut rx = client.subscribe();

        let states = wait_for(&mut rx, |s| s.contains_key("order_1")).await;
        assert_eq!(states["order_1"].remaining_seconds, 480);

        client.shutdown().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn expired_window_is_published_then_dropped() {
        let clock = ManualClock::new(0);
        let (ticker, client) = CountdownTicker::new(
            8,
            Arc::new(clock.clone()),
            Duration::from_secs(600),
            Duration::from_millis(5),
        );
        let handle = tokio::spawn(ticker.run());
        let mut rx = client.subscribe();

        clock.set(700_000);
        client.track("late".into(), 0).await.unwrap();
        let states = wait_for(&mut rx, |s| s.contains_key("late")).await;
        assert_eq!(
            states["late"],
            CancellationState { remaining_seconds: 0, is_penalty_free: false }
        );

        client.untrack("late".into()).await.unwrap();
        let states = wait_for(&mut rx, |s| !s.contains_key("late")).await;
        assert!(states.is_empty());

        drop(client);
        handle.await.unwrap();
    }
}
