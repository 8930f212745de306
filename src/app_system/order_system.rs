use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{stale_order_sweeper, SyncConfig};
use crate::cancellation::{CountdownClient, CountdownTicker, PenaltyLedger, RecordingLedger};
use crate::clients::OrderClient;
use crate::clock::{Clock, SystemClock};
use crate::domain::OrderStatus;
use crate::error::{OrderError, StoreError};
use crate::order_actor::OrderService;
use crate::store::{FileKv, MemoryKv, OrderRepository, SnapshotStore};
use crate::sync::Broadcaster;
use crate::views::{OrderView, ViewScope};

/// The main application system that wires the order service, the bus, the
/// countdown ticker and the stale-order sweeper together.
pub struct OrderSystem {
    pub order_client: OrderClient,
    pub countdown_client: CountdownClient,
    pub broadcaster: Broadcaster,
    config: SyncConfig,
    handles: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
}

impl OrderSystem {
    /// Starts a system on the system clock, with a file snapshot when
    /// `data_dir` is set and an in-memory one otherwise.
    pub fn new(config: SyncConfig) -> Result<Self, StoreError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let system = match &config.data_dir {
            Some(dir) => {
                let store = SnapshotStore::new(FileKv::open(dir)?);
                Self::start(config, store, clock, RecordingLedger::new())
            }
            None => Self::start(config, SnapshotStore::new(MemoryKv::new()), clock, RecordingLedger::new()),
        };
        Ok(system)
    }

    /// Starts every task over the given repository, clock and ledger.
    pub fn start<R: OrderRepository>(
        config: SyncConfig,
        repo: R,
        clock: Arc<dyn Clock>,
        ledger: impl PenaltyLedger,
    ) -> Self {
        info!("Starting order system");
        let broadcaster = Broadcaster::new(config.bus_capacity, config.replay_capacity);

        // 1. Countdown ticker
        let policy = config.policy();
        let (ticker, countdown_client) = CountdownTicker::new(
            config.mailbox_size,
            Arc::clone(&clock),
            policy.penalty_window,
            config.countdown_tick(),
        );
        // Pending orders reloaded from a file snapshot keep their countdown
        let pending: Vec<(String, i64)> = match repo.list() {
            Ok(orders) => orders
                .into_iter()
                .filter(|o| o.status == OrderStatus::Pending)
                .map(|o| (o.id, o.created_at))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not reload pending orders for the countdown");
                Vec::new()
            }
        };
        info!(count = pending.len(), "Tracking reloaded pending orders");
        let ticker = ticker.with_tracked(pending);
        let ticker_handle = tokio::spawn(ticker.run());

        // 2. Order service
        let next_order_id = || format!("order_{}", Uuid::new_v4().simple());
        let (service, order_client) = OrderService::new(
            config.mailbox_size,
            repo,
            broadcaster.clone(),
            clock,
            ledger,
            next_order_id,
        );
        let service = service
            .with_policy(policy)
            .with_countdown(countdown_client.clone());
        let service_handle = tokio::spawn(service.run());

        // 3. Stale order sweeper
        let sweeper = tokio::spawn(stale_order_sweeper(order_client.clone(), config.sweep_interval()));

        Self {
            order_client,
            countdown_client,
            broadcaster,
            config,
            handles: vec![service_handle, ticker_handle],
            sweeper,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Mounts a view with the configured simulated latency.
    pub async fn mount_view(&self, label: &str, scope: ViewScope) -> Result<OrderView, OrderError> {
        let view = OrderView::mount(label, self.order_client.clone(), &self.broadcaster, scope).await?;
        Ok(view.with_latency(self.config.simulated_latency()))
    }

    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");
        self.sweeper.abort();

        self.order_client.shutdown().await.map_err(|e| e.to_string())?;
        self.countdown_client.shutdown().await?;

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Actor task failed: {:?}", e);
                return Err(format!("Actor task failed: {:?}", e));
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}
