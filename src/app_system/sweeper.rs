use std::time::Duration;

use tracing::{debug, error, info};

use crate::clients::OrderClient;

/// Periodically asks the order service to cancel stale pending orders.
///
/// Runs until the service goes away.
pub async fn stale_order_sweeper(order_client: OrderClient, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);
    info!(interval_secs = interval.as_secs(), "Stale order sweeper starting");

    loop {
        interval_timer.tick().await;
        match order_client.sweep_stale().await {
            Ok(cancelled) if cancelled.is_empty() => debug!("Sweep found no stale orders"),
            Ok(cancelled) => info!(cancelled = cancelled.len(), "Sweep cancelled stale orders"),
            Err(crate::error::OrderError::ActorCommunicationError(e)) => {
                info!(reason = %e, "Order service gone, sweeper stopping");
                break;
            }
            Err(e) => error!(error = %e, "Sweep failed"),
        }
    }
}
