use tracing::{error, info, warn, Instrument};

use order_sync::app_system::{setup_tracing, OrderSystem, SyncConfig};
use order_sync::domain::{Actor, OrderCreate, OrderItem, OrderStatus};
use order_sync::views::ViewScope;

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = SyncConfig::from_env().map_err(|e| e.to_string())?;
    info!(data_dir = ?config.data_dir, "Starting order sync demo");

    // Create the entire order system (starts all services)
    let system = OrderSystem::new(config).map_err(|e| e.to_string())?;

    let order = OrderCreate::new(
        "cust_alice",
        vec![OrderItem::new("Margherita", 12.5, 1), OrderItem::new("Lemonade", 3.0, 2)],
    )
    .with_vendor("vendor_luigi");

    let span = tracing::info_span!("order_placement");
    let placed = async {
        info!("Placing order");
        system.order_client.place_order(order).await.map_err(|e| e.to_string())
    }
    .instrument(span)
    .await?;
    info!(order_id = %placed.id, total = placed.total, "Order placed");

    // Two surfaces over the same snapshot
    let mut customer_view = system
        .mount_view("customer-orders", ViewScope::Customer("cust_alice".into()))
        .await
        .map_err(|e| e.to_string())?;
    let mut board = system
        .mount_view("rider-board", ViewScope::All)
        .await
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("delivery");
    async {
        board
            .request_transition(&placed.id, OrderStatus::Accepted, Actor::admin("adm_1"))
            .await
            .map_err(|e| e.to_string())?;
        board
            .request_transition(&placed.id, OrderStatus::Completed, Actor::rider("rider_7"))
            .await
            .map_err(|e| e.to_string())?;
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    customer_view.drain().await;
    board.drain().await;
    info!(
        customer_sees = ?customer_view.status_of(&placed.id),
        board_sees = ?board.status_of(&placed.id),
        "Views after delivery"
    );

    // A second order, cancelled by the customer
    let second = system
        .order_client
        .place_order(OrderCreate::new("cust_alice", vec![OrderItem::new("Tiramisu", 6.0, 1)]))
        .await
        .map_err(|e| e.to_string())?;
    match customer_view
        .request_transition(&second.id, OrderStatus::Cancelled, Actor::customer("cust_alice"))
        .await
    {
        Ok(outcome) => info!(
            order_id = %outcome.order.id,
            penalty = ?outcome.penalty,
            window = ?outcome.window,
            "Order cancelled"
        ),
        Err(e) => error!(error = %e, "Cancellation failed"),
    }

    // Cancelling twice is rejected by the lifecycle
    if let Err(e) = customer_view
        .request_transition(&second.id, OrderStatus::Cancelled, Actor::customer("cust_alice"))
        .await
    {
        warn!(error = %e, "Second cancellation rejected");
    }

    customer_view.drain().await;
    info!(badge = ?customer_view.badge(), "Customer badge");

    customer_view.unmount();
    board.unmount();

    // Shutdown system gracefully
    system.shutdown().await?;

    info!("Application completed successfully");
    Ok(())
}
