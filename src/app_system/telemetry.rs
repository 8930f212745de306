use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: service and bus at `info`, the
/// per-request client chatter hidden.
const DEFAULT_FILTER: &str = "info,order_sync::clients=warn";

/// Installs the global subscriber. A second call (another system in the
/// same process) keeps the first subscriber.
///
/// ```text
/// RUST_LOG=order_sync::sync=debug cargo run    # bus sequence numbers and replays
/// RUST_LOG=order_sync::order_actor=debug       # every service request
/// ```
pub fn setup_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_target(true)
        .compact()
        .try_init();
}
