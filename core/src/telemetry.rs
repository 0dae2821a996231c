// Tracing setup shared by hosts embedding the orchestrator
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,parley_core=info,chat_agent=info";

/// Install a global fmt subscriber driven by `RUST_LOG`.
///
/// Returns false when a subscriber was already installed (e.g. by a test harness).
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
