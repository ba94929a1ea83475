//! Test utilities for Switchyard agents
//!
//! Probes that stand in for agents on the bus, scripted work for role workers,
//! a small system harness and assertion helpers shared by the integration tests.

use std::future::Future;
use std::time::{Duration, Instant};

pub use assertions::*;
pub use probe::*;
pub use scripted_work::*;
pub use test_system::*;

mod assertions;
mod probe;
mod scripted_work;
mod test_system;

/// Default time tests wait for the system to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

/// Install a test-writer tracing subscriber; repeated calls are harmless
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
