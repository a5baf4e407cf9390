//! Waiting helpers for asynchronous pipeline outcomes

use debridarr::Event;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default upper bound for any single wait
pub const WAIT: Duration = Duration::from_secs(10);

/// Wait for the first event matching `predicate`
///
/// Returns `None` on timeout or if the channel closes.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                // Lagging only drops old progress events
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll `condition` every 20 ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
