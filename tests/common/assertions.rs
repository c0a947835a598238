//! Event-driven waits for integration tests

use std::time::Duration;

use chunk_relay::Event;
use tokio::sync::broadcast;

/// Wait until an event matches `predicate`; `None` on timeout or closed channel
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Collect events until `count` of them match `predicate`
pub async fn collect_matching<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    count: usize,
    mut predicate: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut matched = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while matched.len() < count {
            match events.recv().await {
                Ok(event) if predicate(&event) => matched.push(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
    .await;
    matched
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
