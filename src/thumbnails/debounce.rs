//! Debounce timers for load requests.
//!
//! A timer is a spawned sleep that posts a message to the engine's event
//! channel when it elapses. Dropping the [`PendingTimer`] cancels it, so an
//! Item that leaves the pending state simply lets go of its handle.

use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::trace;

/// Handle to a scheduled delay. Cancels the delay when dropped.
#[derive(Debug)]
pub struct PendingTimer {
    handle: AbortHandle,
}

impl PendingTimer {
    /// Cancel explicitly. Same effect as dropping.
    pub fn cancel(self) {}
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Post `message` to `events` once `delay` has elapsed without the returned
/// handle being dropped.
///
/// Must be called from within a tokio runtime. A cancellation racing with
/// expiry may still deliver the message, so receivers tag messages with a
/// generation and ignore stale ones.
pub fn schedule<M>(events: &flume::Sender<M>, message: M, delay: Duration) -> PendingTimer
where
    M: Send + 'static,
{
    let events = events.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if events.send(message).is_err() {
            trace!("Debounce fired after the event loop went away");
        }
    });
    PendingTimer {
        handle: task.abort_handle(),
    }
}
