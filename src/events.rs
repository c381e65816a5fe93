//! Lifecycle event fan-out
//!
//! Events are raised on the worker thread and consumed anywhere. The bus holds
//! two bounded broadcast channels: one for lifecycle events and one for
//! per-chunk [`Event::Progress`] updates. Emitting never waits for subscribers,
//! every subscriber sees its channel's events in emission order, and a
//! subscriber that falls more than the channel capacity behind skips ahead (it
//! is told how many it missed). Progress traffic cannot evict lifecycle events.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::types::Event;

/// Broadcast channels for [`Event`]s with any number of subscribers
#[derive(Clone, Debug)]
pub struct EventBus {
    lifecycle: broadcast::Sender<Event>,
    progress: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber and channel
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (lifecycle, _rx) = broadcast::channel(capacity);
        let (progress, _rx) = broadcast::channel(capacity);
        Self {
            lifecycle,
            progress,
        }
    }

    /// Publish an event to all current subscribers of its channel
    pub fn emit(&self, event: Event) {
        let tx = match event {
            Event::Progress { .. } => &self.progress,
            _ => &self.lifecycle,
        };
        // send() only fails when nobody is subscribed
        tx.send(event).ok();
    }

    /// Receive every lifecycle event emitted from now on
    ///
    /// Progress updates are not included, see [`EventBus::subscribe_progress`].
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.lifecycle.subscribe()
    }

    /// Receive every [`Event::Progress`] emitted from now on
    pub fn subscribe_progress(&self) -> broadcast::Receiver<Event> {
        self.progress.subscribe()
    }

    /// Number of live lifecycle subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lifecycle.receiver_count()
    }

    /// Run `handler` for every lifecycle event on the caller's tokio runtime
    ///
    /// The handler executes on a task spawned where `listen` was called, so it
    /// never runs on the worker thread. The task ends when the bus is dropped or
    /// the returned handle is aborted.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use http_dl::{EventBus, Event};
    /// # async fn example(bus: EventBus) {
    /// let handle = bus.listen(|event| {
    ///     if let Event::Succeeded { task } = event {
    ///         println!("{} is done", task.display_name());
    ///     }
    /// });
    /// # handle.abort();
    /// # }
    /// ```
    pub fn listen<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged behind, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
