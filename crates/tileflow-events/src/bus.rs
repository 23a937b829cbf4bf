use std::collections::HashMap;
use std::sync::Mutex;

use tileflow_core::ProgressEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Per-tenant progress event bus
///
/// Each tenant gets its own broadcast channel with a bounded mailbox per
/// subscriber. Delivery is best-effort: a subscriber that falls behind by
/// more than the mailbox size loses its oldest undelivered events but keeps
/// its stream. Channels without subscribers are reaped on the next publish.
pub struct EventBus {
    mailbox_size: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl EventBus {
    pub fn new(mailbox_size: usize) -> Self {
        Self {
            // broadcast::channel panics on zero capacity
            mailbox_size: mailbox_size.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber for one tenant's events
    ///
    /// The returned receiver yields events in publish order. A lagged
    /// receiver observes `RecvError::Lagged` and then continues with the
    /// newest retained events; consumers skip over the lag marker.
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap();
        let sender = channels
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(self.mailbox_size).0);
        debug!(
            tenant_id,
            subscribers = sender.receiver_count() + 1,
            "event subscriber registered"
        );
        sender.subscribe()
    }

    /// Publish an event to every subscriber of the tenant
    ///
    /// Non-blocking. Publishing to a tenant with no subscribers drops the
    /// event and garbage-collects the channel.
    pub fn publish(&self, tenant_id: &str, event: ProgressEvent) {
        let mut channels = self.channels.lock().unwrap();
        let Some(sender) = channels.get(tenant_id) else {
            return;
        };
        if sender.receiver_count() == 0 {
            debug!(tenant_id, "reaping event channel with no subscribers");
            channels.remove(tenant_id);
            return;
        }
        // send only fails when all receivers dropped between the count
        // check and here; the channel is reaped on the next publish
        let _ = sender.send(event);
    }

    /// Number of live subscribers for a tenant
    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(tenant_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of tenants with an open channel
    pub fn tenant_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }
}
