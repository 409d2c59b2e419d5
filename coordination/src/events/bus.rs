//! Broadcast bus carrying [`DispatchEvent`]s
//!
//! Schedulers publish without ever waiting on a subscriber. A subscriber that
//! falls more than the bus capacity behind loses the oldest events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::DispatchEvent;

/// Events buffered per subscriber before the oldest are overwritten
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Every publisher is gone and the buffer is drained
    #[error("Event bus closed")]
    ChannelClosed,
}

pub type EventBusResult<T> = Result<T, EventBusError>;

/// Bus handle shared by the dispatcher and every scheduler it spawns
pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` is clamped to at least one event
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Hand `event` to current subscribers. Nobody listening is fine.
    pub fn publish(&self, event: DispatchEvent) {
        let event_type = event.event_type();
        let job_id = event.job_id().to_string();
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(event_type, job_id = %job_id, receivers, "Dispatch event");
    }

    /// Raw receiver seeing every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Narrows a subscription to one job and/or a set of event types.
///
/// An unset criterion matches everything; set criteria must all match.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events of this job
    pub job_id: Option<String>,
    /// Only these `event_type()` names, e.g. `"candidate_proposed"`
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &DispatchEvent) -> bool {
        let job_ok = self
            .job_id
            .as_deref()
            .is_none_or(|job_id| event.job_id() == job_id);
        let type_ok = self
            .event_types
            .as_ref()
            .is_none_or(|types| types.iter().any(|t| t == event.event_type()));
        job_ok && type_ok
    }
}

/// Receiver that silently skips events its filter rejects
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DispatchEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<DispatchEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next matching event. Events lost to lag are skipped, not reported.
    pub async fn recv(&mut self) -> EventBusResult<DispatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Dispatch event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

/// `subscribe_filtered` for both owned and shared buses
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}
