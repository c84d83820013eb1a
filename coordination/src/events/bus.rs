//! Event bus for debate engine events
//!
//! Pub/sub over a Tokio broadcast channel. Publishing never blocks and
//! never fails for lack of subscribers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ProposalEvent;
use crate::config::DEFAULT_EVENT_CAPACITY;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),
}

impl From<broadcast::error::RecvError> for EventBusError {
    fn from(err: broadcast::error::RecvError) -> Self {
        match err {
            broadcast::error::RecvError::Closed => Self::ChannelClosed,
            broadcast::error::RecvError::Lagged(n) => Self::Lagged(n),
        }
    }
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
pub struct EventBus {
    sender: broadcast::Sender<ProposalEvent>,
}

impl EventBus {
    /// Create a new event bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an event bus holding up to `capacity` undelivered events
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ProposalEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ProposalEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by proposal ID
    pub proposal_id: Option<String>,
    /// Filter by project ID
    pub project_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by proposal ID
    pub fn proposal(mut self, proposal_id: &str) -> Self {
        self.proposal_id = Some(proposal_id.to_string());
        self
    }

    /// Filter by project ID
    pub fn project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ProposalEvent) -> bool {
        if let Some(ref pid) = self.proposal_id {
            if event.proposal_id() != pid {
                return false;
            }
        }

        if let Some(ref pid) = self.project_id {
            if event.project_id() != pid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<ProposalEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<ProposalEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> EventBusResult<ProposalEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StatusChange;
    use crate::proposal::ProposalStatus;
    use chrono::Utc;

    fn round_opened(proposal: &str, project: &str) -> ProposalEvent {
        ProposalEvent::RoundOpened {
            proposal_id: proposal.to_string(),
            project_id: project.to_string(),
            round: 2,
            timestamp: Utc::now(),
        }
    }

    fn status_changed(proposal: &str, project: &str) -> ProposalEvent {
        ProposalEvent::StatusChanged(StatusChange {
            proposal_id: proposal.to_string(),
            project_id: project.to_string(),
            from: ProposalStatus::Debating,
            to: ProposalStatus::Consensus,
            reason: "converged".to_string(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(round_opened("p-1", "proj"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "round_opened");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        bus.publish(round_opened("p-1", "proj"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(status_changed("p-1", "proj"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .project("proj")
            .types(vec!["status_changed"]);

        assert!(filter.matches(&status_changed("p-1", "proj")));
        assert!(!filter.matches(&status_changed("p-1", "other")));
        assert!(!filter.matches(&round_opened("p-1", "proj")));
        assert!(EventFilter::new().matches(&round_opened("p-9", "x")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().proposal("target"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(round_opened("other", "proj"));
            publisher.publish(status_changed("target", "proj"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.proposal_id(), "target");
        assert_eq!(event.event_type(), "status_changed");
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_gap() {
        let bus = EventBus::with_capacity(1);
        let mut filtered = bus.subscribe_filtered(EventFilter::new());
        bus.publish(round_opened("p-1", "proj"));
        bus.publish(round_opened("p-2", "proj"));

        let err = filtered.recv().await.unwrap_err();
        assert!(matches!(err, EventBusError::Lagged(1)));
    }
}
