//! Identity events.
//!
//! Every successful create, update, or delete performed by the engine raises
//! one [`Event`] naming the concrete type that changed. Events are handed to
//! an [`EventBridge`], the seam to whatever event bus the embedding
//! application runs.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Partition events
    /// Partition created.
    PartitionCreated,
    /// Partition removed.
    PartitionDeleted,

    // Agent events
    /// Agent created.
    AgentCreated,
    /// Agent updated.
    AgentUpdated,
    /// Agent removed.
    AgentDeleted,

    // User events
    /// User created.
    UserCreated,
    /// User updated.
    UserUpdated,
    /// User removed.
    UserDeleted,

    // Group events
    /// Group created.
    GroupCreated,
    /// Group updated.
    GroupUpdated,
    /// Group removed.
    GroupDeleted,

    // Role events
    /// Role created.
    RoleCreated,
    /// Role updated.
    RoleUpdated,
    /// Role removed.
    RoleDeleted,

    // Relationship events
    /// Relationship created.
    RelationshipCreated,
    /// Relationship attributes updated.
    RelationshipUpdated,
    /// Relationship removed.
    RelationshipDeleted,

    // Credential events
    /// Credential record appended to a history.
    CredentialStored,
    /// Credential history purged for an agent.
    CredentialsRemoved,
}

impl EventType {
    /// Returns whether the event records a removal.
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        matches!(
            self,
            Self::PartitionDeleted
                | Self::AgentDeleted
                | Self::UserDeleted
                | Self::GroupDeleted
                | Self::RoleDeleted
                | Self::RelationshipDeleted
                | Self::CredentialsRemoved
        )
    }
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A change notification raised by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Partition the change happened in, when partition-scoped.
    pub partition_id: Option<Uuid>,

    /// Id of the entity that changed.
    pub entity_id: Option<Uuid>,

    /// Caller recorded in the ambient context.
    pub caller: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Looks up a detail value by key.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
#[derive(Debug)]
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    partition_id: Option<Uuid>,
    entity_id: Option<Uuid>,
    caller: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            partition_id: None,
            entity_id: None,
            caller: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the partition ID.
    #[must_use]
    pub const fn partition(mut self, partition_id: Uuid) -> Self {
        self.partition_id = Some(partition_id);
        self
    }

    /// Sets the entity ID.
    #[must_use]
    pub const fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Sets the caller, if one is known.
    #[must_use]
    pub fn caller(mut self, caller: Option<&str>) -> Self {
        self.caller = caller.map(str::to_string);
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            partition_id: self.partition_id,
            entity_id: self.entity_id,
            caller: self.caller,
            error: self.error,
            details: self.details,
        }
    }
}

// ============================================================================
// Event Bridges
// ============================================================================

/// Publishes engine events to an external consumer.
///
/// Raising an event never fails the operation that produced it.
pub trait EventBridge: Send + Sync + std::fmt::Debug {
    /// Publishes an event.
    fn raise(&self, event: Event);
}

/// Event bridge that writes to the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventBridge;

impl TracingEventBridge {
    /// Creates a new tracing bridge.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventBridge for TracingEventBridge {
    fn raise(&self, event: Event) {
        tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            outcome = ?event.outcome,
            partition_id = ?event.partition_id,
            entity_id = ?event.entity_id,
            caller = ?event.caller,
            error = ?event.error,
            "identity_event"
        );
    }
}

/// In-memory event bridge for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventBridge {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventBridge {
    /// Creates a new in-memory bridge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all raised events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the types of all raised events, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }

    /// Clears all raised events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventBridge for InMemoryEventBridge {
    fn raise(&self, event: Event) {
        self.events.write().push(event);
    }
}
