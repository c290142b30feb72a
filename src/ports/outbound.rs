//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use std::collections::HashSet;

use crate::domain::{BroadcastDraft, BroadcastEntry, DomainError, Event, ReminderTier};

/// Event/recipient store. Records are owned by the surrounding CRUD layer;
/// the core only reads them and commits flag/status/sent-marker mutations.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch all events still in active status.
    async fn active_events(&self) -> Result<Vec<Event>, DomainError>;

    /// Fetch every known user id (the reminder/broadcast audience).
    async fn all_user_ids(&self) -> Result<Vec<i64>, DomainError>;

    /// Fetch the user ids registered for one event.
    async fn registered_user_ids(&self, event_id: i64) -> Result<HashSet<i64>, DomainError>;

    /// Fetch the admin subset (receives completion notices).
    async fn admin_ids(&self) -> Result<Vec<i64>, DomainError>;

    /// Commit one tier into the event's fired set. Insert-only.
    async fn mark_tier_fired(&self, event_id: i64, tier: ReminderTier)
        -> Result<(), DomainError>;

    /// Commit the active -> completed status transition. Forward-only.
    async fn mark_completed(&self, event_id: i64) -> Result<(), DomainError>;

    /// Append a broadcast entry to the queue. Returns the new entry id.
    async fn enqueue_broadcast(&self, draft: BroadcastDraft) -> Result<i64, DomainError>;

    /// Oldest entry not yet marked sent, by creation order. None when the
    /// queue is empty.
    async fn oldest_pending_broadcast(&self) -> Result<Option<BroadcastEntry>, DomainError>;

    /// Commit the sent marker. The entry is never reconsidered afterwards.
    async fn mark_broadcast_sent(&self, entry_id: i64) -> Result<(), DomainError>;
}

/// Message transport. One operation per payload kind; any error means
/// "this recipient's delivery failed" and the caller continues. Transport
/// timeouts are owned by the implementation.
#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    /// Send plain text. `register_event` attaches the registration control
    /// for that event (unregistered recipients only).
    async fn send_text(
        &self,
        user_id: i64,
        text: &str,
        register_event: Option<i64>,
    ) -> Result<(), DomainError>;

    async fn send_photo(&self, user_id: i64, file_id: &str, caption: &str)
        -> Result<(), DomainError>;

    async fn send_voice(&self, user_id: i64, file_id: &str, caption: &str)
        -> Result<(), DomainError>;

    /// Video notes carry no caption.
    async fn send_video_note(&self, user_id: i64, file_id: &str) -> Result<(), DomainError>;

    async fn send_video(&self, user_id: i64, file_id: &str, caption: &str)
        -> Result<(), DomainError>;
}
