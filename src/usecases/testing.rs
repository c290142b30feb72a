//! Recording port implementations shared by the use case tests.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::domain::{
    BroadcastDraft, BroadcastEntry, DomainError, Event, ReminderTier,
};
use crate::ports::{EventStore, MessageSender};

/// In-memory store. Mutations are recorded, not applied to `events`, so a
/// test inspects exactly what the service committed.
#[derive(Default)]
pub(crate) struct MockStore {
    pub events: Mutex<Vec<Event>>,
    pub users: Vec<i64>,
    pub registered: HashSet<i64>,
    pub admins: Vec<i64>,
    pub queue: Mutex<Vec<BroadcastEntry>>,
    pub fired: Mutex<Vec<(i64, ReminderTier)>>,
    pub completed: Mutex<Vec<i64>>,
    /// Number of active-event fetches (one per scan).
    pub scans: Mutex<usize>,
    /// Simulate a persistence failure on every commit.
    pub fail_commits: bool,
}

#[async_trait::async_trait]
impl EventStore for MockStore {
    async fn active_events(&self) -> Result<Vec<Event>, DomainError> {
        *self.scans.lock().unwrap() += 1;
        Ok(self.events.lock().unwrap().clone())
    }

    async fn all_user_ids(&self) -> Result<Vec<i64>, DomainError> {
        Ok(self.users.clone())
    }

    async fn registered_user_ids(&self, _event_id: i64) -> Result<HashSet<i64>, DomainError> {
        Ok(self.registered.clone())
    }

    async fn admin_ids(&self) -> Result<Vec<i64>, DomainError> {
        Ok(self.admins.clone())
    }

    async fn mark_tier_fired(
        &self,
        event_id: i64,
        tier: ReminderTier,
    ) -> Result<(), DomainError> {
        if self.fail_commits {
            return Err(DomainError::Store("disk I/O error".into()));
        }
        self.fired.lock().unwrap().push((event_id, tier));
        Ok(())
    }

    async fn mark_completed(&self, event_id: i64) -> Result<(), DomainError> {
        if self.fail_commits {
            return Err(DomainError::Store("disk I/O error".into()));
        }
        self.completed.lock().unwrap().push(event_id);
        Ok(())
    }

    async fn enqueue_broadcast(&self, draft: BroadcastDraft) -> Result<i64, DomainError> {
        let mut queue = self.queue.lock().unwrap();
        let id = queue.len() as i64 + 1;
        queue.push(BroadcastEntry {
            id,
            text: draft.text,
            media: draft.media,
            sent: false,
        });
        Ok(id)
    }

    async fn oldest_pending_broadcast(&self) -> Result<Option<BroadcastEntry>, DomainError> {
        Ok(self
            .queue
            .lock()
            .unwrap()
            .iter()
            .find(|e| !e.sent)
            .cloned())
    }

    async fn mark_broadcast_sent(&self, entry_id: i64) -> Result<(), DomainError> {
        if self.fail_commits {
            return Err(DomainError::Store("disk I/O error".into()));
        }
        let mut queue = self.queue.lock().unwrap();
        if let Some(entry) = queue.iter_mut().find(|e| e.id == entry_id) {
            entry.sent = true;
        }
        Ok(())
    }
}

/// One recorded delivery.
#[derive(Debug, Clone)]
pub(crate) struct SentMessage {
    pub user_id: i64,
    pub kind: &'static str,
    pub body: String,
    pub file_id: Option<String>,
    pub register_event: Option<i64>,
}

/// Sender that records successful deliveries and fails for the configured
/// recipients.
#[derive(Default)]
pub(crate) struct MockSender {
    pub sent: Mutex<Vec<SentMessage>>,
    pub fail_for: HashSet<i64>,
}

impl MockSender {
    fn record(
        &self,
        user_id: i64,
        kind: &'static str,
        body: &str,
        file_id: Option<&str>,
        register_event: Option<i64>,
    ) -> Result<(), DomainError> {
        if self.fail_for.contains(&user_id) {
            return Err(DomainError::Sender("forbidden: bot blocked".into()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            user_id,
            kind,
            body: body.to_string(),
            file_id: file_id.map(str::to_string),
            register_event,
        });
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageSender for MockSender {
    async fn send_text(
        &self,
        user_id: i64,
        text: &str,
        register_event: Option<i64>,
    ) -> Result<(), DomainError> {
        self.record(user_id, "text", text, None, register_event)
    }

    async fn send_photo(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        self.record(user_id, "photo", caption, Some(file_id), None)
    }

    async fn send_voice(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        self.record(user_id, "voice", caption, Some(file_id), None)
    }

    async fn send_video_note(&self, user_id: i64, file_id: &str) -> Result<(), DomainError> {
        self.record(user_id, "video_note", "", Some(file_id), None)
    }

    async fn send_video(
        &self,
        user_id: i64,
        file_id: &str,
        caption: &str,
    ) -> Result<(), DomainError> {
        self.record(user_id, "video", caption, Some(file_id), None)
    }
}
