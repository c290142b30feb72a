//! Broadcast queue draining: one entry per trigger, full-audience fan-out.
//!
//! Draining a single entry per scheduled slot caps how many broadcasts a
//! user can receive in one slot, even when several are queued.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{BroadcastEntry, DomainError, MediaKind};
use crate::ports::{EventStore, MessageSender};
use crate::usecases::fanout::Fanout;

/// Broadcast service. Delivers queued admin broadcasts to the full user set.
pub struct BroadcastService {
    store: Arc<dyn EventStore>,
    sender: Arc<dyn MessageSender>,
    fanout: Fanout,
}

impl BroadcastService {
    pub fn new(store: Arc<dyn EventStore>, sender: Arc<dyn MessageSender>, fanout: Fanout) -> Self {
        Self {
            store,
            sender,
            fanout,
        }
    }

    /// Deliver the oldest pending entry to every user, then mark it sent.
    /// The sent marker is committed exactly once regardless of
    /// per-recipient delivery outcomes; an empty queue is a no-op.
    pub async fn drain_one(&self) -> Result<(), DomainError> {
        let Some(entry) = self.store.oldest_pending_broadcast().await? else {
            debug!("broadcast queue empty");
            return Ok(());
        };

        if entry.text.is_none() && entry.media.is_none() {
            // A malformed row must not wedge the queue head.
            warn!(entry_id = entry.id, "broadcast entry has no payload; marking sent");
            self.store.mark_broadcast_sent(entry.id).await?;
            return Ok(());
        }

        let recipients = self.store.all_user_ids().await?;
        let sender = Arc::clone(&self.sender);
        let payload = Arc::new(entry.clone());

        let report = self
            .fanout
            .dispatch(&recipients, |user_id| {
                let sender = Arc::clone(&sender);
                let entry = Arc::clone(&payload);
                async move { deliver(sender.as_ref(), user_id, &entry).await }
            })
            .await;

        self.store.mark_broadcast_sent(entry.id).await?;
        info!(
            entry_id = entry.id,
            sent = report.sent,
            failed = report.failed,
            "broadcast drained"
        );
        Ok(())
    }
}

/// Dispatch one entry to one recipient by media kind.
async fn deliver(
    sender: &dyn MessageSender,
    user_id: i64,
    entry: &BroadcastEntry,
) -> Result<(), DomainError> {
    let caption = entry.text.as_deref().unwrap_or("");
    match &entry.media {
        None => sender.send_text(user_id, caption, None).await,
        Some(media) => match media.kind {
            MediaKind::Photo => sender.send_photo(user_id, &media.file_id, caption).await,
            MediaKind::Voice => sender.send_voice(user_id, &media.file_id, caption).await,
            MediaKind::VideoNote => sender.send_video_note(user_id, &media.file_id).await,
            MediaKind::Video => sender.send_video(user_id, &media.file_id, caption).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BroadcastDraft, MediaAttachment};
    use crate::usecases::testing::{MockSender, MockStore};
    use std::collections::HashSet;

    fn service(store: Arc<MockStore>, sender: Arc<MockSender>) -> BroadcastService {
        BroadcastService::new(store, sender, Fanout::new(4))
    }

    fn text_draft(text: &str) -> BroadcastDraft {
        BroadcastDraft {
            text: Some(text.to_string()),
            media: None,
        }
    }

    #[tokio::test]
    async fn drains_exactly_one_entry_per_call_in_fifo_order() {
        let store = Arc::new(MockStore {
            users: vec![1, 2],
            ..Default::default()
        });
        for text in ["first", "second", "third"] {
            store.enqueue_broadcast(text_draft(text)).await.unwrap();
        }
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        {
            let queue = store.queue.lock().unwrap();
            assert!(queue[0].sent);
            assert!(!queue[1].sent);
            assert!(!queue[2].sent);
        }
        let bodies: Vec<_> = sender
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.body.clone())
            .collect();
        assert_eq!(bodies, vec!["first", "first"]);

        svc.drain_one().await.unwrap();
        let queue = store.queue.lock().unwrap();
        assert!(queue[1].sent);
        assert!(!queue[2].sent);
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let store = Arc::new(MockStore {
            users: vec![1, 2],
            ..Default::default()
        });
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn media_entries_dispatch_by_kind() {
        let store = Arc::new(MockStore {
            users: vec![5],
            ..Default::default()
        });
        store
            .enqueue_broadcast(BroadcastDraft {
                text: Some("see the poster".to_string()),
                media: Some(MediaAttachment {
                    file_id: "AgACAgIAAxkB".to_string(),
                    kind: MediaKind::Photo,
                }),
            })
            .await
            .unwrap();
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "photo");
        assert_eq!(sent[0].body, "see the poster");
        assert_eq!(sent[0].file_id.as_deref(), Some("AgACAgIAAxkB"));
    }

    #[tokio::test]
    async fn video_notes_go_out_without_caption() {
        let store = Arc::new(MockStore {
            users: vec![5],
            ..Default::default()
        });
        store
            .enqueue_broadcast(BroadcastDraft {
                text: Some("ignored".to_string()),
                media: Some(MediaAttachment {
                    file_id: "DQACAgIAAxkB".to_string(),
                    kind: MediaKind::VideoNote,
                }),
            })
            .await
            .unwrap();
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent[0].kind, "video_note");
        assert_eq!(sent[0].body, "");
    }

    #[tokio::test]
    async fn delivery_failures_do_not_prevent_the_sent_marker() {
        let store = Arc::new(MockStore {
            users: vec![1, 2, 3],
            ..Default::default()
        });
        store.enqueue_broadcast(text_draft("promo")).await.unwrap();
        let sender = Arc::new(MockSender {
            fail_for: HashSet::from([2]),
            ..Default::default()
        });
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        assert!(store.queue.lock().unwrap()[0].sent);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn payload_less_entry_is_marked_sent_without_deliveries() {
        let store = Arc::new(MockStore {
            users: vec![1],
            ..Default::default()
        });
        store
            .enqueue_broadcast(BroadcastDraft::default())
            .await
            .unwrap();
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        svc.drain_one().await.unwrap();

        assert!(store.queue.lock().unwrap()[0].sent);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn marker_commit_failure_propagates() {
        let store = Arc::new(MockStore {
            users: vec![1],
            fail_commits: true,
            ..Default::default()
        });
        store.enqueue_broadcast(text_draft("promo")).await.unwrap();
        let sender = Arc::new(MockSender::default());
        let svc = service(Arc::clone(&store), Arc::clone(&sender));

        let err = svc.drain_one().await.unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
        assert!(!store.queue.lock().unwrap()[0].sent);
    }
}
