//! SQLite-backed event/recipient store via libsql. Implements EventStore.
//!
//! Single database file shared with the CRUD layer: users, events,
//! registrations, and the broadcast queue. The core only reads records and
//! commits flag/status/sent-marker mutations; everything else is seeded by
//! the surrounding application.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use libsql::{params, Connection, Database};
use tracing::info;

use crate::domain::{
    BroadcastDraft, BroadcastEntry, DomainError, Event, EventStatus, MediaAttachment, MediaKind,
    ReminderTier, TierSet,
};
use crate::ports::EventStore;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    is_admin INTEGER NOT NULL DEFAULT 0
)"#;

const EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    event_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    fired_tiers INTEGER NOT NULL DEFAULT 0
)"#;

const REGISTRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS registrations (
    user_id INTEGER NOT NULL,
    event_id INTEGER NOT NULL,
    registered_at TEXT NOT NULL,
    PRIMARY KEY (user_id, event_id)
)"#;

const BROADCAST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS broadcast_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT,
    media_id TEXT,
    media_kind TEXT,
    is_sent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)"#;

const BROADCAST_PENDING_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_broadcast_pending ON broadcast_queue (is_sent, id)";

/// SQLite store. One database file (events.db) in the given base directory.
pub struct SqliteStore {
    _db: Database,
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Connect to (or create) the SQLite database and ensure the schema
    /// exists. Call once at startup; the returned store is safe to share
    /// via Arc.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(|e| DomainError::Store(e.to_string()))?;
        let db_path = base.join("events.db");
        let path_str = db_path.to_string_lossy();
        Self::open(path_str.as_ref(), db_path.clone()).await
    }

    async fn open(path_str: &str, db_path: PathBuf) -> Result<Self, DomainError> {
        let db = libsql::Builder::new_local(path_str)
            .build()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let conn = db.connect().map_err(|e| DomainError::Store(e.to_string()))?;

        // WAL mode enables concurrent readers + one writer; the PRAGMA
        // returns a row, so query and drain it (execute fails when rows
        // are returned).
        let mut wal_rows = conn
            .query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DomainError::Store(format!("WAL pragma failed: {}", e)))?;
        while wal_rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
            .is_some()
        {}

        for ddl in [
            USERS_TABLE,
            EVENTS_TABLE,
            REGISTRATIONS_TABLE,
            BROADCAST_TABLE,
            BROADCAST_PENDING_INDEX,
        ] {
            conn.execute(ddl, ())
                .await
                .map_err(|e| DomainError::Store(e.to_string()))?;
        }

        info!(path = %db_path.display(), "SQLite store connected with WAL mode");

        Ok(Self {
            _db: db,
            conn,
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // ── Seeding surface (CRUD layer and tests; not part of the port) ────

    /// Insert a user, or update admin rights for an existing one.
    pub async fn add_user(&self, user_id: i64, is_admin: bool) -> Result<(), DomainError> {
        self.conn
            .execute(
                r#"
                INSERT INTO users (user_id, is_admin) VALUES (?1, ?2)
                ON CONFLICT (user_id) DO UPDATE SET is_admin = ?2
                "#,
                params![user_id, is_admin as i64],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    /// Insert an active event. Returns the new event id.
    pub async fn add_event(
        &self,
        name: &str,
        description: &str,
        event_date: NaiveDateTime,
    ) -> Result<i64, DomainError> {
        self.conn
            .execute(
                "INSERT INTO events (name, description, event_date) VALUES (?1, ?2, ?3)",
                params![
                    name,
                    description,
                    event_date.format(DATE_FORMAT).to_string()
                ],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Register a user for an event. Already-registered pairs are kept.
    pub async fn register_user(&self, user_id: i64, event_id: i64) -> Result<(), DomainError> {
        let registered_at = chrono::Local::now()
            .naive_local()
            .format(DATE_FORMAT)
            .to_string();
        self.conn
            .execute(
                r#"
                INSERT INTO registrations (user_id, event_id, registered_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (user_id, event_id) DO NOTHING
                "#,
                params![user_id, event_id, registered_at],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    fn row_to_event(row: &libsql::Row) -> Result<Event, DomainError> {
        let id: i64 = row.get(0).map_err(|e| DomainError::Store(e.to_string()))?;
        let name: String = row.get(1).map_err(|e| DomainError::Store(e.to_string()))?;
        let description: String = row.get::<String>(2).unwrap_or_default();
        let date_str: String = row.get(3).map_err(|e| DomainError::Store(e.to_string()))?;
        let event_date = NaiveDateTime::parse_from_str(&date_str, DATE_FORMAT)
            .map_err(|e| DomainError::Store(format!("bad event_date '{}': {}", date_str, e)))?;
        let status_str: String = row.get(4).map_err(|e| DomainError::Store(e.to_string()))?;
        let status = EventStatus::parse(&status_str)
            .ok_or_else(|| DomainError::Store(format!("unknown event status '{}'", status_str)))?;
        let fired: i64 = row.get(5).map_err(|e| DomainError::Store(e.to_string()))?;

        Ok(Event {
            id,
            name,
            description,
            event_date,
            status,
            fired_tiers: TierSet::from_bits(fired as u8),
        })
    }

    fn row_to_broadcast(row: &libsql::Row) -> Result<BroadcastEntry, DomainError> {
        let id: i64 = row.get(0).map_err(|e| DomainError::Store(e.to_string()))?;
        let text: Option<String> = row.get(1).ok();
        let media_id: Option<String> = row.get(2).ok();
        let media_kind: Option<String> = row.get(3).ok();
        let is_sent: i64 = row.get(4).map_err(|e| DomainError::Store(e.to_string()))?;

        let media = match (media_id, media_kind) {
            (Some(file_id), Some(kind_str)) => {
                let kind = MediaKind::parse(&kind_str).ok_or_else(|| {
                    DomainError::Store(format!("unknown media kind '{}'", kind_str))
                })?;
                Some(MediaAttachment { file_id, kind })
            }
            _ => None,
        };

        Ok(BroadcastEntry {
            id,
            text,
            media,
            sent: is_sent != 0,
        })
    }
}

#[async_trait::async_trait]
impl EventStore for SqliteStore {
    async fn active_events(&self) -> Result<Vec<Event>, DomainError> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, name, description, event_date, status, fired_tiers
                FROM events
                WHERE status = 'active'
                ORDER BY id
                "#,
                (),
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            events.push(Self::row_to_event(&row)?);
        }
        Ok(events)
    }

    async fn all_user_ids(&self) -> Result<Vec<i64>, DomainError> {
        let mut rows = self
            .conn
            .query("SELECT user_id FROM users ORDER BY user_id", ())
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            ids.push(row.get(0).map_err(|e| DomainError::Store(e.to_string()))?);
        }
        Ok(ids)
    }

    async fn registered_user_ids(&self, event_id: i64) -> Result<HashSet<i64>, DomainError> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id FROM registrations WHERE event_id = ?1",
                params![event_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut ids = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            ids.insert(row.get(0).map_err(|e| DomainError::Store(e.to_string()))?);
        }
        Ok(ids)
    }

    async fn admin_ids(&self) -> Result<Vec<i64>, DomainError> {
        let mut rows = self
            .conn
            .query("SELECT user_id FROM users WHERE is_admin = 1 ORDER BY user_id", ())
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            ids.push(row.get(0).map_err(|e| DomainError::Store(e.to_string()))?);
        }
        Ok(ids)
    }

    async fn mark_tier_fired(
        &self,
        event_id: i64,
        tier: ReminderTier,
    ) -> Result<(), DomainError> {
        let mut set = TierSet::empty();
        set.insert(tier);
        self.conn
            .execute(
                "UPDATE events SET fired_tiers = fired_tiers | ?1 WHERE id = ?2",
                params![set.bits() as i64, event_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn mark_completed(&self, event_id: i64) -> Result<(), DomainError> {
        self.conn
            .execute(
                "UPDATE events SET status = 'completed' WHERE id = ?1 AND status = 'active'",
                params![event_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn enqueue_broadcast(&self, draft: BroadcastDraft) -> Result<i64, DomainError> {
        let created_at = chrono::Local::now()
            .naive_local()
            .format(DATE_FORMAT)
            .to_string();
        let (media_id, media_kind) = match draft.media {
            Some(m) => (Some(m.file_id), Some(m.kind.as_str().to_string())),
            None => (None, None),
        };
        self.conn
            .execute(
                r#"
                INSERT INTO broadcast_queue (text, media_id, media_kind, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![draft.text, media_id, media_kind, created_at],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn oldest_pending_broadcast(&self) -> Result<Option<BroadcastEntry>, DomainError> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, text, media_id, media_kind, is_sent
                FROM broadcast_queue
                WHERE is_sent = 0
                ORDER BY id
                LIMIT 1
                "#,
                (),
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_to_broadcast(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_broadcast_sent(&self, entry_id: i64) -> Result<(), DomainError> {
        self.conn
            .execute(
                "UPDATE broadcast_queue SET is_sent = 1 WHERE id = ?1",
                params![entry_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn memory_store() -> SqliteStore {
        SqliteStore::open(":memory:", PathBuf::from(":memory:"))
            .await
            .unwrap()
    }

    fn date(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn events_round_trip_with_date_and_tiers() {
        let store = memory_store().await;
        let id = store
            .add_event("Workshop", "Practice day", date(20, 18))
            .await
            .unwrap();

        let events = store.active_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].name, "Workshop");
        assert_eq!(events[0].event_date, date(20, 18));
        assert_eq!(events[0].status, EventStatus::Active);
        assert_eq!(events[0].fired_tiers, TierSet::empty());
    }

    #[tokio::test]
    async fn mark_tier_fired_persists_and_accumulates() {
        let store = memory_store().await;
        let id = store.add_event("Workshop", "", date(20, 18)).await.unwrap();

        store
            .mark_tier_fired(id, ReminderTier::Week)
            .await
            .unwrap();
        store
            .mark_tier_fired(id, ReminderTier::Day)
            .await
            .unwrap();
        // Marking the same tier again is harmless.
        store
            .mark_tier_fired(id, ReminderTier::Week)
            .await
            .unwrap();

        let events = store.active_events().await.unwrap();
        let fired = events[0].fired_tiers;
        assert!(fired.contains(ReminderTier::Week));
        assert!(fired.contains(ReminderTier::Day));
        assert!(!fired.contains(ReminderTier::FourHours));
    }

    #[tokio::test]
    async fn completed_events_leave_the_active_query() {
        let store = memory_store().await;
        let id = store.add_event("Workshop", "", date(20, 18)).await.unwrap();

        store.mark_completed(id).await.unwrap();

        assert!(store.active_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_and_admin_queries() {
        let store = memory_store().await;
        store.add_user(1, false).await.unwrap();
        store.add_user(2, true).await.unwrap();
        store.add_user(3, false).await.unwrap();

        assert_eq!(store.all_user_ids().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.admin_ids().await.unwrap(), vec![2]);

        // Promotion is an upsert.
        store.add_user(3, true).await.unwrap();
        assert_eq!(store.admin_ids().await.unwrap(), vec![2, 3]);
    }

    #[tokio::test]
    async fn registrations_are_scoped_per_event() {
        let store = memory_store().await;
        let a = store.add_event("A", "", date(20, 18)).await.unwrap();
        let b = store.add_event("B", "", date(21, 18)).await.unwrap();
        store.add_user(1, false).await.unwrap();
        store.add_user(2, false).await.unwrap();
        store.register_user(1, a).await.unwrap();
        store.register_user(2, b).await.unwrap();

        assert_eq!(
            store.registered_user_ids(a).await.unwrap(),
            HashSet::from([1])
        );
        assert_eq!(
            store.registered_user_ids(b).await.unwrap(),
            HashSet::from([2])
        );
    }

    #[tokio::test]
    async fn broadcast_queue_is_fifo_and_sent_markers_stick() {
        let store = memory_store().await;
        for text in ["first", "second"] {
            store
                .enqueue_broadcast(BroadcastDraft {
                    text: Some(text.to_string()),
                    media: None,
                })
                .await
                .unwrap();
        }

        let oldest = store.oldest_pending_broadcast().await.unwrap().unwrap();
        assert_eq!(oldest.text.as_deref(), Some("first"));

        store.mark_broadcast_sent(oldest.id).await.unwrap();
        let next = store.oldest_pending_broadcast().await.unwrap().unwrap();
        assert_eq!(next.text.as_deref(), Some("second"));

        store.mark_broadcast_sent(next.id).await.unwrap();
        assert!(store.oldest_pending_broadcast().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn broadcast_media_round_trips() {
        let store = memory_store().await;
        store
            .enqueue_broadcast(BroadcastDraft {
                text: None,
                media: Some(MediaAttachment {
                    file_id: "DQACAgIAAxkB".to_string(),
                    kind: MediaKind::VideoNote,
                }),
            })
            .await
            .unwrap();

        let entry = store.oldest_pending_broadcast().await.unwrap().unwrap();
        assert!(entry.text.is_none());
        let media = entry.media.unwrap();
        assert_eq!(media.file_id, "DQACAgIAAxkB");
        assert_eq!(media.kind, MediaKind::VideoNote);
    }
}
