//! Domain entities. Pure data structures for the core business.
//!
//! No Telegram/IO types here — these are mapped from adapters.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// One reminder lead-time bucket. Evaluation walks [`ReminderTier::ALL`]
/// longest lead first; each tier fires at most once per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderTier {
    Week,
    ThreeDays,
    Day,
    SevenHours,
    FourHours,
}

impl ReminderTier {
    /// All tiers, longest lead time first. The evaluation order is fixed.
    pub const ALL: [ReminderTier; 5] = [
        ReminderTier::Week,
        ReminderTier::ThreeDays,
        ReminderTier::Day,
        ReminderTier::SevenHours,
        ReminderTier::FourHours,
    ];

    /// Lead time before the event date at which this tier becomes due.
    pub fn lead_time(self) -> TimeDelta {
        match self {
            ReminderTier::Week => TimeDelta::days(7),
            ReminderTier::ThreeDays => TimeDelta::days(3),
            ReminderTier::Day => TimeDelta::hours(24),
            ReminderTier::SevenHours => TimeDelta::hours(7),
            ReminderTier::FourHours => TimeDelta::hours(4),
        }
    }

    /// Stable identifier used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderTier::Week => "week",
            ReminderTier::ThreeDays => "three-days",
            ReminderTier::Day => "day",
            ReminderTier::SevenHours => "seven-hours",
            ReminderTier::FourHours => "four-hours",
        }
    }

    fn bit(self) -> u8 {
        match self {
            ReminderTier::Week => 1 << 0,
            ReminderTier::ThreeDays => 1 << 1,
            ReminderTier::Day => 1 << 2,
            ReminderTier::SevenHours => 1 << 3,
            ReminderTier::FourHours => 1 << 4,
        }
    }
}

/// Tiers already fired for an event. Insert-only bitset; membership never
/// reverts once set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSet(u8);

impl TierSet {
    pub fn empty() -> Self {
        Self(0)
    }

    /// Rebuild from the storage representation.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Storage representation (one bit per tier).
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, tier: ReminderTier) -> bool {
        self.0 & tier.bit() != 0
    }

    pub fn insert(&mut self, tier: ReminderTier) {
        self.0 |= tier.bit();
    }
}

/// Event lifecycle status. Cancelled events are deleted by the CRUD layer,
/// never represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Completed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EventStatus::Active),
            "completed" => Some(EventStatus::Completed),
            _ => None,
        }
    }
}

/// An upcoming (or just-finished) registration event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Naive wall-clock time; the host clock drives all comparisons.
    pub event_date: NaiveDateTime,
    pub status: EventStatus,
    pub fired_tiers: TierSet,
}

/// Media payload kinds deliverable through the message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Voice,
    VideoNote,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Voice => "voice",
            MediaKind::VideoNote => "video_note",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(MediaKind::Photo),
            "voice" => Some(MediaKind::Voice),
            "video_note" => Some(MediaKind::VideoNote),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Reference to server-side media (Telegram file id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub file_id: String,
    pub kind: MediaKind,
}

/// One queued admin-authored message awaiting its single delivery pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEntry {
    pub id: i64,
    pub text: Option<String>,
    pub media: Option<MediaAttachment>,
    pub sent: bool,
}

/// Payload for enqueueing a broadcast (the admin-facing side of the queue).
#[derive(Debug, Clone, Default)]
pub struct BroadcastDraft {
    pub text: Option<String>,
    pub media: Option<MediaAttachment>,
}
