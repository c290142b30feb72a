//! Reminder evaluation: tier windows, completion transition, admin notices.
//!
//! - Walks the tiers longest lead first and fires every window that newly
//!   matches; a delayed scan can land inside more than one window
//! - The fired-tier commit happens only after the fan-out attempt; commit
//!   failures propagate so the next scan retries the tier
//! - Delivery failures are consumed inside the fan-out and never block the
//!   flag update

use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use crate::domain::{DomainError, Event, EventStatus, ReminderTier};
use crate::ports::{EventStore, MessageSender};
use crate::usecases::fanout::Fanout;

/// Reminder service. Scans active events and dispatches due notifications.
pub struct ReminderService {
    store: Arc<dyn EventStore>,
    sender: Arc<dyn MessageSender>,
    fanout: Fanout,
}

impl ReminderService {
    pub fn new(store: Arc<dyn EventStore>, sender: Arc<dyn MessageSender>, fanout: Fanout) -> Self {
        Self {
            store,
            sender,
            fanout,
        }
    }

    /// Scan every active event once against the host clock. Store errors
    /// abort the scan and propagate to the scheduler's error log.
    pub async fn scan_once(&self) -> Result<(), DomainError> {
        self.scan_at(chrono::Local::now().naive_local()).await
    }

    /// Scan with an injected clock.
    pub async fn scan_at(&self, now: NaiveDateTime) -> Result<(), DomainError> {
        let events = self.store.active_events().await?;
        if events.is_empty() {
            debug!("no active events");
            return Ok(());
        }
        for event in &events {
            self.evaluate(event, now).await?;
        }
        Ok(())
    }

    /// Evaluate one event: fire newly-due tiers, then the completion check.
    pub async fn evaluate(&self, event: &Event, now: NaiveDateTime) -> Result<(), DomainError> {
        let diff = event.event_date - now;

        for tier in ReminderTier::ALL {
            if event.fired_tiers.contains(tier) {
                continue;
            }
            let lead = tier.lead_time();
            if diff <= lead && diff > lead - TimeDelta::hours(2) {
                self.fire_tier(event, tier, diff).await?;
            }
        }

        if event.status == EventStatus::Active && now > event.event_date + TimeDelta::hours(1) {
            self.complete_event(event).await?;
        }

        Ok(())
    }

    /// Deliver one tier's reminder to all users, then commit the tier into
    /// the fired set. Registered users get the plain message; everyone
    /// else gets the call-to-action and the registration control.
    async fn fire_tier(
        &self,
        event: &Event,
        tier: ReminderTier,
        diff: TimeDelta,
    ) -> Result<(), DomainError> {
        let registered = self.store.registered_user_ids(event.id).await?;
        let recipients = self.store.all_user_ids().await?;
        let body = render_reminder(event, diff);
        let event_id = event.id;

        let sender = Arc::clone(&self.sender);
        let report = self
            .fanout
            .dispatch(&recipients, |user_id| {
                let sender = Arc::clone(&sender);
                let is_registered = registered.contains(&user_id);
                let text = if is_registered {
                    body.clone()
                } else {
                    format!("{body}\n\nWant to register?")
                };
                async move {
                    let register_event = (!is_registered).then_some(event_id);
                    sender.send_text(user_id, &text, register_event).await
                }
            })
            .await;

        info!(
            event_id,
            tier = tier.as_str(),
            sent = report.sent,
            failed = report.failed,
            "reminder fan-out complete"
        );

        // The flag records "this tier was attempted", not "everyone
        // received it".
        self.store.mark_tier_fired(event.id, tier).await?;
        Ok(())
    }

    /// Notify every admin, then commit the active -> completed transition.
    async fn complete_event(&self, event: &Event) -> Result<(), DomainError> {
        let admins = self.store.admin_ids().await?;
        let summary = render_completion(event);

        let sender = Arc::clone(&self.sender);
        let report = self
            .fanout
            .dispatch(&admins, |admin_id| {
                let sender = Arc::clone(&sender);
                let summary = summary.clone();
                async move { sender.send_text(admin_id, &summary, None).await }
            })
            .await;

        self.store.mark_completed(event.id).await?;
        info!(
            event_id = event.id,
            name = %event.name,
            admins_notified = report.sent,
            "event marked completed"
        );
        Ok(())
    }
}

/// Reminder body shown to every recipient.
fn render_reminder(event: &Event, diff: TimeDelta) -> String {
    format!(
        "Event: {}\n\n{}\n\nDate: {}\n\nStarts in {}!",
        event.name,
        event.description,
        event.event_date.format("%d.%m.%Y %H:%M"),
        format_lead_time(diff)
    )
}

/// Completion summary sent to admins.
fn render_completion(event: &Event) -> String {
    format!(
        "Event finished!\n\nName: {}\n\nDate: {}\n\nDescription: {}",
        event.name,
        event.event_date.format("%d.%m.%Y %H:%M"),
        event.description
    )
}

/// Humanize the remaining time: days and hours when present, minutes only
/// when less than one day remains.
fn format_lead_time(diff: TimeDelta) -> String {
    let days = diff.num_days();
    let hours = diff.num_hours() - days * 24;
    let minutes = diff.num_minutes() - diff.num_hours() * 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{} day{}", days, plural(days)));
    }
    if hours > 0 {
        parts.push(format!("{} hour{}", hours, plural(hours)));
    }
    if days == 0 && minutes > 0 {
        parts.push(format!("{} minute{}", minutes, plural(minutes)));
    }
    parts.join(", ")
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}
