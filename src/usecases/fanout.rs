//! Bounded concurrent delivery of one message to many recipients.
//!
//! One spawned task per recipient, gated by a shared semaphore and awaited
//! to completion before the call returns. Failures are isolated per
//! recipient: logged, counted, never propagated.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::domain::DomainError;
use crate::shared::config::DEFAULT_FANOUT_CONCURRENCY;

/// Outcome of one fan-out pass. Partial failure is not an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub sent: usize,
    pub failed: usize,
}

/// Fan-out dispatcher with a fixed in-flight cap.
#[derive(Debug, Clone)]
pub struct Fanout {
    concurrency: usize,
}

impl Fanout {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Deliver to every recipient with at most `concurrency` sends in
    /// flight. `send_one` builds the (possibly recipient-specific)
    /// delivery future; the future is not polled until a permit is held.
    /// Ordering between recipients is not guaranteed.
    pub async fn dispatch<F, Fut>(&self, recipients: &[i64], send_one: F) -> FanoutReport
    where
        F: Fn(i64) -> Fut,
        Fut: Future<Output = Result<(), DomainError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for &user_id in recipients {
            let sem = Arc::clone(&semaphore);
            let delivery = send_one(user_id);
            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                match delivery.await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(user_id, error = %e, "delivery failed");
                        false
                    }
                }
            });
        }

        let mut report = FanoutReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.sent += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "delivery task aborted");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn counts_successes_and_failures() {
        let fanout = Fanout::new(4);
        let recipients = [1, 2, 3, 4, 5];

        let report = fanout
            .dispatch(&recipients, |user_id| async move {
                if user_id == 3 {
                    Err(DomainError::Sender("forbidden: bot blocked".into()))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn one_failing_recipient_does_not_stop_the_rest() {
        let fanout = Fanout::new(1);
        let delivered = Arc::new(AtomicUsize::new(0));
        let recipients = [10, 20, 30, 40, 50];

        let report = fanout
            .dispatch(&recipients, |user_id| {
                let delivered = Arc::clone(&delivered);
                async move {
                    if user_id == 30 {
                        return Err(DomainError::Sender("timeout".into()));
                    }
                    delivered.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(delivered.load(Ordering::SeqCst), 4);
        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn in_flight_sends_never_exceed_the_cap() {
        let fanout = Fanout::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let recipients: Vec<i64> = (1..=10).collect();

        let report = fanout
            .dispatch(&recipients, |_user_id| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), DomainError>(())
                }
            })
            .await;

        assert_eq!(report.sent, 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_recipient_list_is_a_no_op() {
        let fanout = Fanout::default();
        let report = fanout
            .dispatch(&[], |_| async { Ok::<(), DomainError>(()) })
            .await;
        assert_eq!(report, FanoutReport::default());
    }
}
