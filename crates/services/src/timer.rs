//! Display-only elapsed time ticker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use quiz_core::Clock;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Publishes whole seconds elapsed since `started_at` on a watch channel.
///
/// The ticker task stops on [`stop`](Self::stop) or when the timer is dropped.
pub struct QuizTimer {
    handle: JoinHandle<()>,
    elapsed: watch::Receiver<u64>,
}

impl QuizTimer {
    /// Start ticking every `period`. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(started_at: DateTime<Utc>, clock: Clock, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (tx, elapsed) = watch::channel(elapsed_secs(started_at, clock));
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if tx.send(elapsed_secs(started_at, clock)).is_err() {
                    break;
                }
            }
        });
        Self { handle, elapsed }
    }

    /// Latest published value.
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        *self.elapsed.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn elapsed_secs(started_at: DateTime<Utc>, clock: Clock) -> u64 {
    u64::try_from((clock.now() - started_at).num_seconds()).unwrap_or(0)
}

/// Render seconds as `HH:MM:SS`. Hours keep growing past 99.
#[must_use]
pub fn format_elapsed(secs: u64) -> String {
    let (hours, rest) = (secs / 3600, secs % 3600);
    format!("{hours:02}:{:02}:{:02}", rest / 60, rest % 60)
}
