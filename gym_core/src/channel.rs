//! Side channels mirrored by the rest countdown.
//!
//! Both channels are best effort: the countdown never depends on them.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Handle to a countdown shown on an always-visible display surface
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DisplayHandle(pub String);

/// Always-visible surface (lock screen, tray, widget) showing the countdown
#[async_trait]
pub trait RestDisplay: Send + Sync {
    /// Show a countdown that started at `start` and lasts `duration`
    async fn register(&self, start: DateTime<Utc>, duration: Duration) -> Result<DisplayHandle>;

    /// Remove the countdown immediately
    async fn dismiss(&self, handle: DisplayHandle);
}

/// Local notification scheduler
pub trait Notifier: Send + Sync {
    fn schedule(&self, id: &str, fire_after: Duration, title: &str, body: &str) -> Result<()>;

    fn cancel(&self, id: &str);
}

/// Display that only writes to the log
#[derive(Debug, Default)]
pub struct LogDisplay {
    next: AtomicU64,
}

#[async_trait]
impl RestDisplay for LogDisplay {
    async fn register(&self, start: DateTime<Utc>, duration: Duration) -> Result<DisplayHandle> {
        let handle = DisplayHandle(format!("rest-{}", self.next.fetch_add(1, Ordering::Relaxed)));
        tracing::info!(
            "Rest display {} started at {} for {}s",
            handle.0,
            start.format("%H:%M:%S"),
            duration.as_secs()
        );
        Ok(handle)
    }

    async fn dismiss(&self, handle: DisplayHandle) {
        tracing::info!("Rest display {} dismissed", handle.0);
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn schedule(&self, id: &str, fire_after: Duration, title: &str, body: &str) -> Result<()> {
        tracing::info!(
            "Scheduled notification {} in {}s: {} - {}",
            id,
            fire_after.as_secs(),
            title,
            body
        );
        Ok(())
    }

    fn cancel(&self, id: &str) {
        tracing::debug!("Cancelled notification {}", id);
    }
}
