//! Notifier that only logs. Useful in development and dry runs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use coach_core::error::CoachResult;
use coach_core::traits::{Notification, Notifier};

#[derive(Debug, Default)]
pub struct LogNotifier {
    delivered: AtomicU64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications accepted so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> CoachResult<()> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            message_id = %notification.message_id,
            user_id = %notification.user_id,
            message_type = %notification.message_type,
            priority = %notification.priority,
            title = %notification.title,
            "Notification delivered to log"
        );
        Ok(())
    }
}
