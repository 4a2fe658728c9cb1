//! Store query filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageStatus, MessageType};

/// Filter over coaching messages. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQuery {
    pub user_id: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<MessageStatus>,
    pub message_type: Option<MessageType>,
    /// Keep messages created at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub scheduled_at_or_before: Option<DateTime<Utc>>,
    pub scheduled_after: Option<DateTime<Utc>>,
    /// Keep messages without expiry or expiring after this instant.
    pub not_expired_at: Option<DateTime<Utc>>,
    /// Keep messages created or scheduled at or after this instant.
    pub active_since: Option<DateTime<Utc>>,
}

impl MessageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = MessageStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn created_since(mut self, at: DateTime<Utc>) -> Self {
        self.created_since = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn scheduled_at_or_before(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at_or_before = Some(at);
        self
    }

    pub fn scheduled_after(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_after = Some(at);
        self
    }

    pub fn not_expired_at(mut self, at: DateTime<Utc>) -> Self {
        self.not_expired_at = Some(at);
        self
    }

    pub fn active_since(mut self, at: DateTime<Utc>) -> Self {
        self.active_since = Some(at);
        self
    }
}

/// Result ordering for message queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSort {
    /// Priority descending, then scheduled time ascending.
    DeliveryOrder,
    /// Creation time descending.
    #[default]
    NewestFirst,
    /// Scheduled time ascending.
    ScheduledAsc,
}

/// Filter over templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateQuery {
    pub message_type: Option<MessageType>,
    pub active_only: bool,
}

impl TemplateQuery {
    pub fn active_for(message_type: MessageType) -> Self {
        Self {
            message_type: Some(message_type),
            active_only: true,
        }
    }

    pub fn all_active() -> Self {
        Self {
            message_type: None,
            active_only: true,
        }
    }
}

/// Page of results with the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
