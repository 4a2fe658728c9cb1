//! Notification transport trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoachResult;
use crate::types::{CoachingMessage, MessagePriority, MessageType};

/// Payload handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message_id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub priority: MessagePriority,
    pub message_type: MessageType,
}

impl From<&CoachingMessage> for Notification {
    fn from(message: &CoachingMessage) -> Self {
        Self {
            message_id: message.id.to_string(),
            user_id: message.user_id.clone(),
            title: message.title.clone(),
            body: message.body.clone(),
            action_text: message.action_text.clone(),
            action_url: message.action_url.clone(),
            priority: message.priority,
            message_type: message.message_type,
        }
    }
}

/// Outbound notification transport (push, email, webhook...).
///
/// A delivery either succeeds or returns an error. Implementations do not
/// retry; the message stays queued and the next delivery tick picks it up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> CoachResult<()>;
}

/// Notifier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Target URL for webhook transports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Shared secret used to sign webhook payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Per-request timeout in seconds. Zero uses the transport default.
    #[serde(default)]
    pub timeout_secs: u64,
}
