//! Read-only records owned by the application's CRUD services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account as seen by the coaching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UserRecord {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            created_at,
            is_premium: false,
            is_active: true,
        }
    }

    /// Builder method to mark the account premium.
    pub fn premium(mut self) -> Self {
        self.is_premium = true;
        self
    }

    /// First word of the display name, or the whole name.
    pub fn first_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }

    /// Whole days since the account was created.
    pub fn account_age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }
}

/// One logged activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub user_id: String,
    /// Value this activity serves, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_id: Option<String>,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        value_id: Option<&str>,
        name: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            value_id: value_id.map(str::to_string),
            name: name.into(),
            occurred_at,
        }
    }
}

/// A personal value activities are tracked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

impl ValueRecord {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}
