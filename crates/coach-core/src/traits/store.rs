//! Persistence for coaching state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoachResult;
use crate::types::{
    CoachingMessage, MessageQuery, MessageSort, MessageStatus, MessageTemplate,
    PersonalizationProfile, TemplateQuery,
};

/// Daily analytics rollup, one row per day and message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRollup {
    pub day: chrono::NaiveDate,
    pub message_type: String,
    pub created: u64,
    pub sent: u64,
    pub read: u64,
    pub acted_on: u64,
    pub expired: u64,
    pub cancelled: u64,
    pub computed_at: DateTime<Utc>,
}

/// Storage for profiles, templates, messages and rollups.
///
/// Status changes that race with delivery go through
/// [`CoachStore::claim_for_delivery`] so that a message is handed to a
/// transport at most once.
pub trait CoachStore: Send + Sync {
    fn get_profile(&self, user_id: &str) -> CoachResult<Option<PersonalizationProfile>>;

    fn upsert_profile(&self, profile: &PersonalizationProfile) -> CoachResult<()>;

    fn insert_template(&self, template: &MessageTemplate) -> CoachResult<()>;

    fn find_templates(&self, query: &TemplateQuery) -> CoachResult<Vec<MessageTemplate>>;

    fn count_templates(&self) -> CoachResult<usize>;

    /// Add to a template's usage and engagement counters.
    fn bump_template_counters(&self, id: Uuid, usage: u64, engagement: u64) -> CoachResult<()>;

    fn insert_message(&self, message: &CoachingMessage) -> CoachResult<()>;

    fn get_message(&self, id: Uuid) -> CoachResult<Option<CoachingMessage>>;

    fn find_messages(
        &self,
        query: &MessageQuery,
        sort: MessageSort,
        limit: usize,
        offset: usize,
    ) -> CoachResult<Vec<CoachingMessage>>;

    fn count_messages(&self, query: &MessageQuery) -> CoachResult<usize>;

    /// Overwrite a message. Fails with not-found if it does not exist.
    fn update_message(&self, message: &CoachingMessage) -> CoachResult<()>;

    /// Atomically move a queued message to `sent`. Returns false if another
    /// worker got there first or the message is no longer queued.
    fn claim_for_delivery(&self, id: Uuid, now: DateTime<Utc>) -> CoachResult<bool>;

    /// Undo a claim after a failed delivery.
    fn release_claim(&self, id: Uuid, prior: MessageStatus, now: DateTime<Utc>) -> CoachResult<()>;

    /// Move every queued message whose expiry is at or before `now` to `expired`.
    fn expire_overdue(&self, now: DateTime<Utc>) -> CoachResult<usize>;

    fn delete_messages(&self, query: &MessageQuery) -> CoachResult<usize>;

    fn save_rollup(&self, rollup: &AnalyticsRollup) -> CoachResult<()>;

    fn rollups_for_day(&self, day: chrono::NaiveDate) -> CoachResult<Vec<AnalyticsRollup>>;
}
