//! Read access to users and their activity history.

use chrono::{DateTime, Utc};

use crate::error::CoachResult;
use crate::types::{ActivityRecord, UserRecord, ValueRecord};

/// Read-only view over data owned by the application's CRUD services.
pub trait ActivitySource: Send + Sync {
    /// Active users ordered by id.
    fn list_active_users(&self, limit: usize, offset: usize) -> CoachResult<Vec<UserRecord>>;

    fn get_user(&self, user_id: &str) -> CoachResult<Option<UserRecord>>;

    /// Activities since `since`, newest first.
    fn recent_activities(&self, user_id: &str, since: DateTime<Utc>) -> CoachResult<Vec<ActivityRecord>>;

    fn values_for_user(&self, user_id: &str) -> CoachResult<Vec<ValueRecord>>;
}
