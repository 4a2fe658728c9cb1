//! SQLite-backed store.
//!
//! One connection behind a mutex serves both [`CoachStore`] and
//! [`ActivitySource`]. Timestamps are stored as fixed-width RFC3339 UTC strings
//! (microsecond precision) so that text comparison orders them correctly.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoachError, CoachResult, ErrorCode};
use crate::traits::{ActivitySource, AnalyticsRollup, CoachStore};
use crate::types::{
    ActivityRecord, CoachingMessage, MessageQuery, MessageSort, MessageStatus, MessageTemplate,
    PersonalizationProfile, TemplateQuery, UserRecord, ValueRecord,
};

const MESSAGE_COLUMNS: &str = "id, user_id, message_type, priority, tone, title, body, \
     action_text, action_url, status, scheduled_for, expires_at, ml_confidence, \
     behavioral_trigger, template_id, created_at, updated_at, sent_at, read_at, \
     acted_on_at, cancelled_at, snooze_count";

/// SQLite-backed coaching store.
pub struct SqliteCoachStore {
    conn: Mutex<Connection>,
}

impl SqliteCoachStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> CoachResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> CoachResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoachError::internal("store connection mutex poisoned"))
    }

    fn init_schema(&self) -> CoachResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_premium INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                value_id TEXT,
                name TEXT NOT NULL,
                occurred_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activities_user_time ON activities(user_id, occurred_at);

            CREATE TABLE IF NOT EXISTS user_values (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_values_user ON user_values(user_id);

            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                message_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                usage_count INTEGER NOT NULL DEFAULT 0,
                engagement_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_templates_type ON templates(message_type, active);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                priority_rank INTEGER NOT NULL,
                tone TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                action_text TEXT,
                action_url TEXT,
                status TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                expires_at TEXT,
                ml_confidence REAL NOT NULL,
                behavioral_trigger TEXT NOT NULL,
                template_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                sent_at TEXT,
                read_at TEXT,
                acted_on_at TEXT,
                cancelled_at TEXT,
                snooze_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_user_created ON messages(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_due ON messages(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_messages_expires ON messages(status, expires_at);

            CREATE TABLE IF NOT EXISTS rollups (
                day TEXT NOT NULL,
                message_type TEXT NOT NULL,
                created INTEGER NOT NULL,
                sent INTEGER NOT NULL,
                read INTEGER NOT NULL,
                acted_on INTEGER NOT NULL,
                expired INTEGER NOT NULL,
                cancelled INTEGER NOT NULL,
                computed_at TEXT NOT NULL,
                PRIMARY KEY (day, message_type)
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert or replace a user record.
    pub fn insert_user(&self, user: &UserRecord) -> CoachResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO users (id, display_name, created_at, is_premium, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.display_name,
                ts(user.created_at),
                user.is_premium,
                user.is_active
            ],
        )?;
        Ok(())
    }

    /// Insert or replace an activity record.
    pub fn insert_activity(&self, activity: &ActivityRecord) -> CoachResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO activities (id, user_id, value_id, name, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                activity.id,
                activity.user_id,
                activity.value_id,
                activity.name,
                ts(activity.occurred_at)
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a value record.
    pub fn insert_value(&self, value: &ValueRecord) -> CoachResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO user_values (id, user_id, name) VALUES (?1, ?2, ?3)",
            params![value.id, value.user_id, value.name],
        )?;
        Ok(())
    }
}

impl CoachStore for SqliteCoachStore {
    fn get_profile(&self, user_id: &str) -> CoachResult<Option<PersonalizationProfile>> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| serde_json::from_str(&d).map_err(CoachError::from))
            .transpose()
    }

    fn upsert_profile(&self, profile: &PersonalizationProfile) -> CoachResult<()> {
        let data = serde_json::to_string(profile)?;
        self.conn()?.execute(
            "INSERT INTO profiles (user_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![profile.user_id, data, ts(profile.updated_at)],
        )?;
        Ok(())
    }

    fn insert_template(&self, template: &MessageTemplate) -> CoachResult<()> {
        let data = serde_json::to_string(template)?;
        self.conn()?.execute(
            "INSERT INTO templates (id, message_type, active, usage_count, engagement_count, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                template.id.to_string(),
                template.message_type.to_string(),
                template.active,
                to_i64(template.usage_count),
                to_i64(template.engagement_count),
                ts(template.created_at),
                data
            ],
        )?;
        Ok(())
    }

    fn find_templates(&self, query: &TemplateQuery) -> CoachResult<Vec<MessageTemplate>> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(kind) = query.message_type {
            clauses.push("message_type = ?");
            values.push(Value::Text(kind.to_string()));
        }
        if query.active_only {
            clauses.push("active = 1");
        }
        let where_sql = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };
        let sql = format!(
            "SELECT data, usage_count, engagement_count FROM templates WHERE {} ORDER BY rowid",
            where_sql
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(data, usage, engagement)| {
                let mut template: MessageTemplate = serde_json::from_str(&data)?;
                template.usage_count = usage.max(0) as u64;
                template.engagement_count = engagement.max(0) as u64;
                Ok(template)
            })
            .collect()
    }

    fn count_templates(&self) -> CoachResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM templates", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn bump_template_counters(&self, id: Uuid, usage: u64, engagement: u64) -> CoachResult<()> {
        let changed = self.conn()?.execute(
            "UPDATE templates SET usage_count = usage_count + ?1,
                 engagement_count = engagement_count + ?2
             WHERE id = ?3",
            params![to_i64(usage), to_i64(engagement), id.to_string()],
        )?;
        if changed == 0 {
            return Err(CoachError::NotFound {
                message: format!("Template '{}' not found", id),
                code: ErrorCode::NfTemplate,
                entity_id: Some(id.to_string()),
            });
        }
        Ok(())
    }

    fn insert_message(&self, message: &CoachingMessage) -> CoachResult<()> {
        let conn = self.conn()?;
        let sql = format!(
            "INSERT INTO messages ({}, priority_rank) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            MESSAGE_COLUMNS
        );
        conn.execute(&sql, params_from_iter(message_values(message)))?;
        debug!(message_id = %message.id, user_id = %message.user_id, "Inserted message");
        Ok(())
    }

    fn get_message(&self, id: Uuid) -> CoachResult<Option<CoachingMessage>> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
        let row = self
            .conn()?
            .query_row(&sql, params![id.to_string()], MessageRow::read)
            .optional()?;
        row.map(MessageRow::into_message).transpose()
    }

    fn find_messages(
        &self,
        query: &MessageQuery,
        sort: MessageSort,
        limit: usize,
        offset: usize,
    ) -> CoachResult<Vec<CoachingMessage>> {
        let (where_sql, mut values) = message_where(query);
        let order_sql = match sort {
            MessageSort::DeliveryOrder => "priority_rank DESC, scheduled_for ASC, created_at ASC",
            MessageSort::NewestFirst => "created_at DESC, rowid DESC",
            MessageSort::ScheduledAsc => "scheduled_for ASC, created_at ASC",
        };
        let sql = format!(
            "SELECT {} FROM messages WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS, where_sql, order_sql
        );
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), MessageRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    fn count_messages(&self, query: &MessageQuery) -> CoachResult<usize> {
        let (where_sql, values) = message_where(query);
        let sql = format!("SELECT COUNT(*) FROM messages WHERE {}", where_sql);
        let count: i64 = self
            .conn()?
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn update_message(&self, message: &CoachingMessage) -> CoachResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE messages SET priority = ?2, priority_rank = ?3, tone = ?4, title = ?5,
                 body = ?6, action_text = ?7, action_url = ?8, status = ?9, scheduled_for = ?10,
                 expires_at = ?11, ml_confidence = ?12, updated_at = ?13, sent_at = ?14,
                 read_at = ?15, acted_on_at = ?16, cancelled_at = ?17, snooze_count = ?18
             WHERE id = ?1",
            params![
                message.id.to_string(),
                message.priority.to_string(),
                message.priority.rank(),
                message.tone.to_string(),
                message.title,
                message.body,
                message.action_text,
                message.action_url,
                message.status.to_string(),
                ts(message.scheduled_for),
                message.expires_at.map(ts),
                message.ml_confidence,
                ts(message.updated_at),
                message.sent_at.map(ts),
                message.read_at.map(ts),
                message.acted_on_at.map(ts),
                message.cancelled_at.map(ts),
                message.snooze_count
            ],
        )?;
        if changed == 0 {
            return Err(CoachError::message_not_found(message.id.to_string()));
        }
        Ok(())
    }

    fn claim_for_delivery(&self, id: Uuid, now: DateTime<Utc>) -> CoachResult<bool> {
        let stamp = ts(now);
        let changed = self.conn()?.execute(
            "UPDATE messages SET status = 'sent', sent_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'scheduled')",
            params![id.to_string(), stamp],
        )?;
        Ok(changed == 1)
    }

    fn release_claim(&self, id: Uuid, prior: MessageStatus, now: DateTime<Utc>) -> CoachResult<()> {
        if !prior.is_queued() {
            return Err(CoachError::invalid_transition(MessageStatus::Sent, prior));
        }
        self.conn()?.execute(
            "UPDATE messages SET status = ?2, sent_at = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'sent'",
            params![id.to_string(), prior.to_string(), ts(now)],
        )?;
        Ok(())
    }

    fn expire_overdue(&self, now: DateTime<Utc>) -> CoachResult<usize> {
        let stamp = ts(now);
        let changed = self.conn()?.execute(
            "UPDATE messages SET status = 'expired', updated_at = ?1
             WHERE status IN ('pending', 'scheduled')
               AND expires_at IS NOT NULL AND expires_at <= ?1",
            params![stamp],
        )?;
        Ok(changed)
    }

    fn delete_messages(&self, query: &MessageQuery) -> CoachResult<usize> {
        let (where_sql, values) = message_where(query);
        let sql = format!("DELETE FROM messages WHERE {}", where_sql);
        let changed = self
            .conn()?
            .execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed)
    }

    fn save_rollup(&self, rollup: &AnalyticsRollup) -> CoachResult<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO rollups
                 (day, message_type, created, sent, read, acted_on, expired, cancelled, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rollup.day.to_string(),
                rollup.message_type,
                to_i64(rollup.created),
                to_i64(rollup.sent),
                to_i64(rollup.read),
                to_i64(rollup.acted_on),
                to_i64(rollup.expired),
                to_i64(rollup.cancelled),
                ts(rollup.computed_at)
            ],
        )?;
        Ok(())
    }

    fn rollups_for_day(&self, day: NaiveDate) -> CoachResult<Vec<AnalyticsRollup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT message_type, created, sent, read, acted_on, expired, cancelled, computed_at
             FROM rollups WHERE day = ?1 ORDER BY message_type",
        )?;
        let rows = stmt
            .query_map(params![day.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    [
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ],
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(message_type, counts, computed_at)| {
                let [created, sent, read, acted_on, expired, cancelled] =
                    counts.map(|c| c.max(0) as u64);
                Ok(AnalyticsRollup {
                    day,
                    message_type,
                    created,
                    sent,
                    read,
                    acted_on,
                    expired,
                    cancelled,
                    computed_at: parse_ts(&computed_at)?,
                })
            })
            .collect()
    }
}

impl ActivitySource for SqliteCoachStore {
    fn list_active_users(&self, limit: usize, offset: usize) -> CoachResult<Vec<UserRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, display_name, created_at, is_premium, is_active FROM users
             WHERE is_active = 1 ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(
                params![
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(offset).unwrap_or(i64::MAX)
                ],
                read_user_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(user_from_row).collect()
    }

    fn get_user(&self, user_id: &str) -> CoachResult<Option<UserRecord>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, display_name, created_at, is_premium, is_active FROM users WHERE id = ?1",
                params![user_id],
                read_user_row,
            )
            .optional()?;
        row.map(user_from_row).transpose()
    }

    fn recent_activities(&self, user_id: &str, since: DateTime<Utc>) -> CoachResult<Vec<ActivityRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, value_id, name, occurred_at FROM activities
             WHERE user_id = ?1 AND occurred_at >= ?2 ORDER BY occurred_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id, ts(since)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, user_id, value_id, name, occurred_at)| {
                Ok(ActivityRecord {
                    id,
                    user_id,
                    value_id,
                    name,
                    occurred_at: parse_ts(&occurred_at)?,
                })
            })
            .collect()
    }

    fn values_for_user(&self, user_id: &str) -> CoachResult<Vec<ValueRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, user_id, name FROM user_values WHERE user_id = ?1 ORDER BY id")?;
        let values = stmt
            .query_map(params![user_id], |row| {
                Ok(ValueRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> CoachResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoachError::timestamp(format!("'{}': {}", raw, e)))
}

fn parse_opt_ts(raw: Option<String>) -> CoachResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_enum<T: FromStr>(raw: &str, field: &str) -> CoachResult<T> {
    raw.parse()
        .map_err(|_| CoachError::parse(format!("unknown {} '{}'", field, raw)))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn message_values(message: &CoachingMessage) -> Vec<Value> {
    let text = |s: &str| Value::Text(s.to_string());
    let opt_text = |s: Option<String>| s.map(Value::Text).unwrap_or(Value::Null);
    vec![
        Value::Text(message.id.to_string()),
        text(&message.user_id),
        Value::Text(message.message_type.to_string()),
        Value::Text(message.priority.to_string()),
        Value::Text(message.tone.to_string()),
        text(&message.title),
        text(&message.body),
        opt_text(message.action_text.clone()),
        opt_text(message.action_url.clone()),
        Value::Text(message.status.to_string()),
        Value::Text(ts(message.scheduled_for)),
        opt_text(message.expires_at.map(ts)),
        Value::Real(message.ml_confidence),
        text(&message.behavioral_trigger),
        opt_text(message.template_id.map(|id| id.to_string())),
        Value::Text(ts(message.created_at)),
        Value::Text(ts(message.updated_at)),
        opt_text(message.sent_at.map(ts)),
        opt_text(message.read_at.map(ts)),
        opt_text(message.acted_on_at.map(ts)),
        opt_text(message.cancelled_at.map(ts)),
        Value::Integer(i64::from(message.snooze_count)),
        Value::Integer(message.priority.rank()),
    ]
}

/// Translate a query into a WHERE clause and its bound values.
fn message_where(query: &MessageQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(user_id) = &query.user_id {
        clauses.push("user_id = ?".into());
        values.push(Value::Text(user_id.clone()));
    }
    if !query.statuses.is_empty() {
        let marks = vec!["?"; query.statuses.len()].join(", ");
        clauses.push(format!("status IN ({})", marks));
        values.extend(query.statuses.iter().map(|s| Value::Text(s.to_string())));
    }
    if let Some(kind) = query.message_type {
        clauses.push("message_type = ?".into());
        values.push(Value::Text(kind.to_string()));
    }
    if let Some(at) = query.created_since {
        clauses.push("created_at >= ?".into());
        values.push(Value::Text(ts(at)));
    }
    if let Some(at) = query.created_before {
        clauses.push("created_at < ?".into());
        values.push(Value::Text(ts(at)));
    }
    if let Some(at) = query.scheduled_at_or_before {
        clauses.push("scheduled_for <= ?".into());
        values.push(Value::Text(ts(at)));
    }
    if let Some(at) = query.scheduled_after {
        clauses.push("scheduled_for > ?".into());
        values.push(Value::Text(ts(at)));
    }
    if let Some(at) = query.not_expired_at {
        clauses.push("(expires_at IS NULL OR expires_at > ?)".into());
        values.push(Value::Text(ts(at)));
    }
    if let Some(at) = query.active_since {
        clauses.push("(created_at >= ? OR scheduled_for >= ?)".into());
        values.push(Value::Text(ts(at)));
        values.push(Value::Text(ts(at)));
    }

    let sql = if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    };
    (sql, values)
}

/// Raw message columns, converted outside the rusqlite row callback.
struct MessageRow {
    id: String,
    user_id: String,
    message_type: String,
    priority: String,
    tone: String,
    title: String,
    body: String,
    action_text: Option<String>,
    action_url: Option<String>,
    status: String,
    scheduled_for: String,
    expires_at: Option<String>,
    ml_confidence: f64,
    behavioral_trigger: String,
    template_id: Option<String>,
    created_at: String,
    updated_at: String,
    sent_at: Option<String>,
    read_at: Option<String>,
    acted_on_at: Option<String>,
    cancelled_at: Option<String>,
    snooze_count: i64,
}

impl MessageRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            message_type: row.get(2)?,
            priority: row.get(3)?,
            tone: row.get(4)?,
            title: row.get(5)?,
            body: row.get(6)?,
            action_text: row.get(7)?,
            action_url: row.get(8)?,
            status: row.get(9)?,
            scheduled_for: row.get(10)?,
            expires_at: row.get(11)?,
            ml_confidence: row.get(12)?,
            behavioral_trigger: row.get(13)?,
            template_id: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
            sent_at: row.get(17)?,
            read_at: row.get(18)?,
            acted_on_at: row.get(19)?,
            cancelled_at: row.get(20)?,
            snooze_count: row.get(21)?,
        })
    }

    fn into_message(self) -> CoachResult<CoachingMessage> {
        Ok(CoachingMessage {
            id: Uuid::parse_str(&self.id).map_err(|e| CoachError::parse(e.to_string()))?,
            user_id: self.user_id,
            message_type: parse_enum(&self.message_type, "message type")?,
            priority: parse_enum(&self.priority, "priority")?,
            tone: parse_enum(&self.tone, "tone")?,
            title: self.title,
            body: self.body,
            action_text: self.action_text,
            action_url: self.action_url,
            status: parse_enum(&self.status, "status")?,
            scheduled_for: parse_ts(&self.scheduled_for)?,
            expires_at: parse_opt_ts(self.expires_at)?,
            ml_confidence: self.ml_confidence,
            behavioral_trigger: self.behavioral_trigger,
            template_id: self
                .template_id
                .map(|id| Uuid::parse_str(&id).map_err(|e| CoachError::parse(e.to_string())))
                .transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            sent_at: parse_opt_ts(self.sent_at)?,
            read_at: parse_opt_ts(self.read_at)?,
            acted_on_at: parse_opt_ts(self.acted_on_at)?,
            cancelled_at: parse_opt_ts(self.cancelled_at)?,
            snooze_count: u32::try_from(self.snooze_count.max(0)).unwrap_or(u32::MAX),
        })
    }
}

type UserRow = (String, String, String, bool, bool);

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn user_from_row((id, display_name, created_at, is_premium, is_active): UserRow) -> CoachResult<UserRecord> {
    Ok(UserRecord {
        id,
        display_name,
        created_at: parse_ts(&created_at)?,
        is_premium,
        is_active,
    })
}
