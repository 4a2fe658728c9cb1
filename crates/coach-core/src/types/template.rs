//! Message templates and placeholder rendering.
//!
//! Templates declare the context keys they need. Placeholders that are not
//! declared are rejected when the template is validated at seed time; declared
//! keys that are missing from the context are rejected when the template is
//! rendered.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoachError, CoachResult};
use crate::types::{MessagePriority, MessageTone, MessageType, UserSegment};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("placeholder pattern is valid"));

/// Who a template may be shown to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateTargeting {
    pub min_account_age_days: u32,
    pub min_activity_count: u32,
    /// Empty means universal.
    pub target_segments: Vec<UserSegment>,
    pub premium_only: bool,
}

/// How well a template's segment list fits a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMatch {
    Exact,
    Universal,
    Mismatch,
}

impl TemplateTargeting {
    pub fn segment_match(&self, segment: UserSegment) -> SegmentMatch {
        if self.target_segments.is_empty() {
            SegmentMatch::Universal
        } else if self.target_segments.contains(&segment) {
            SegmentMatch::Exact
        } else {
            SegmentMatch::Mismatch
        }
    }
}

/// Immutable-once-published message definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub message_type: MessageType,
    pub name: String,
    pub title_template: String,
    pub body_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// Context keys the templates are allowed to reference.
    pub required_keys: BTreeSet<String>,
    pub tone: MessageTone,
    pub priority: MessagePriority,
    #[serde(default)]
    pub targeting: TemplateTargeting,
    pub cooldown_hours: u32,
    pub expiry_hours: u32,
    /// Local hours the template may be used in. Empty means any.
    #[serde(default)]
    pub optimal_hours: BTreeSet<u8>,
    /// Days the template must not be used on.
    #[serde(default)]
    pub excluded_days: Vec<Weekday>,
    pub active: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub engagement_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Rendered template text.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
    pub action_text: Option<String>,
}

impl MessageTemplate {
    /// Create a template for `message_type`. Required keys are derived from
    /// the placeholders in `title` and `body`.
    pub fn new(
        message_type: MessageType,
        name: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let title_template = title.into();
        let body_template = body.into();
        let mut required_keys = placeholders(&title_template);
        required_keys.extend(placeholders(&body_template));
        Self {
            id: Uuid::new_v4(),
            message_type,
            name: name.into(),
            title_template,
            body_template,
            action_template: None,
            action_url: None,
            required_keys,
            tone: MessageTone::default(),
            priority: MessagePriority::default(),
            targeting: TemplateTargeting::default(),
            cooldown_hours: message_type.default_cooldown_hours(),
            expiry_hours: message_type.default_expiry_hours(),
            optimal_hours: BTreeSet::new(),
            excluded_days: Vec::new(),
            active: true,
            usage_count: 0,
            engagement_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set the call to action.
    pub fn with_action(mut self, text: impl Into<String>, url: Option<&str>) -> Self {
        let text = text.into();
        self.required_keys.extend(placeholders(&text));
        self.action_template = Some(text);
        self.action_url = url.map(str::to_string);
        self
    }

    /// Builder method to set tone.
    pub fn with_tone(mut self, tone: MessageTone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set targeting.
    pub fn with_targeting(mut self, targeting: TemplateTargeting) -> Self {
        self.targeting = targeting;
        self
    }

    /// Builder method to restrict the template to some segments.
    pub fn for_segments(mut self, segments: impl IntoIterator<Item = UserSegment>) -> Self {
        self.targeting.target_segments = segments.into_iter().collect();
        self
    }

    /// Builder method to set cooldown hours.
    pub fn with_cooldown_hours(mut self, hours: u32) -> Self {
        self.cooldown_hours = hours;
        self
    }

    /// Builder method to set expiry hours.
    pub fn with_expiry_hours(mut self, hours: u32) -> Self {
        self.expiry_hours = hours;
        self
    }

    /// Builder method to set the optimal-hour allowlist.
    pub fn with_optimal_hours(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.optimal_hours = hours.into_iter().collect();
        self
    }

    /// Builder method to set the day denylist.
    pub fn excluding_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.excluded_days = days.into_iter().collect();
        self
    }

    /// Historical engagement in [0, 1].
    pub fn average_engagement(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            (self.engagement_count as f64 / self.usage_count as f64).min(1.0)
        }
    }

    /// Whether the template may be used at this local hour and weekday.
    pub fn is_usable_at(&self, local_hour: u32, weekday: Weekday) -> bool {
        let hour_ok = self.optimal_hours.is_empty()
            || u8::try_from(local_hour).is_ok_and(|h| self.optimal_hours.contains(&h));
        hour_ok && !self.excluded_days.contains(&weekday)
    }

    /// Check that every placeholder is declared and the timing fields are sane.
    pub fn validate(&self) -> CoachResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoachError::validation("template name must not be empty"));
        }
        let texts = std::iter::once(&self.title_template)
            .chain(std::iter::once(&self.body_template))
            .chain(self.action_template.iter());
        for text in texts {
            for key in placeholders(text) {
                if !self.required_keys.contains(&key) {
                    return Err(CoachError::validation(format!(
                        "template '{}' uses undeclared placeholder '{{{}}}'",
                        self.name, key
                    )));
                }
            }
        }
        if self.expiry_hours == 0 {
            return Err(CoachError::out_of_range("expiry_hours", "must be at least 1"));
        }
        if let Some(bad) = self.optimal_hours.iter().find(|h| **h > 23) {
            return Err(CoachError::out_of_range(
                "optimal_hours",
                format!("hour {} is not in 0..=23", bad),
            ));
        }
        Ok(())
    }

    /// Render title/body/action with `context`.
    pub fn render(&self, context: &HashMap<String, String>) -> CoachResult<RenderedMessage> {
        if let Some(missing) = self.required_keys.iter().find(|k| !context.contains_key(*k)) {
            return Err(CoachError::missing_placeholder(missing.clone()));
        }
        Ok(RenderedMessage {
            title: substitute(&self.title_template, context)?,
            body: substitute(&self.body_template, context)?,
            action_text: self
                .action_template
                .as_deref()
                .map(|a| substitute(a, context))
                .transpose()?,
        })
    }
}

/// Placeholder names referenced in `text`.
pub fn placeholders(text: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Literal `{key}` substitution. Fails on the first key with no value.
pub fn substitute(text: &str, context: &HashMap<String, String>) -> CoachResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let key = &caps[1];
        let value = context
            .get(key)
            .ok_or_else(|| CoachError::missing_placeholder(key))?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}
