//! Delivery-time selection.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::DeliveryConfig;
use crate::error::CoachResult;
use crate::types::{CoachingMessage, MessagePriority, MessageStatus, PersonalizationProfile};

/// Spacing between the search start points of successive non-urgent drafts.
const DRAFT_STAGGER_HOURS: i64 = 2;

/// Assigns `scheduled_for` to a user's drafts.
pub struct DeliveryScheduler<'a> {
    config: &'a DeliveryConfig,
}

impl<'a> DeliveryScheduler<'a> {
    pub fn new(config: &'a DeliveryConfig) -> Self {
        Self { config }
    }

    /// Order the drafts (urgent first, then by confidence), pick a slot for
    /// each and move them to `scheduled`.
    ///
    /// `occupied` holds delivery times already taken by the user's upcoming
    /// messages. Expiry stays as composed, so a slot past it is never sent.
    pub fn schedule(
        &self,
        drafts: &mut [CoachingMessage],
        profile: &PersonalizationProfile,
        mut occupied: Vec<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CoachResult<()> {
        drafts.sort_by(|a, b| {
            let a_urgent = a.priority == MessagePriority::Urgent;
            let b_urgent = b.priority == MessagePriority::Urgent;
            b_urgent.cmp(&a_urgent).then_with(|| {
                b.ml_confidence
                    .partial_cmp(&a.ml_confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let tz = profile.tz();
        for (i, draft) in drafts.iter_mut().enumerate() {
            let slot = if draft.priority == MessagePriority::Urgent {
                self.clear_of(self.urgent_slot(profile, tz, now), &occupied)
            } else {
                let start = now + Duration::hours(DRAFT_STAGGER_HOURS * i as i64);
                self.regular_slot(profile, tz, start, &occupied)
                    .unwrap_or(now + Duration::minutes(self.config.fallback_offset_minutes))
            };

            draft.scheduled_for = slot;
            draft.transition(MessageStatus::Scheduled, now)?;
            occupied.push(slot);
        }
        Ok(())
    }

    /// ASAP, unless that lands in a quiet hour and a preferred, non-quiet
    /// hour remains later the same local day.
    fn urgent_slot(&self, profile: &PersonalizationProfile, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
        let asap = now + Duration::minutes(self.config.urgent_offset_minutes);
        let local = asap.with_timezone(&tz);
        if !profile.is_quiet_hour(local.hour()) {
            return asap;
        }
        let date = local.date_naive();
        ((local.hour() + 1)..24)
            .filter(|h| profile.is_preferred_hour(*h) && !profile.is_quiet_hour(*h))
            .find_map(|h| {
                let time = NaiveTime::from_hms_opt(h, 0, 0)?;
                tz.from_local_datetime(&date.and_time(time))
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or(asap)
    }

    /// `slot`, pushed forward in steps of the minimum spacing until it is
    /// clear of every occupied time.
    fn clear_of(&self, mut slot: DateTime<Utc>, occupied: &[DateTime<Utc>]) -> DateTime<Utc> {
        let spacing = Duration::minutes(self.config.min_spacing_minutes.max(1));
        while occupied.iter().any(|taken| (slot - *taken).abs() < spacing) {
            slot += spacing;
        }
        slot
    }

    /// First local hour boundary at or after `start` that is preferred, not
    /// quiet and clear of every occupied time by the minimum spacing.
    fn regular_slot(
        &self,
        profile: &PersonalizationProfile,
        tz: Tz,
        start: DateTime<Utc>,
        occupied: &[DateTime<Utc>],
    ) -> Option<DateTime<Utc>> {
        let spacing = Duration::minutes(self.config.min_spacing_minutes);
        let horizon = start + Duration::days(self.config.lookahead_days);

        let mut candidate = next_hour_boundary(start, tz);
        while candidate <= horizon {
            let hour = candidate.with_timezone(&tz).hour();
            let clear = occupied
                .iter()
                .all(|taken| (candidate - *taken).abs() >= spacing);
            if profile.is_preferred_hour(hour) && !profile.is_quiet_hour(hour) && clear {
                return Some(candidate);
            }
            candidate += Duration::hours(1);
        }
        None
    }
}

/// `at` if it sits on a local hour boundary, else the next one.
fn next_hour_boundary(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = at.with_timezone(&tz);
    if local.minute() == 0 && local.second() == 0 && local.nanosecond() == 0 {
        return at;
    }
    let into_hour = Duration::seconds(i64::from(local.minute() * 60 + local.second()))
        + Duration::nanoseconds(i64::from(local.nanosecond()));
    at - into_hour + Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, h, m, 0).unwrap()
    }

    fn draft(priority: MessagePriority, confidence: f64, now: DateTime<Utc>) -> CoachingMessage {
        CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", now)
            .with_priority(priority)
            .with_trigger("test", confidence)
            .expires_at(now + Duration::hours(24))
    }

    #[test]
    fn test_three_medium_drafts_get_distinct_preferred_slots() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1").with_preferred_hours([9, 18]);
        let now = at(8, 15);
        let mut drafts: Vec<_> = [0.9, 0.8, 0.7]
            .iter()
            .map(|c| draft(MessagePriority::Medium, *c, now))
            .collect();

        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();

        let slots: Vec<_> = drafts.iter().map(|d| d.scheduled_for).collect();
        for slot in &slots {
            assert!([9, 18].contains(&slot.hour()), "{slot}");
            assert_eq!(slot.minute(), 0);
        }
        for (i, a) in slots.iter().enumerate() {
            for b in &slots[i + 1..] {
                assert!((*a - *b).abs() >= Duration::minutes(30));
            }
        }
        assert_eq!(slots[0], at(9, 0));
        assert_eq!(slots[1], at(18, 0));
        assert!(drafts.iter().all(|d| d.status == MessageStatus::Scheduled));
    }

    #[test]
    fn test_regular_slot_avoids_quiet_hours() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1").with_preferred_hours([]);
        let now = at(21, 30);
        let mut drafts = vec![draft(MessagePriority::Medium, 0.5, now)];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        // 22:00 through 06:00 are quiet by default.
        assert_eq!(drafts[0].scheduled_for, Utc.with_ymd_and_hms(2024, 3, 7, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_occupied_slots_are_skipped() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1").with_preferred_hours([9]);
        let now = at(7, 0);
        let mut drafts = vec![draft(MessagePriority::Medium, 0.5, now)];
        scheduler
            .schedule(&mut drafts, &profile, vec![at(9, 10)], now)
            .unwrap();
        assert_eq!(drafts[0].scheduled_for, Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_urgent_is_asap_outside_quiet_hours() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1");
        let now = at(14, 0);
        let mut drafts = vec![
            draft(MessagePriority::Medium, 0.99, now),
            draft(MessagePriority::Urgent, 0.5, now),
        ];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        assert_eq!(drafts[0].priority, MessagePriority::Urgent);
        assert_eq!(drafts[0].scheduled_for, at(14, 5));
    }

    #[test]
    fn test_urgent_in_quiet_hour_moves_to_later_preferred_hour() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1")
            .with_quiet_hours([13])
            .with_preferred_hours([9, 16]);
        let now = at(13, 0);
        let mut drafts = vec![draft(MessagePriority::Urgent, 0.9, now)];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        assert_eq!(drafts[0].scheduled_for, at(16, 0));
    }

    #[test]
    fn test_urgent_keeps_asap_when_day_has_no_slot() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1");
        let now = at(23, 0);
        let mut drafts = vec![draft(MessagePriority::Urgent, 0.9, now)];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        assert_eq!(drafts[0].scheduled_for, at(23, 5));
    }

    #[test]
    fn test_expiry_is_not_moved_with_slot() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1").with_preferred_hours([18]);
        let now = at(7, 0);
        let mut drafts = vec![CoachingMessage::new("u1", MessageType::MorningMotivation, "t", "b", now)
            .with_priority(MessagePriority::Medium)
            .expires_at(now + Duration::hours(4))];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        assert_eq!(drafts[0].scheduled_for, at(18, 0));
        assert_eq!(drafts[0].expires_at, Some(at(11, 0)));
        assert!(drafts[0].is_expired_at(drafts[0].scheduled_for));
    }

    #[test]
    fn test_urgent_drafts_keep_minimum_spacing() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1");
        let now = at(12, 0);
        let mut drafts = vec![
            draft(MessagePriority::Urgent, 0.9, now),
            draft(MessagePriority::Urgent, 0.9, now),
        ];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        assert_eq!(drafts[0].scheduled_for, at(12, 5));
        assert_eq!(drafts[1].scheduled_for, at(12, 35));
    }

    #[test]
    fn test_urgent_skips_upcoming_message() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1");
        let now = at(12, 0);
        let mut drafts = vec![draft(MessagePriority::Urgent, 0.9, now)];
        scheduler
            .schedule(&mut drafts, &profile, vec![at(12, 20)], now)
            .unwrap();
        // 12:05 and 12:35 are both within 30 minutes of 12:20.
        assert_eq!(drafts[0].scheduled_for, at(13, 5));
    }

    #[test]
    fn test_local_timezone_is_respected() {
        let config = DeliveryConfig::default();
        let scheduler = DeliveryScheduler::new(&config);
        let profile = PersonalizationProfile::new("u1")
            .with_preferred_hours([9])
            .with_timezone("Asia/Kolkata");
        let now = at(0, 0);
        let mut drafts = vec![draft(MessagePriority::Medium, 0.5, now)];
        scheduler.schedule(&mut drafts, &profile, Vec::new(), now).unwrap();
        // 09:00 IST is 03:30 UTC.
        assert_eq!(drafts[0].scheduled_for, at(3, 30));
    }
}
