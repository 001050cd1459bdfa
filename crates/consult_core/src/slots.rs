//! crates/consult_core/src/slots.rs
//!
//! Turns a provider's weekly rules, blocked dates and existing bookings into
//! the concrete bookable start times for one date. An empty result is a
//! normal answer ("no availability"), never an error.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    intervals_overlap, minutes_of_day, time_from_minutes, Booking, SessionPolicy, WeeklyRule,
    SLOT_TICK_MINUTES,
};
use crate::error::{EngineError, EngineResult};
use crate::ports::StorageService;

#[derive(Clone)]
pub struct SlotGenerator {
    store: Arc<dyn StorageService>,
}

impl SlotGenerator {
    pub fn new(store: Arc<dyn StorageService>) -> Self {
        Self { store }
    }

    /// Produces the ordered bookable start times for `date`.
    ///
    /// The advance window and buffer come from the provider's policy, and
    /// "now" from the storage clock, so the caller's clock never affects
    /// the outcome.
    pub async fn generate_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> EngineResult<Vec<NaiveTime>> {
        validate_duration(duration_minutes)?;

        if self.store.is_date_blocked(provider_id, date).await? {
            return Ok(Vec::new());
        }

        let policy = self.policy_or_defaults(provider_id).await?;
        let now = self.store.now().await?;

        // Dates beyond the advance horizon never have slots.
        let horizon = (now + Duration::days(i64::from(policy.max_advance_days))).date_naive();
        if date > horizon {
            return Ok(Vec::new());
        }

        let rules = self.store.rules_for_provider(provider_id).await?;
        let bookings = self
            .store
            .active_bookings_on_date(provider_id, date)
            .await?;

        Ok(candidate_starts(
            date,
            &rules,
            &bookings,
            duration_minutes,
            &policy,
            now,
        ))
    }

    /// Re-runs the generation steps for one specific tuple. The booking
    /// ledger calls this at commit time instead of trusting any slot list
    /// the caller fetched earlier.
    pub async fn is_bookable(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> EngineResult<bool> {
        let slots = self
            .generate_slots(provider_id, date, duration_minutes)
            .await?;
        Ok(slots.contains(&start_time))
    }

    /// A provider without explicit settings still has a schedule: the
    /// default buffer and advance windows apply. The rate only matters at
    /// booking time, where a configured policy is required.
    async fn policy_or_defaults(&self, provider_id: Uuid) -> EngineResult<SessionPolicy> {
        let policy = self.store.policy_for_provider(provider_id).await?;
        Ok(policy.unwrap_or_else(|| SessionPolicy::with_defaults(provider_id, Decimal::ZERO)))
    }
}

pub(crate) fn validate_duration(duration_minutes: u32) -> EngineResult<()> {
    if duration_minutes == 0 || duration_minutes % SLOT_TICK_MINUTES != 0 {
        return Err(EngineError::Validation(format!(
            "duration must be a positive multiple of {SLOT_TICK_MINUTES} minutes"
        )));
    }
    Ok(())
}

/// The core walk: for each rule on the date's weekday, step the
/// 15-minute grid and emit a start `t` only when the session *and* the
/// trailing buffer fit before the rule ends, the slot clears the minimum
/// advance threshold, and no live booking overlaps `[t, t + duration)`.
fn candidate_starts(
    date: NaiveDate,
    rules: &[WeeklyRule],
    bookings: &[Booking],
    duration_minutes: u32,
    policy: &SessionPolicy,
    now: DateTime<Utc>,
) -> Vec<NaiveTime> {
    let weekday = date.weekday();
    let min_start = now + Duration::hours(i64::from(policy.min_advance_hours));

    let mut starts = Vec::new();
    for rule in rules.iter().filter(|r| r.day_of_week == weekday) {
        let rule_end = minutes_of_day(rule.end_time);
        let mut tick = minutes_of_day(rule.start_time);

        while tick + duration_minutes + policy.buffer_minutes <= rule_end {
            let start_time = time_from_minutes(tick);
            let starts_at = Utc.from_utc_datetime(&date.and_time(start_time));

            let taken = bookings.iter().any(|b| {
                intervals_overlap(
                    tick,
                    tick + duration_minutes,
                    minutes_of_day(b.start_time),
                    minutes_of_day(b.start_time) + b.duration_minutes,
                )
            });

            if starts_at >= min_start && !taken {
                starts.push(start_time);
            }
            tick += SLOT_TICK_MINUTES;
        }
    }

    starts.sort();
    starts
}
