//! crates/consult_core/src/availability.rs
//!
//! Manages a provider's recurring weekly rules, blocked dates and session
//! policy. Pure definition-side state: nothing here reads or writes
//! bookings.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    intervals_overlap, minutes_of_day, BlockedDate, NewBlockedDate, NewWeeklyRule, SessionPolicy,
    WeeklyRule, SLOT_TICK_MINUTES,
};
use crate::error::{EngineError, EngineResult};
use crate::ports::{PortError, StorageService};

#[derive(Clone)]
pub struct AvailabilityStore {
    store: Arc<dyn StorageService>,
}

impl AvailabilityStore {
    pub fn new(store: Arc<dyn StorageService>) -> Self {
        Self { store }
    }

    /// Adds a weekly rule after checking it against every existing rule on
    /// the same `(provider, day)`.
    pub async fn add_rule(
        &self,
        provider_id: Uuid,
        day_of_week: Weekday,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> EngineResult<WeeklyRule> {
        validate_rule_bounds(start_time, end_time)?;

        let existing = self.store.rules_for_provider(provider_id).await?;
        let conflicts = existing.iter().any(|rule| {
            rule.day_of_week == day_of_week
                && intervals_overlap(
                    minutes_of_day(start_time),
                    minutes_of_day(end_time),
                    minutes_of_day(rule.start_time),
                    minutes_of_day(rule.end_time),
                )
        });
        if conflicts {
            return Err(EngineError::RuleOverlap);
        }

        let rule = NewWeeklyRule {
            provider_id,
            day_of_week,
            start_time,
            end_time,
        };
        Ok(self.store.insert_rule(&rule).await?)
    }

    pub async fn remove_rule(&self, provider_id: Uuid, rule_id: Uuid) -> EngineResult<()> {
        Ok(self.store.delete_rule(provider_id, rule_id).await?)
    }

    /// Blocks a calendar date entirely. Duplicate blocks surface as
    /// `DuplicateBlock` rather than being silently ignored, so
    /// double-submission bugs stay visible.
    pub async fn block_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        reason: Option<String>,
    ) -> EngineResult<BlockedDate> {
        let blocked = NewBlockedDate {
            provider_id,
            date,
            reason,
        };
        match self.store.insert_blocked_date(&blocked).await {
            Ok(row) => Ok(row),
            Err(PortError::Conflict(_)) => Err(EngineError::DuplicateBlock),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn unblock_date(&self, provider_id: Uuid, date: NaiveDate) -> EngineResult<()> {
        Ok(self.store.delete_blocked_date(provider_id, date).await?)
    }

    pub async fn set_policy(&self, policy: SessionPolicy) -> EngineResult<()> {
        if policy.rate_per_15min <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "rate per 15 minutes must be positive".to_string(),
            ));
        }
        if policy.max_advance_days == 0 {
            return Err(EngineError::Validation(
                "maximum advance window must be at least one day".to_string(),
            ));
        }
        Ok(self.store.upsert_policy(&policy).await?)
    }
}

fn validate_rule_bounds(start_time: NaiveTime, end_time: NaiveTime) -> EngineResult<()> {
    if start_time >= end_time {
        return Err(EngineError::Validation(
            "rule must start before it ends".to_string(),
        ));
    }
    if minutes_of_day(start_time) % SLOT_TICK_MINUTES != 0
        || minutes_of_day(end_time) % SLOT_TICK_MINUTES != 0
    {
        return Err(EngineError::Validation(format!(
            "rule bounds must align to the {SLOT_TICK_MINUTES}-minute grid"
        )));
    }
    Ok(())
}
