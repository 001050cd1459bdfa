//! crates/consult_core/src/booking.rs
//!
//! Validates and commits bookings, cancellations and wallet top-ups. Every
//! money-moving path funnels into one atomic storage commit; the engine
//! never applies a booking and its ledger writes separately.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::domain::{Actor, Booking, BookingStatus, NewBooking, Role, SessionPolicy};
use crate::error::{EngineError, EngineResult};
use crate::ports::{Event, NotificationService, PortError, StorageService};
use crate::slots::{validate_duration, SlotGenerator};

//=========================================================================================
// Refund Policy
//=========================================================================================

/// How much of a booking comes back on cancellation. A rule, not a
/// hardcoded constant: full refund with enough notice, a percentage below
/// the threshold.
#[derive(Debug, Clone, Copy)]
pub struct RefundPolicy {
    pub full_refund_notice_hours: i64,
    pub late_refund_percent: u32,
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            full_refund_notice_hours: 24,
            late_refund_percent: 50,
        }
    }
}

impl RefundPolicy {
    /// `notice` is the gap between the cancellation and the scheduled
    /// start; a negative gap (cancelling after the start) counts as late.
    pub fn refund_amount(&self, total_amount: Decimal, notice: Duration) -> Decimal {
        if notice >= Duration::hours(self.full_refund_notice_hours) {
            return total_amount;
        }
        (total_amount * Decimal::from(self.late_refund_percent) / Decimal::from(100u32))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// `rate × duration / 15`, exact because durations sit on the 15-minute grid.
pub fn booking_amount(rate_per_15min: Decimal, duration_minutes: u32) -> Decimal {
    rate_per_15min * Decimal::from(duration_minutes / 15)
}

//=========================================================================================
// Booking Ledger
//=========================================================================================

#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn StorageService>,
    notifier: Arc<dyn NotificationService>,
    slots: SlotGenerator,
    refund_policy: RefundPolicy,
}

impl BookingLedger {
    pub fn new(
        store: Arc<dyn StorageService>,
        notifier: Arc<dyn NotificationService>,
        refund_policy: RefundPolicy,
    ) -> Self {
        let slots = SlotGenerator::new(store.clone());
        Self {
            store,
            notifier,
            slots,
            refund_policy,
        }
    }

    /// Books a slot for the seeker, debiting their balance.
    ///
    /// The slot is re-validated here, at commit time; a slot list fetched
    /// moments earlier may already be stale. Even then, the storage layer's
    /// own uniqueness and balance guards have the last word, so two
    /// concurrent callers can both pass validation and exactly one wins.
    pub async fn create_booking(
        &self,
        seeker_id: Uuid,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> EngineResult<Booking> {
        validate_duration(duration_minutes)?;

        let policy = self.require_policy(provider_id).await?;

        if !self
            .slots
            .is_bookable(provider_id, date, start_time, duration_minutes)
            .await?
        {
            return Err(EngineError::SlotUnavailable);
        }

        // The amount is frozen from the provider's current rate.
        let total_amount = booking_amount(policy.rate_per_15min, duration_minutes);

        // Pre-check funds to report the exact shortfall. The guarded debit
        // inside the commit is what actually enforces it.
        let seeker = self.store.get_user(seeker_id).await?;
        if seeker.balance < total_amount {
            return Err(EngineError::InsufficientFunds {
                shortfall: total_amount - seeker.balance,
            });
        }

        let status = if policy.auto_accept {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Pending
        };
        let new = NewBooking {
            seeker_id,
            provider_id,
            date,
            start_time,
            duration_minutes,
            total_amount,
            status,
        };

        let booking = match self.store.commit_booking(&new).await {
            Ok(booking) => booking,
            // Lost the race: another live booking claimed the slot first.
            Err(PortError::Conflict(_)) => return Err(EngineError::SlotUnavailable),
            Err(PortError::BalanceGuard) => {
                let balance = self
                    .store
                    .get_user(seeker_id)
                    .await
                    .map(|u| u.balance)
                    .unwrap_or(Decimal::ZERO);
                let shortfall = if total_amount > balance {
                    total_amount - balance
                } else {
                    Decimal::ZERO
                };
                return Err(EngineError::InsufficientFunds { shortfall });
            }
            Err(err) => return Err(err.into()),
        };

        self.emit(Event::BookingConfirmed {
            booking_id: booking.id,
            seeker_id,
            provider_id,
            date,
            start_time,
            auto_accepted: policy.auto_accept,
        })
        .await;

        Ok(booking)
    }

    /// Cancels a live booking and refunds the seeker per the refund policy.
    ///
    /// A cancellation that races a completion loses: the guarded storage
    /// transition rejects it and the caller sees `NotCancellable`.
    /// Last-writer-wins is not an option for financial transitions.
    pub async fn cancel_booking(&self, booking_id: Uuid, actor: &Actor) -> EngineResult<Booking> {
        let booking = self.store.get_booking(booking_id).await?;
        self.require_participant(&booking, actor, "cancel")?;

        if booking.status.is_terminal() {
            return Err(EngineError::NotCancellable(format!(
                "booking is already {}",
                booking.status.as_str()
            )));
        }

        let now = self.store.now().await?;
        let refund = self
            .refund_policy
            .refund_amount(booking.total_amount, booking.starts_at() - now);

        let cancelled = match self.store.commit_cancellation(booking_id, refund).await {
            Ok(cancelled) => cancelled,
            Err(PortError::Conflict(reason)) => return Err(EngineError::NotCancellable(reason)),
            Err(err) => return Err(err.into()),
        };

        self.emit(Event::BookingCancelled {
            booking_id,
            seeker_id: cancelled.seeker_id,
            provider_id: cancelled.provider_id,
            refund_amount: refund,
        })
        .await;

        Ok(cancelled)
    }

    /// Flips a confirmed booking to completed once its scheduled end has
    /// passed on the storage clock. There is no background sweep; this is
    /// the explicit wall-clock-driven transition.
    pub async fn complete_booking(&self, booking_id: Uuid, actor: &Actor) -> EngineResult<Booking> {
        let booking = self.store.get_booking(booking_id).await?;
        self.require_participant(&booking, actor, "complete")?;

        if booking.status != BookingStatus::Confirmed {
            return Err(EngineError::NotEligible(format!(
                "only confirmed bookings can be completed, this one is {}",
                booking.status.as_str()
            )));
        }

        let now = self.store.now().await?;
        if now < booking.ends_at() {
            return Err(EngineError::NotEligible(
                "the session has not finished yet".to_string(),
            ));
        }

        match self.store.mark_completed(booking_id).await {
            Ok(completed) => Ok(completed),
            Err(PortError::Conflict(reason)) => Err(EngineError::NotEligible(reason)),
            Err(err) => Err(err.into()),
        }
    }

    /// Credits the user's wallet. The credit and its `add_funds` entry are
    /// one atomic write; the stored balance stays equal to the entry sum.
    pub async fn add_funds(&self, user_id: Uuid, amount: Decimal) -> EngineResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "amount to add must be positive".to_string(),
            ));
        }

        let account = self
            .store
            .commit_funds(user_id, amount, "Wallet top-up")
            .await?;

        self.emit(Event::FundsAdded { user_id, amount }).await;

        Ok(account.balance)
    }

    async fn require_policy(&self, provider_id: Uuid) -> EngineResult<SessionPolicy> {
        self.store
            .policy_for_provider(provider_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("session policy for provider {provider_id}"))
            })
    }

    fn require_participant(
        &self,
        booking: &Booking,
        actor: &Actor,
        verb: &str,
    ) -> EngineResult<()> {
        let allowed = actor.role == Role::Admin
            || actor.user_id == booking.seeker_id
            || actor.user_id == booking.provider_id;
        if allowed {
            Ok(())
        } else {
            Err(EngineError::NotEligible(format!(
                "only the participants or an admin may {verb} a booking"
            )))
        }
    }

    async fn emit(&self, event: Event) {
        let name = event.name();
        if let Err(err) = self.notifier.publish(event).await {
            tracing::warn!(event = name, error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amount_is_rate_times_quarter_hours() {
        assert_eq!(booking_amount(dec!(25.00), 15), dec!(25.00));
        assert_eq!(booking_amount(dec!(25.00), 60), dec!(100.00));
        assert_eq!(booking_amount(dec!(12.50), 45), dec!(37.50));
    }

    #[test]
    fn full_refund_with_enough_notice() {
        let policy = RefundPolicy::default();
        assert_eq!(
            policy.refund_amount(dec!(60.00), Duration::hours(24)),
            dec!(60.00)
        );
        assert_eq!(
            policy.refund_amount(dec!(60.00), Duration::hours(72)),
            dec!(60.00)
        );
    }

    #[test]
    fn late_cancellation_refunds_the_configured_percent() {
        let policy = RefundPolicy::default();
        assert_eq!(
            policy.refund_amount(dec!(60.00), Duration::hours(23)),
            dec!(30.00)
        );
        // After the start counts as late too.
        assert_eq!(
            policy.refund_amount(dec!(60.00), Duration::hours(-1)),
            dec!(30.00)
        );
    }

    #[test]
    fn late_refund_rounds_to_cents() {
        let policy = RefundPolicy {
            full_refund_notice_hours: 24,
            late_refund_percent: 33,
        };
        // 33% of 10.01 = 3.3033 -> 3.30
        assert_eq!(
            policy.refund_amount(dec!(10.01), Duration::hours(1)),
            dec!(3.30)
        );
    }
}
