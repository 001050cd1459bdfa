//! crates/consult_core/src/domain.rs
//!
//! Defines the pure, core data structures for the booking engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use uuid::Uuid;

/// The fixed granularity of the scheduling grid, in minutes.
pub const SLOT_TICK_MINUTES: u32 = 15;

//=========================================================================================
// Users and Identity
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Seeker,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seeker" => Some(Role::Seeker),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The local shadow of a user managed by the external identity provider.
/// `balance` is derived state: it must always equal the signed sum of the
/// user's completed ledger entries.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub balance: Decimal,
}

/// What the external identity provider asserts about the caller.
/// Reconciled into a `UserAccount` on every authenticated request; the
/// provider's values always win over locally stored ones.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// An authenticated caller, as resolved by the identity collaborator.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

/// Denormalized provider aggregates. Never edited directly: ratings are
/// recomputed from the full review set, verification is flipped by an
/// admin decision.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub user_id: Uuid,
    pub is_verified: bool,
    pub average_rating: Decimal,
    pub total_reviews: i64,
}

//=========================================================================================
// Availability
//=========================================================================================

/// A recurring weekly availability window. Confined to a single calendar
/// day: `start_time < end_time`, no crossing midnight.
#[derive(Debug, Clone)]
pub struct WeeklyRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct NewWeeklyRule {
    pub provider_id: Uuid,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// A calendar date that is fully unavailable regardless of weekly rules.
#[derive(Debug, Clone)]
pub struct BlockedDate {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBlockedDate {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

/// Per-provider session settings. One row per provider; the engine falls
/// back to `with_defaults` when a provider has not configured anything yet.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub provider_id: Uuid,
    pub rate_per_15min: Decimal,
    pub buffer_minutes: u32,
    pub max_advance_days: u32,
    pub min_advance_hours: u32,
    pub auto_accept: bool,
}

impl SessionPolicy {
    pub fn with_defaults(provider_id: Uuid, rate_per_15min: Decimal) -> Self {
        Self {
            provider_id,
            rate_per_15min,
            buffer_minutes: 15,
            max_advance_days: 30,
            min_advance_hours: 24,
            auto_accept: true,
        }
    }
}

//=========================================================================================
// Bookings
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled bookings never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// A live booking occupies its slot; cancelled ones do not.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// A confirmed or pending reservation of a provider's slot.
/// `total_amount` is frozen at creation time; later rate changes never
/// retroactively affect it.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub seeker_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.start_time))
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at() + Duration::minutes(i64::from(self.duration_minutes))
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub seeker_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub total_amount: Decimal,
    pub status: BookingStatus,
}

//=========================================================================================
// Ledger
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Payment,
    Payout,
    AddFunds,
    Refund,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Payment => "payment",
            LedgerKind::Payout => "payout",
            LedgerKind::AddFunds => "add_funds",
            LedgerKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment" => Some(LedgerKind::Payment),
            "payout" => Some(LedgerKind::Payout),
            "add_funds" => Some(LedgerKind::AddFunds),
            "refund" => Some(LedgerKind::Refund),
            _ => None,
        }
    }

    /// Signed direction from the entry owner's perspective.
    pub fn is_credit(&self) -> bool {
        matches!(self, LedgerKind::AddFunds | LedgerKind::Refund)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Pending,
    Completed,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Completed => "completed",
            LedgerStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LedgerStatus::Pending),
            "completed" => Some(LedgerStatus::Completed),
            "failed" => Some(LedgerStatus::Failed),
            _ => None,
        }
    }
}

/// An immutable record of a single balance-affecting event. Balances are
/// derived from completed entries, never edited on their own.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub kind: LedgerKind,
    pub amount: Decimal,
    pub status: LedgerStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Reviews
//=========================================================================================

/// One review per completed booking, enforced at the storage layer.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub seeker_id: Uuid,
    pub provider_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub booking_id: Uuid,
    pub seeker_id: Uuid,
    pub provider_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

//=========================================================================================
// Verification
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "approved" => Some(VerificationStatus::Approved),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub credentials: String,
    pub status: VerificationStatus,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewVerificationRequest {
    pub provider_id: Uuid,
    pub title: String,
    pub credentials: String,
}

//=========================================================================================
// Time and Weekday Helpers
//=========================================================================================

/// Minutes elapsed since midnight. All scheduling math happens on this
/// scale so that interval arithmetic never wraps around a day boundary.
pub fn minutes_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Inverse of `minutes_of_day` for values inside one day.
pub fn time_from_minutes(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
        .expect("minute offset fits within a single day")
}

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)`
/// overlap iff `a_start < b_end && b_start < a_end`.
pub fn intervals_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}

/// Day-of-week numbering used at the storage boundary: Sunday = 0 .. Saturday = 6.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_index(day: Weekday) -> u8 {
    day.num_days_from_sunday() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_round_trip() {
        let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert_eq!(minutes_of_day(nine_thirty), 570);
        assert_eq!(time_from_minutes(570), nine_thirty);
    }

    #[test]
    fn half_open_intervals_do_not_overlap_when_abutting() {
        // [540, 570) and [570, 600) share only the boundary point.
        assert!(!intervals_overlap(540, 570, 570, 600));
        assert!(intervals_overlap(540, 571, 570, 600));
        assert!(intervals_overlap(560, 620, 570, 600));
    }

    #[test]
    fn weekday_indices_use_sunday_zero() {
        assert_eq!(weekday_from_index(0), Some(Weekday::Sun));
        assert_eq!(weekday_from_index(1), Some(Weekday::Mon));
        assert_eq!(weekday_index(Weekday::Sat), 6);
        assert_eq!(weekday_from_index(7), None);
    }

    #[test]
    fn cancelled_bookings_release_their_slot() {
        assert!(BookingStatus::Pending.occupies_slot());
        assert!(BookingStatus::Confirmed.occupies_slot());
        assert!(BookingStatus::Completed.occupies_slot());
        assert!(!BookingStatus::Cancelled.occupies_slot());
    }
}
