//! crates/consult_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or
//! notification channels.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    BlockedDate, Booking, ExternalIdentity, LedgerEntry, NewBlockedDate, NewBooking, NewReview,
    NewVerificationRequest, NewWeeklyRule, Review, SessionPolicy, UserAccount,
    VerificationRequest, WeeklyRule,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),

    /// A uniqueness guarantee at the storage layer rejected the write: a
    /// second live booking for the same slot, a duplicate blocked date, a
    /// duplicate review. The message says which.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The guarded balance debit found insufficient funds at commit time.
    #[error("Balance guard rejected the debit")]
    BalanceGuard,

    /// The storage collaborator stayed unreachable after bounded retries.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port
//=========================================================================================

/// The storage collaborator. Plain reads and writes for each entity, plus
/// the atomic commit operations the engine must never observe half-applied.
///
/// Implementations are expected to enforce two invariants of their own:
/// at most one live booking per `(provider, date, start_time)`, surfaced as
/// `Conflict`, and a balance debit that only succeeds when funds cover it,
/// surfaced as `BalanceGuard`. Both checks happen inside the same atomic
/// unit as the writes they protect.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// The single source of truth for "now". Advance-window checks must use
    /// this clock, never the caller's.
    async fn now(&self) -> PortResult<DateTime<Utc>>;

    // --- Identity ---
    /// Upserts the local account from what the identity provider asserts.
    /// The external values always win; idempotent on `external_id`.
    async fn sync_identity(&self, identity: &ExternalIdentity) -> PortResult<UserAccount>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<UserAccount>;

    // --- Availability Definition ---
    async fn rules_for_provider(&self, provider_id: Uuid) -> PortResult<Vec<WeeklyRule>>;

    async fn insert_rule(&self, rule: &NewWeeklyRule) -> PortResult<WeeklyRule>;

    async fn delete_rule(&self, provider_id: Uuid, rule_id: Uuid) -> PortResult<()>;

    async fn is_date_blocked(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<bool>;

    /// Fails with `Conflict` if the date is already blocked; duplicates are
    /// surfaced, never silently ignored.
    async fn insert_blocked_date(&self, blocked: &NewBlockedDate) -> PortResult<BlockedDate>;

    async fn delete_blocked_date(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<()>;

    async fn policy_for_provider(&self, provider_id: Uuid) -> PortResult<Option<SessionPolicy>>;

    async fn upsert_policy(&self, policy: &SessionPolicy) -> PortResult<()>;

    // --- Bookings and Ledger ---
    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Booking>;

    /// All bookings still occupying a slot on the date (everything except
    /// cancelled ones).
    async fn active_bookings_on_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<Booking>>;

    /// The atomic booking commit: insert the booking row (guarded by slot
    /// uniqueness), debit the seeker (guarded by balance), record the
    /// seeker's completed `payment` entry and the provider's pending
    /// `payout` entry. All four writes commit or roll back together.
    async fn commit_booking(&self, new: &NewBooking) -> PortResult<Booking>;

    /// Atomically flips a live booking to cancelled, credits the refund to
    /// the seeker with a completed `refund` entry (skipped when the refund
    /// is zero) and fails the provider's pending `payout` entry. A booking
    /// already in a terminal state yields `Conflict`, even when the
    /// transition raced this call.
    async fn commit_cancellation(&self, booking_id: Uuid, refund: Decimal)
        -> PortResult<Booking>;

    /// Guarded `confirmed -> completed` transition; `Conflict` if the
    /// booking is in any other state by the time the write lands.
    async fn mark_completed(&self, booking_id: Uuid) -> PortResult<Booking>;

    /// Atomically credits the user and records a completed `add_funds`
    /// entry. Returns the account with its new balance.
    async fn commit_funds(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> PortResult<UserAccount>;

    async fn ledger_for_user(&self, user_id: Uuid) -> PortResult<Vec<LedgerEntry>>;

    // --- Reviews ---
    async fn review_for_booking(&self, booking_id: Uuid) -> PortResult<Option<Review>>;

    async fn provider_ratings(&self, provider_id: Uuid) -> PortResult<Vec<i16>>;

    /// Atomically inserts the review (guarded by one-review-per-booking)
    /// and writes the recomputed provider aggregates alongside it.
    async fn commit_review(
        &self,
        review: &NewReview,
        average_rating: Decimal,
        total_reviews: i64,
    ) -> PortResult<Review>;

    // --- Verification ---
    async fn insert_verification(
        &self,
        request: &NewVerificationRequest,
    ) -> PortResult<VerificationRequest>;

    async fn get_verification(&self, request_id: Uuid) -> PortResult<VerificationRequest>;

    /// Atomically decides a pending request and flips the provider's
    /// verified flag; `Conflict` if the request was already decided.
    async fn commit_verification_decision(
        &self,
        request_id: Uuid,
        decided_by: Uuid,
        approve: bool,
        notes: Option<&str>,
    ) -> PortResult<VerificationRequest>;
}

//=========================================================================================
// Notification Port
//=========================================================================================

/// Events the engine emits for the external notification collaborator.
#[derive(Debug, Clone)]
pub enum Event {
    BookingConfirmed {
        booking_id: Uuid,
        seeker_id: Uuid,
        provider_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        auto_accepted: bool,
    },
    BookingCancelled {
        booking_id: Uuid,
        seeker_id: Uuid,
        provider_id: Uuid,
        refund_amount: Decimal,
    },
    VerificationDecided {
        request_id: Uuid,
        provider_id: Uuid,
        approved: bool,
    },
    FundsAdded {
        user_id: Uuid,
        amount: Decimal,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BookingConfirmed { .. } => "booking.confirmed",
            Event::BookingCancelled { .. } => "booking.cancelled",
            Event::VerificationDecided { .. } => "verification.decided",
            Event::FundsAdded { .. } => "funds.added",
        }
    }
}

/// Fire-and-forget event delivery. Failures are logged by the caller and
/// never roll back the operation that emitted the event.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn publish(&self, event: Event) -> PortResult<()>;
}
