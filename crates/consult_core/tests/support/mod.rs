//! In-memory implementations of the storage and notification ports.
//!
//! The store mirrors the guarantees a real database gives the engine: the
//! atomic commit operations run under one lock, the slot-uniqueness and
//! balance guards are enforced inside that critical section, and "now" is
//! whatever the test pins it to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use consult_core::domain::{
    BlockedDate, Booking, BookingStatus, ExternalIdentity, LedgerEntry, LedgerKind, LedgerStatus,
    NewBlockedDate, NewBooking, NewReview, NewVerificationRequest, NewWeeklyRule, ProviderProfile,
    Review, Role, SessionPolicy, UserAccount, VerificationRequest, VerificationStatus, WeeklyRule,
};
use consult_core::ports::{Event, NotificationService, PortError, PortResult, StorageService};

#[derive(Default)]
struct State {
    now: Option<DateTime<Utc>>,
    users: HashMap<Uuid, UserAccount>,
    profiles: HashMap<Uuid, ProviderProfile>,
    rules: Vec<WeeklyRule>,
    blocked: Vec<BlockedDate>,
    policies: HashMap<Uuid, SessionPolicy>,
    bookings: Vec<Booking>,
    ledger: Vec<LedgerEntry>,
    reviews: Vec<Review>,
    verifications: HashMap<Uuid, VerificationRequest>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state.lock().unwrap().now = Some(now);
    }

    pub fn add_user(&self, role: Role, balance: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        let account = UserAccount {
            id,
            external_id: format!("ext-{id}"),
            email: format!("{id}@example.test"),
            name: "Test User".to_string(),
            role,
            balance,
        };
        self.state.lock().unwrap().users.insert(id, account);
        id
    }

    pub fn balance_of(&self, user_id: Uuid) -> Decimal {
        self.state.lock().unwrap().users[&user_id].balance
    }

    pub fn profile_of(&self, provider_id: Uuid) -> Option<ProviderProfile> {
        self.state.lock().unwrap().profiles.get(&provider_id).cloned()
    }

    pub fn entries_of(&self, user_id: Uuid) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .unwrap()
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn blocked_count(&self, provider_id: Uuid, date: NaiveDate) -> usize {
        self.state
            .lock()
            .unwrap()
            .blocked
            .iter()
            .filter(|b| b.provider_id == provider_id && b.date == date)
            .count()
    }

    pub fn bookings_of(&self, provider_id: Uuid) -> Vec<Booking> {
        self.state
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|b| b.provider_id == provider_id)
            .cloned()
            .collect()
    }

    fn profile_entry(state: &mut State, provider_id: Uuid) -> &mut ProviderProfile {
        state.profiles.entry(provider_id).or_insert(ProviderProfile {
            user_id: provider_id,
            is_verified: false,
            average_rating: Decimal::ZERO,
            total_reviews: 0,
        })
    }
}

#[async_trait]
impl StorageService for MemoryStore {
    async fn now(&self) -> PortResult<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .now
            .ok_or_else(|| PortError::Unexpected("test clock was never set".to_string()))
    }

    async fn sync_identity(&self, identity: &ExternalIdentity) -> PortResult<UserAccount> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .users
            .values_mut()
            .find(|u| u.external_id == identity.external_id)
        {
            existing.email = identity.email.clone();
            existing.name = identity.name.clone();
            existing.role = identity.role;
            return Ok(existing.clone());
        }
        let account = UserAccount {
            id: Uuid::new_v4(),
            external_id: identity.external_id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role,
            balance: Decimal::ZERO,
        };
        state.users.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<UserAccount> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))
    }

    async fn rules_for_provider(&self, provider_id: Uuid) -> PortResult<Vec<WeeklyRule>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .rules
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn insert_rule(&self, rule: &NewWeeklyRule) -> PortResult<WeeklyRule> {
        let row = WeeklyRule {
            id: Uuid::new_v4(),
            provider_id: rule.provider_id,
            day_of_week: rule.day_of_week,
            start_time: rule.start_time,
            end_time: rule.end_time,
        };
        self.state.lock().unwrap().rules.push(row.clone());
        Ok(row)
    }

    async fn delete_rule(&self, provider_id: Uuid, rule_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.rules.len();
        state
            .rules
            .retain(|r| !(r.provider_id == provider_id && r.id == rule_id));
        if state.rules.len() == before {
            return Err(PortError::NotFound(format!("rule {rule_id}")));
        }
        Ok(())
    }

    async fn is_date_blocked(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocked
            .iter()
            .any(|b| b.provider_id == provider_id && b.date == date))
    }

    async fn insert_blocked_date(&self, blocked: &NewBlockedDate) -> PortResult<BlockedDate> {
        let mut state = self.state.lock().unwrap();
        if state
            .blocked
            .iter()
            .any(|b| b.provider_id == blocked.provider_id && b.date == blocked.date)
        {
            return Err(PortError::Conflict(format!(
                "date {} is already blocked",
                blocked.date
            )));
        }
        let row = BlockedDate {
            id: Uuid::new_v4(),
            provider_id: blocked.provider_id,
            date: blocked.date,
            reason: blocked.reason.clone(),
        };
        state.blocked.push(row.clone());
        Ok(row)
    }

    async fn delete_blocked_date(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.blocked.len();
        state
            .blocked
            .retain(|b| !(b.provider_id == provider_id && b.date == date));
        if state.blocked.len() == before {
            return Err(PortError::NotFound(format!("blocked date {date}")));
        }
        Ok(())
    }

    async fn policy_for_provider(&self, provider_id: Uuid) -> PortResult<Option<SessionPolicy>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .policies
            .get(&provider_id)
            .cloned())
    }

    async fn upsert_policy(&self, policy: &SessionPolicy) -> PortResult<()> {
        self.state
            .lock()
            .unwrap()
            .policies
            .insert(policy.provider_id, policy.clone());
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Booking> {
        self.state
            .lock()
            .unwrap()
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("booking {booking_id}")))
    }

    async fn active_bookings_on_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<Booking>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bookings
            .iter()
            .filter(|b| {
                b.provider_id == provider_id && b.date == date && b.status.occupies_slot()
            })
            .cloned()
            .collect())
    }

    async fn commit_booking(&self, new: &NewBooking) -> PortResult<Booking> {
        let mut state = self.state.lock().unwrap();

        // Slot-uniqueness guard, the in-memory stand-in for the partial
        // unique index.
        let slot_taken = state.bookings.iter().any(|b| {
            b.provider_id == new.provider_id
                && b.date == new.date
                && b.start_time == new.start_time
                && b.status.occupies_slot()
        });
        if slot_taken {
            return Err(PortError::Conflict("slot already has a live booking".to_string()));
        }

        // Balance guard: the debit only happens when funds cover it.
        let seeker = state
            .users
            .get_mut(&new.seeker_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", new.seeker_id)))?;
        if seeker.balance < new.total_amount {
            return Err(PortError::BalanceGuard);
        }
        seeker.balance -= new.total_amount;

        let now = state.now.unwrap_or_else(Utc::now);
        let booking = Booking {
            id: Uuid::new_v4(),
            seeker_id: new.seeker_id,
            provider_id: new.provider_id,
            date: new.date,
            start_time: new.start_time,
            duration_minutes: new.duration_minutes,
            total_amount: new.total_amount,
            status: new.status,
            created_at: now,
        };
        state.bookings.push(booking.clone());
        state.ledger.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: new.seeker_id,
            booking_id: Some(booking.id),
            kind: LedgerKind::Payment,
            amount: new.total_amount,
            status: LedgerStatus::Completed,
            description: Some("Payment for session".to_string()),
            created_at: now,
        });
        state.ledger.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id: new.provider_id,
            booking_id: Some(booking.id),
            kind: LedgerKind::Payout,
            amount: new.total_amount,
            status: LedgerStatus::Pending,
            description: Some("Session payout".to_string()),
            created_at: now,
        });
        Ok(booking)
    }

    async fn commit_cancellation(
        &self,
        booking_id: Uuid,
        refund: Decimal,
    ) -> PortResult<Booking> {
        let mut state = self.state.lock().unwrap();
        let now = state.now.unwrap_or_else(Utc::now);

        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| PortError::NotFound(format!("booking {booking_id}")))?;
        if booking.status.is_terminal() {
            return Err(PortError::Conflict(format!(
                "booking is already {}",
                booking.status.as_str()
            )));
        }
        booking.status = BookingStatus::Cancelled;
        let cancelled = booking.clone();
        let seeker_id = cancelled.seeker_id;

        if refund > Decimal::ZERO {
            let seeker = state
                .users
                .get_mut(&seeker_id)
                .ok_or_else(|| PortError::NotFound(format!("user {seeker_id}")))?;
            seeker.balance += refund;
            state.ledger.push(LedgerEntry {
                id: Uuid::new_v4(),
                user_id: seeker_id,
                booking_id: Some(booking_id),
                kind: LedgerKind::Refund,
                amount: refund,
                status: LedgerStatus::Completed,
                description: Some("Refund for cancelled session".to_string()),
                created_at: now,
            });
        }

        for entry in state.ledger.iter_mut().filter(|e| {
            e.booking_id == Some(booking_id)
                && e.kind == LedgerKind::Payout
                && e.status == LedgerStatus::Pending
        }) {
            entry.status = LedgerStatus::Failed;
        }

        Ok(cancelled)
    }

    async fn mark_completed(&self, booking_id: Uuid) -> PortResult<Booking> {
        let mut state = self.state.lock().unwrap();
        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id)
            .ok_or_else(|| PortError::NotFound(format!("booking {booking_id}")))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(PortError::Conflict(format!(
                "booking is {}",
                booking.status.as_str()
            )));
        }
        booking.status = BookingStatus::Completed;
        Ok(booking.clone())
    }

    async fn commit_funds(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> PortResult<UserAccount> {
        let mut state = self.state.lock().unwrap();
        let now = state.now.unwrap_or_else(Utc::now);
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;
        user.balance += amount;
        let updated = user.clone();
        state.ledger.push(LedgerEntry {
            id: Uuid::new_v4(),
            user_id,
            booking_id: None,
            kind: LedgerKind::AddFunds,
            amount,
            status: LedgerStatus::Completed,
            description: Some(description.to_string()),
            created_at: now,
        });
        Ok(updated)
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> PortResult<Vec<LedgerEntry>> {
        Ok(self.entries_of(user_id))
    }

    async fn review_for_booking(&self, booking_id: Uuid) -> PortResult<Option<Review>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reviews
            .iter()
            .find(|r| r.booking_id == booking_id)
            .cloned())
    }

    async fn provider_ratings(&self, provider_id: Uuid) -> PortResult<Vec<i16>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reviews
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .map(|r| r.rating)
            .collect())
    }

    async fn commit_review(
        &self,
        review: &NewReview,
        average_rating: Decimal,
        total_reviews: i64,
    ) -> PortResult<Review> {
        let mut state = self.state.lock().unwrap();
        if state
            .reviews
            .iter()
            .any(|r| r.booking_id == review.booking_id)
        {
            return Err(PortError::Conflict("booking already has a review".to_string()));
        }
        let row = Review {
            id: Uuid::new_v4(),
            booking_id: review.booking_id,
            seeker_id: review.seeker_id,
            provider_id: review.provider_id,
            rating: review.rating,
            comment: review.comment.clone(),
        };
        state.reviews.push(row.clone());
        let profile = Self::profile_entry(&mut state, review.provider_id);
        profile.average_rating = average_rating;
        profile.total_reviews = total_reviews;
        Ok(row)
    }

    async fn insert_verification(
        &self,
        request: &NewVerificationRequest,
    ) -> PortResult<VerificationRequest> {
        let row = VerificationRequest {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            title: request.title.clone(),
            credentials: request.credentials.clone(),
            status: VerificationStatus::Pending,
            admin_notes: None,
        };
        self.state
            .lock()
            .unwrap()
            .verifications
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_verification(&self, request_id: Uuid) -> PortResult<VerificationRequest> {
        self.state
            .lock()
            .unwrap()
            .verifications
            .get(&request_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("verification request {request_id}")))
    }

    async fn commit_verification_decision(
        &self,
        request_id: Uuid,
        _decided_by: Uuid,
        approve: bool,
        notes: Option<&str>,
    ) -> PortResult<VerificationRequest> {
        let mut state = self.state.lock().unwrap();
        let request = state
            .verifications
            .get_mut(&request_id)
            .ok_or_else(|| PortError::NotFound(format!("verification request {request_id}")))?;
        if request.status != VerificationStatus::Pending {
            return Err(PortError::Conflict(format!(
                "request was already {}",
                request.status.as_str()
            )));
        }
        request.status = if approve {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };
        request.admin_notes = notes.map(str::to_string);
        let decided = request.clone();
        let provider_id = decided.provider_id;
        if approve {
            Self::profile_entry(&mut state, provider_id).is_verified = true;
        }
        Ok(decided)
    }
}

//=========================================================================================
// Recording Notifier
//=========================================================================================

/// Captures every published event; can be told to fail so tests can prove
/// notification failures never block the triggering operation.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(Event::name).collect()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn publish(&self, event: Event) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("notification channel down".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
