//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `StorageService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Two invariants live here rather than in application code: the partial
//! unique index on live bookings arbitrates the double-booking race, and
//! the guarded balance update refuses to debit an account below zero.
//! Every multi-row commit runs inside one transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use consult_core::domain::{
    weekday_from_index, weekday_index, BlockedDate, Booking, BookingStatus, ExternalIdentity,
    LedgerEntry, LedgerKind, LedgerStatus, NewBlockedDate, NewBooking, NewReview,
    NewVerificationRequest, NewWeeklyRule, Review, Role, SessionPolicy, UserAccount,
    VerificationRequest, VerificationStatus, WeeklyRule,
};
use consult_core::ports::{PortError, PortResult, StorageService};

/// Transient read failures are retried this many times before surfacing.
const READ_ATTEMPTS: u32 = 3;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `StorageService` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Mapping and Read Retries
//=========================================================================================

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

fn db_err(err: sqlx::Error) -> PortError {
    if is_transient(&err) {
        PortError::Unavailable(err.to_string())
    } else {
        PortError::Unexpected(err.to_string())
    }
}

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Retries an idempotent read with exponential backoff on transient
/// failures (network blips, pool timeouts). Writes are never routed
/// through here: a commit whose acknowledgement was lost must not be
/// blindly replayed.
async fn retry_read<T, F, Fut>(op: F) -> PortResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt + 1 < READ_ATTEMPTS => {
                attempt += 1;
                let backoff = Duration::from_millis(50 * 2u64.pow(attempt));
                warn!(error = %err, attempt, "transient storage error, retrying read");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(db_err(err)),
        }
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    external_id: String,
    email: String,
    name: String,
    role: String,
    balance: Decimal,
}

impl UserRecord {
    fn to_domain(self) -> PortResult<UserAccount> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| PortError::Unexpected(format!("unknown role '{}'", self.role)))?;
        Ok(UserAccount {
            id: self.id,
            external_id: self.external_id,
            email: self.email,
            name: self.name,
            role,
            balance: self.balance,
        })
    }
}

#[derive(FromRow)]
struct RuleRecord {
    id: Uuid,
    provider_id: Uuid,
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl RuleRecord {
    fn to_domain(self) -> PortResult<WeeklyRule> {
        let day_of_week = weekday_from_index(self.day_of_week as u8).ok_or_else(|| {
            PortError::Unexpected(format!("day_of_week {} out of range", self.day_of_week))
        })?;
        Ok(WeeklyRule {
            id: self.id,
            provider_id: self.provider_id,
            day_of_week,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}

#[derive(FromRow)]
struct BlockedRecord {
    id: Uuid,
    provider_id: Uuid,
    blocked_date: NaiveDate,
    reason: Option<String>,
}

impl BlockedRecord {
    fn to_domain(self) -> BlockedDate {
        BlockedDate {
            id: self.id,
            provider_id: self.provider_id,
            date: self.blocked_date,
            reason: self.reason,
        }
    }
}

#[derive(FromRow)]
struct PolicyRecord {
    provider_id: Uuid,
    rate_per_15min: Decimal,
    buffer_minutes: i32,
    max_advance_days: i32,
    min_advance_hours: i32,
    auto_accept: bool,
}

impl PolicyRecord {
    fn to_domain(self) -> SessionPolicy {
        SessionPolicy {
            provider_id: self.provider_id,
            rate_per_15min: self.rate_per_15min,
            buffer_minutes: self.buffer_minutes as u32,
            max_advance_days: self.max_advance_days as u32,
            min_advance_hours: self.min_advance_hours as u32,
            auto_accept: self.auto_accept,
        }
    }
}

#[derive(FromRow)]
struct BookingRecord {
    id: Uuid,
    seeker_id: Uuid,
    provider_id: Uuid,
    scheduled_date: NaiveDate,
    start_time: NaiveTime,
    duration_minutes: i32,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl BookingRecord {
    fn to_domain(self) -> PortResult<Booking> {
        let status = BookingStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown booking status '{}'", self.status))
        })?;
        Ok(Booking {
            id: self.id,
            seeker_id: self.seeker_id,
            provider_id: self.provider_id,
            date: self.scheduled_date,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes as u32,
            total_amount: self.total_amount,
            status,
            created_at: self.created_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, seeker_id, provider_id, scheduled_date, start_time, \
                               duration_minutes, total_amount, status, created_at";

#[derive(FromRow)]
struct LedgerRecord {
    id: Uuid,
    user_id: Uuid,
    booking_id: Option<Uuid>,
    kind: String,
    amount: Decimal,
    status: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl LedgerRecord {
    fn to_domain(self) -> PortResult<LedgerEntry> {
        let kind = LedgerKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!("unknown ledger kind '{}'", self.kind))
        })?;
        let status = LedgerStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown ledger status '{}'", self.status))
        })?;
        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            booking_id: self.booking_id,
            kind,
            amount: self.amount,
            status,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRecord {
    id: Uuid,
    booking_id: Uuid,
    seeker_id: Uuid,
    provider_id: Uuid,
    rating: i16,
    comment: Option<String>,
}

impl ReviewRecord {
    fn to_domain(self) -> Review {
        Review {
            id: self.id,
            booking_id: self.booking_id,
            seeker_id: self.seeker_id,
            provider_id: self.provider_id,
            rating: self.rating,
            comment: self.comment,
        }
    }
}

#[derive(FromRow)]
struct VerificationRecord {
    id: Uuid,
    provider_id: Uuid,
    title: String,
    credentials: String,
    status: String,
    admin_notes: Option<String>,
}

impl VerificationRecord {
    fn to_domain(self) -> PortResult<VerificationRequest> {
        let status = VerificationStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown verification status '{}'", self.status))
        })?;
        Ok(VerificationRequest {
            id: self.id,
            provider_id: self.provider_id,
            title: self.title,
            credentials: self.credentials,
            status,
            admin_notes: self.admin_notes,
        })
    }
}

//=========================================================================================
// Transaction Helpers
//=========================================================================================

async fn insert_ledger_entry(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    booking_id: Option<Uuid>,
    kind: LedgerKind,
    amount: Decimal,
    status: LedgerStatus,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ledger_entries (user_id, booking_id, kind, amount, status, description)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(booking_id)
    .bind(kind.as_str())
    .bind(amount)
    .bind(status.as_str())
    .bind(description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Ensures the denormalized profile row exists before an update touches it.
async fn ensure_provider_profile(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO provider_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(provider_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

//=========================================================================================
// `StorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl StorageService for PgStore {
    async fn now(&self) -> PortResult<DateTime<Utc>> {
        let pool = self.pool.clone();
        retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, DateTime<Utc>>("SELECT now()")
                    .fetch_one(&pool)
                    .await
            }
        })
        .await
    }

    async fn sync_identity(&self, identity: &ExternalIdentity) -> PortResult<UserAccount> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO user_accounts (external_id, email, name, role)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (external_id) DO UPDATE
                SET email = EXCLUDED.email,
                    name = EXCLUDED.name,
                    role = EXCLUDED.role,
                    updated_at = now()
             RETURNING id, external_id, email, name, role, balance",
        )
        .bind(&identity.external_id)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(identity.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if identity.role == Role::Provider {
            ensure_provider_profile(&mut tx, record.id)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        record.to_domain()
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<UserAccount> {
        let pool = self.pool.clone();
        let record = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, UserRecord>(
                    "SELECT id, external_id, email, name, role, balance
                     FROM user_accounts WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        record
            .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?
            .to_domain()
    }

    async fn rules_for_provider(&self, provider_id: Uuid) -> PortResult<Vec<WeeklyRule>> {
        let pool = self.pool.clone();
        let records = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, RuleRecord>(
                    "SELECT id, provider_id, day_of_week, start_time, end_time
                     FROM weekly_rules WHERE provider_id = $1
                     ORDER BY day_of_week, start_time",
                )
                .bind(provider_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await?;
        records.into_iter().map(RuleRecord::to_domain).collect()
    }

    async fn insert_rule(&self, rule: &NewWeeklyRule) -> PortResult<WeeklyRule> {
        sqlx::query_as::<_, RuleRecord>(
            "INSERT INTO weekly_rules (provider_id, day_of_week, start_time, end_time)
             VALUES ($1, $2, $3, $4)
             RETURNING id, provider_id, day_of_week, start_time, end_time",
        )
        .bind(rule.provider_id)
        .bind(i16::from(weekday_index(rule.day_of_week)))
        .bind(rule.start_time)
        .bind(rule.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .to_domain()
    }

    async fn delete_rule(&self, provider_id: Uuid, rule_id: Uuid) -> PortResult<()> {
        let result =
            sqlx::query("DELETE FROM weekly_rules WHERE id = $1 AND provider_id = $2")
                .bind(rule_id)
                .bind(provider_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("rule {rule_id}")));
        }
        Ok(())
    }

    async fn is_date_blocked(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<bool> {
        let pool = self.pool.clone();
        retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (
                         SELECT 1 FROM blocked_dates
                         WHERE provider_id = $1 AND blocked_date = $2
                     )",
                )
                .bind(provider_id)
                .bind(date)
                .fetch_one(&pool)
                .await
            }
        })
        .await
    }

    async fn insert_blocked_date(&self, blocked: &NewBlockedDate) -> PortResult<BlockedDate> {
        let record = sqlx::query_as::<_, BlockedRecord>(
            "INSERT INTO blocked_dates (provider_id, blocked_date, reason)
             VALUES ($1, $2, $3)
             RETURNING id, provider_id, blocked_date, reason",
        )
        .bind(blocked.provider_id)
        .bind(blocked.date)
        .bind(&blocked.reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                PortError::Conflict(format!("date {} is already blocked", blocked.date))
            } else {
                db_err(err)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn delete_blocked_date(&self, provider_id: Uuid, date: NaiveDate) -> PortResult<()> {
        let result = sqlx::query(
            "DELETE FROM blocked_dates WHERE provider_id = $1 AND blocked_date = $2",
        )
        .bind(provider_id)
        .bind(date)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("blocked date {date}")));
        }
        Ok(())
    }

    async fn policy_for_provider(&self, provider_id: Uuid) -> PortResult<Option<SessionPolicy>> {
        let pool = self.pool.clone();
        let record = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, PolicyRecord>(
                    "SELECT provider_id, rate_per_15min, buffer_minutes, max_advance_days,
                            min_advance_hours, auto_accept
                     FROM session_policies WHERE provider_id = $1",
                )
                .bind(provider_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        Ok(record.map(PolicyRecord::to_domain))
    }

    async fn upsert_policy(&self, policy: &SessionPolicy) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO session_policies
                 (provider_id, rate_per_15min, buffer_minutes, max_advance_days,
                  min_advance_hours, auto_accept)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (provider_id) DO UPDATE
                SET rate_per_15min = EXCLUDED.rate_per_15min,
                    buffer_minutes = EXCLUDED.buffer_minutes,
                    max_advance_days = EXCLUDED.max_advance_days,
                    min_advance_hours = EXCLUDED.min_advance_hours,
                    auto_accept = EXCLUDED.auto_accept,
                    updated_at = now()",
        )
        .bind(policy.provider_id)
        .bind(policy.rate_per_15min)
        .bind(policy.buffer_minutes as i32)
        .bind(policy.max_advance_days as i32)
        .bind(policy.min_advance_hours as i32)
        .bind(policy.auto_accept)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Booking> {
        let pool = self.pool.clone();
        let record = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, BookingRecord>(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
                ))
                .bind(booking_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        record
            .ok_or_else(|| PortError::NotFound(format!("booking {booking_id}")))?
            .to_domain()
    }

    async fn active_bookings_on_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Vec<Booking>> {
        let pool = self.pool.clone();
        let records = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, BookingRecord>(&format!(
                    "SELECT {BOOKING_COLUMNS} FROM bookings
                     WHERE provider_id = $1 AND scheduled_date = $2 AND status <> 'cancelled'
                     ORDER BY start_time",
                ))
                .bind(provider_id)
                .bind(date)
                .fetch_all(&pool)
                .await
            }
        })
        .await?;
        records.into_iter().map(BookingRecord::to_domain).collect()
    }

    async fn commit_booking(&self, new: &NewBooking) -> PortResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The partial unique index on live bookings makes the second
        // concurrent writer fail right here.
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "INSERT INTO bookings
                 (seeker_id, provider_id, scheduled_date, start_time, duration_minutes,
                  total_amount, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {BOOKING_COLUMNS}",
        ))
        .bind(new.seeker_id)
        .bind(new.provider_id)
        .bind(new.date)
        .bind(new.start_time)
        .bind(new.duration_minutes as i32)
        .bind(new.total_amount)
        .bind(new.status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                PortError::Conflict("slot already has a live booking".to_string())
            } else {
                db_err(err)
            }
        })?;

        // Funds check and debit as one guarded write; zero rows means the
        // balance no longer covers the amount.
        let debit = sqlx::query(
            "UPDATE user_accounts SET balance = balance - $1, updated_at = now()
             WHERE id = $2 AND balance >= $1",
        )
        .bind(new.total_amount)
        .bind(new.seeker_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if debit.rows_affected() == 0 {
            // Dropping the transaction rolls the booking insert back.
            return Err(PortError::BalanceGuard);
        }

        insert_ledger_entry(
            &mut tx,
            new.seeker_id,
            Some(record.id),
            LedgerKind::Payment,
            new.total_amount,
            LedgerStatus::Completed,
            "Payment for session",
        )
        .await
        .map_err(db_err)?;

        // The payout stays pending until external settlement flips it.
        insert_ledger_entry(
            &mut tx,
            new.provider_id,
            Some(record.id),
            LedgerKind::Payout,
            new.total_amount,
            LedgerStatus::Pending,
            "Session payout",
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        record.to_domain()
    }

    async fn commit_cancellation(
        &self,
        booking_id: Uuid,
        refund: Decimal,
    ) -> PortResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Guarded transition: a booking that raced into a terminal state
        // stays there.
        let updated = sqlx::query_as::<_, BookingRecord>(&format!(
            "UPDATE bookings SET status = 'cancelled', updated_at = now()
             WHERE id = $1 AND status IN ('pending', 'confirmed')
             RETURNING {BOOKING_COLUMNS}",
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let record = match updated {
            Some(record) => record,
            None => {
                let status = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM bookings WHERE id = $1",
                )
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
                return Err(match status {
                    Some(status) => PortError::Conflict(format!("booking is already {status}")),
                    None => PortError::NotFound(format!("booking {booking_id}")),
                });
            }
        };

        if refund > Decimal::ZERO {
            sqlx::query(
                "UPDATE user_accounts SET balance = balance + $1, updated_at = now()
                 WHERE id = $2",
            )
            .bind(refund)
            .bind(record.seeker_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            insert_ledger_entry(
                &mut tx,
                record.seeker_id,
                Some(booking_id),
                LedgerKind::Refund,
                refund,
                LedgerStatus::Completed,
                "Refund for cancelled session",
            )
            .await
            .map_err(db_err)?;
        }

        // The provider's pending payout dies with the booking.
        sqlx::query(
            "UPDATE ledger_entries SET status = 'failed'
             WHERE booking_id = $1 AND kind = 'payout' AND status = 'pending'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        record.to_domain()
    }

    async fn mark_completed(&self, booking_id: Uuid) -> PortResult<Booking> {
        let updated = sqlx::query_as::<_, BookingRecord>(&format!(
            "UPDATE bookings SET status = 'completed', updated_at = now()
             WHERE id = $1 AND status = 'confirmed'
             RETURNING {BOOKING_COLUMNS}",
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match updated {
            Some(record) => record.to_domain(),
            None => {
                let status = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM bookings WHERE id = $1",
                )
                .bind(booking_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
                Err(match status {
                    Some(status) => PortError::Conflict(format!("booking is {status}")),
                    None => PortError::NotFound(format!("booking {booking_id}")),
                })
            }
        }
    }

    async fn commit_funds(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> PortResult<UserAccount> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "UPDATE user_accounts SET balance = balance + $1, updated_at = now()
             WHERE id = $2
             RETURNING id, external_id, email, name, role, balance",
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| PortError::NotFound(format!("user {user_id}")))?;

        insert_ledger_entry(
            &mut tx,
            user_id,
            None,
            LedgerKind::AddFunds,
            amount,
            LedgerStatus::Completed,
            description,
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        record.to_domain()
    }

    async fn ledger_for_user(&self, user_id: Uuid) -> PortResult<Vec<LedgerEntry>> {
        let pool = self.pool.clone();
        let records = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, LedgerRecord>(
                    "SELECT id, user_id, booking_id, kind, amount, status, description, created_at
                     FROM ledger_entries WHERE user_id = $1
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await?;
        records.into_iter().map(LedgerRecord::to_domain).collect()
    }

    async fn review_for_booking(&self, booking_id: Uuid) -> PortResult<Option<Review>> {
        let pool = self.pool.clone();
        let record = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, ReviewRecord>(
                    "SELECT id, booking_id, seeker_id, provider_id, rating, comment
                     FROM reviews WHERE booking_id = $1",
                )
                .bind(booking_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        Ok(record.map(ReviewRecord::to_domain))
    }

    async fn provider_ratings(&self, provider_id: Uuid) -> PortResult<Vec<i16>> {
        let pool = self.pool.clone();
        retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, i16>(
                    "SELECT rating FROM reviews WHERE provider_id = $1",
                )
                .bind(provider_id)
                .fetch_all(&pool)
                .await
            }
        })
        .await
    }

    async fn commit_review(
        &self,
        review: &NewReview,
        average_rating: Decimal,
        total_reviews: i64,
    ) -> PortResult<Review> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let record = sqlx::query_as::<_, ReviewRecord>(
            "INSERT INTO reviews (booking_id, seeker_id, provider_id, rating, comment)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, booking_id, seeker_id, provider_id, rating, comment",
        )
        .bind(review.booking_id)
        .bind(review.seeker_id)
        .bind(review.provider_id)
        .bind(review.rating)
        .bind(&review.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if unique_violation(&err) {
                PortError::Conflict("booking already has a review".to_string())
            } else {
                db_err(err)
            }
        })?;

        // The aggregates land in the same transaction as the review row.
        ensure_provider_profile(&mut tx, review.provider_id)
            .await
            .map_err(db_err)?;
        sqlx::query(
            "UPDATE provider_profiles
             SET average_rating = $1, total_reviews = $2, updated_at = now()
             WHERE user_id = $3",
        )
        .bind(average_rating)
        .bind(total_reviews)
        .bind(review.provider_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(record.to_domain())
    }

    async fn insert_verification(
        &self,
        request: &NewVerificationRequest,
    ) -> PortResult<VerificationRequest> {
        sqlx::query_as::<_, VerificationRecord>(
            "INSERT INTO verification_requests (provider_id, title, credentials)
             VALUES ($1, $2, $3)
             RETURNING id, provider_id, title, credentials, status, admin_notes",
        )
        .bind(request.provider_id)
        .bind(&request.title)
        .bind(&request.credentials)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .to_domain()
    }

    async fn get_verification(&self, request_id: Uuid) -> PortResult<VerificationRequest> {
        let pool = self.pool.clone();
        let record = retry_read(|| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, VerificationRecord>(
                    "SELECT id, provider_id, title, credentials, status, admin_notes
                     FROM verification_requests WHERE id = $1",
                )
                .bind(request_id)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        record
            .ok_or_else(|| PortError::NotFound(format!("verification request {request_id}")))?
            .to_domain()
    }

    async fn commit_verification_decision(
        &self,
        request_id: Uuid,
        decided_by: Uuid,
        approve: bool,
        notes: Option<&str>,
    ) -> PortResult<VerificationRequest> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let next_status = if approve {
            VerificationStatus::Approved
        } else {
            VerificationStatus::Rejected
        };
        let updated = sqlx::query_as::<_, VerificationRecord>(
            "UPDATE verification_requests
             SET status = $2, admin_notes = $3, decided_by = $4, decided_at = now()
             WHERE id = $1 AND status = 'pending'
             RETURNING id, provider_id, title, credentials, status, admin_notes",
        )
        .bind(request_id)
        .bind(next_status.as_str())
        .bind(notes)
        .bind(decided_by)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let record = match updated {
            Some(record) => record,
            None => {
                let status = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM verification_requests WHERE id = $1",
                )
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
                return Err(match status {
                    Some(status) => PortError::Conflict(format!("request was already {status}")),
                    None => {
                        PortError::NotFound(format!("verification request {request_id}"))
                    }
                });
            }
        };

        if approve {
            ensure_provider_profile(&mut tx, record.provider_id)
                .await
                .map_err(db_err)?;
            sqlx::query(
                "UPDATE provider_profiles SET is_verified = TRUE, updated_at = now()
                 WHERE user_id = $1",
            )
            .bind(record.provider_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        record.to_domain()
    }
}
