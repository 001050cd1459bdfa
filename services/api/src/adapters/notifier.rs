//! services/api/src/adapters/notifier.rs
//!
//! Best-effort notification delivery backed by the `notifications` table.
//! Implements the `NotificationService` port; the engine treats every
//! publish as fire-and-forget, so failures here are logged upstream and
//! never roll anything back.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use consult_core::ports::{Event, NotificationService, PortError, PortResult};

/// An adapter that turns engine events into per-user notification rows.
#[derive(Clone)]
pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    /// Creates a new `PgNotifier`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        user_id: Uuid,
        kind: &str,
        title: &str,
        message: String,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, message)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(kind)
        .bind(title)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationService for PgNotifier {
    async fn publish(&self, event: Event) -> PortResult<()> {
        match event {
            Event::BookingConfirmed {
                seeker_id,
                provider_id,
                date,
                start_time,
                auto_accepted,
                ..
            } => {
                self.insert(
                    provider_id,
                    "booking",
                    "New booking",
                    format!("You have a new booking on {date} at {start_time}"),
                )
                .await?;
                let seeker_title = if auto_accepted {
                    "Booking confirmed"
                } else {
                    "Booking requested"
                };
                self.insert(
                    seeker_id,
                    "booking",
                    seeker_title,
                    format!("Your session on {date} at {start_time} has been recorded"),
                )
                .await
            }
            Event::BookingCancelled {
                seeker_id,
                provider_id,
                refund_amount,
                ..
            } => {
                self.insert(
                    provider_id,
                    "booking",
                    "Booking cancelled",
                    "A session on your calendar was cancelled".to_string(),
                )
                .await?;
                self.insert(
                    seeker_id,
                    "booking",
                    "Booking cancelled",
                    format!("Your session was cancelled; {refund_amount} was refunded"),
                )
                .await
            }
            Event::VerificationDecided {
                provider_id,
                approved,
                ..
            } => {
                let message = if approved {
                    "Your professional verification has been approved"
                } else {
                    "Your verification request needs more information"
                };
                self.insert(
                    provider_id,
                    "verification",
                    "Verification decided",
                    message.to_string(),
                )
                .await
            }
            Event::FundsAdded { user_id, amount } => {
                self.insert(
                    user_id,
                    "payment",
                    "Funds added",
                    format!("{amount} was added to your wallet"),
                )
                .await
            }
        }
    }
}
