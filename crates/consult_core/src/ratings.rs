//! crates/consult_core/src/ratings.rs
//!
//! Accepts reviews for completed sessions and keeps the provider's
//! denormalized rating aggregates in step with the full review set.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{BookingStatus, NewReview, Review};
use crate::error::{EngineError, EngineResult};
use crate::ports::{PortError, StorageService};

#[derive(Clone)]
pub struct RatingAggregator {
    store: Arc<dyn StorageService>,
}

impl RatingAggregator {
    pub fn new(store: Arc<dyn StorageService>) -> Self {
        Self { store }
    }

    /// Records a review and rewrites the provider's aggregates.
    ///
    /// The average is recomputed over every rating the provider has, not
    /// nudged incrementally, so repeated floating-point accumulation can
    /// never drift it.
    pub async fn submit_review(
        &self,
        booking_id: Uuid,
        seeker_id: Uuid,
        rating: i16,
        comment: Option<String>,
    ) -> EngineResult<Review> {
        if !(1..=5).contains(&rating) {
            return Err(EngineError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let booking = self.store.get_booking(booking_id).await?;
        if booking.seeker_id != seeker_id {
            return Err(EngineError::NotEligible(
                "the booking does not belong to this seeker".to_string(),
            ));
        }
        if booking.status != BookingStatus::Completed {
            return Err(EngineError::NotEligible(
                "only completed sessions can be reviewed".to_string(),
            ));
        }
        if self.store.review_for_booking(booking_id).await?.is_some() {
            return Err(EngineError::NotEligible(
                "this session has already been reviewed".to_string(),
            ));
        }

        let mut ratings = self.store.provider_ratings(booking.provider_id).await?;
        ratings.push(rating);
        let (average_rating, total_reviews) = recompute_aggregates(&ratings);

        let review = NewReview {
            booking_id,
            seeker_id,
            provider_id: booking.provider_id,
            rating,
            comment,
        };
        match self
            .store
            .commit_review(&review, average_rating, total_reviews)
            .await
        {
            Ok(saved) => Ok(saved),
            // Lost a race against another submission for the same booking.
            Err(PortError::Conflict(_)) => Err(EngineError::NotEligible(
                "this session has already been reviewed".to_string(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

fn recompute_aggregates(ratings: &[i16]) -> (Decimal, i64) {
    if ratings.is_empty() {
        return (Decimal::ZERO, 0);
    }
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let count = ratings.len() as i64;
    let average = (Decimal::from(sum) / Decimal::from(count)).round_dp(2);
    (average, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn averages_are_recomputed_from_the_full_set() {
        assert_eq!(recompute_aggregates(&[5, 4, 3]), (dec!(4.00), 3));
        assert_eq!(recompute_aggregates(&[5, 4, 3, 2]), (dec!(3.50), 4));
    }

    #[test]
    fn empty_set_yields_zero() {
        assert_eq!(recompute_aggregates(&[]), (Decimal::ZERO, 0));
    }

    #[test]
    fn thirds_round_to_two_decimals() {
        assert_eq!(recompute_aggregates(&[5, 5, 4]), (dec!(4.67), 3));
    }
}
