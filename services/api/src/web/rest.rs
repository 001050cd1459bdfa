//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for slot discovery, bookings and reviews,
//! plus the master definition for the OpenAPI specification.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use consult_core::domain::{Actor, Booking, Review};

use crate::error::ApiError;
use crate::web::identity::CurrentUser;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_slots_handler,
        create_booking_handler,
        cancel_booking_handler,
        complete_booking_handler,
        submit_review_handler,
        crate::web::availability::add_rule_handler,
        crate::web::availability::remove_rule_handler,
        crate::web::availability::block_date_handler,
        crate::web::availability::unblock_date_handler,
        crate::web::availability::set_policy_handler,
        crate::web::wallet::get_wallet_handler,
        crate::web::wallet::add_funds_handler,
        crate::web::verification::submit_verification_handler,
        crate::web::verification::decide_verification_handler,
    ),
    components(
        schemas(
            SlotsResponse,
            CreateBookingRequest,
            BookingResponse,
            SubmitReviewRequest,
            ReviewResponse,
            crate::web::availability::AddRuleRequest,
            crate::web::availability::RuleResponse,
            crate::web::availability::BlockDateRequest,
            crate::web::availability::BlockedDateResponse,
            crate::web::availability::SetPolicyRequest,
            crate::web::wallet::WalletResponse,
            crate::web::wallet::LedgerEntryResponse,
            crate::web::wallet::AddFundsRequest,
            crate::web::verification::SubmitVerificationRequest,
            crate::web::verification::VerificationResponse,
            crate::web::verification::DecideVerificationRequest,
        )
    ),
    tags(
        (name = "Booking Engine API", description = "Availability, booking and ledger endpoints for the consultation marketplace.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The bookable start times for one provider and date.
#[derive(Serialize, ToSchema)]
pub struct SlotsResponse {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub slots: Vec<NaiveTime>,
}

#[derive(Deserialize, IntoParams)]
pub struct SlotsQuery {
    /// The calendar date to generate slots for.
    pub date: NaiveDate,
    /// Requested session length in minutes; must be a multiple of 15.
    pub duration: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
}

#[derive(Serialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub seeker_id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub total_amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            seeker_id: booking.seeker_id,
            provider_id: booking.provider_id,
            date: booking.date,
            start_time: booking.start_time,
            duration_minutes: booking.duration_minutes,
            total_amount: booking.total_amount,
            status: booking.status.as_str().to_string(),
            created_at: booking.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitReviewRequest {
    pub booking_id: Uuid,
    /// Star rating between 1 and 5.
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            booking_id: review.booking_id,
            provider_id: review.provider_id,
            rating: review.rating,
            comment: review.comment,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the bookable start times for a provider on a date.
///
/// An empty list is a normal answer: the provider simply has no
/// availability that day.
#[utoipa::path(
    get,
    path = "/providers/{provider_id}/slots",
    params(
        ("provider_id" = Uuid, Path, description = "The provider to query"),
        SlotsQuery
    ),
    responses(
        (status = 200, description = "Bookable start times", body = SlotsResponse),
        (status = 400, description = "Malformed duration"),
        (status = 401, description = "Missing identity headers")
    )
)]
pub async fn list_slots_handler(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slots = state
        .slots
        .generate_slots(provider_id, query.date, query.duration)
        .await?;
    Ok(Json(SlotsResponse {
        provider_id,
        date: query.date,
        duration_minutes: query.duration,
        slots,
    }))
}

/// Book a slot, debiting the seeker's wallet.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = BookingResponse),
        (status = 402, description = "Insufficient funds, message carries the shortfall"),
        (status = 409, description = "Slot is no longer available")
    )
)]
pub async fn create_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .ledger
        .create_booking(
            user.id,
            req.provider_id,
            req.date,
            req.start_time,
            req.duration_minutes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// Cancel a live booking; the refund follows the configured policy.
#[utoipa::path(
    post,
    path = "/bookings/{booking_id}/cancel",
    params(("booking_id" = Uuid, Path, description = "The booking to cancel")),
    responses(
        (status = 200, description = "Booking cancelled", body = BookingResponse),
        (status = 409, description = "Booking is already completed or cancelled")
    )
)]
pub async fn cancel_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Actor {
        user_id: user.id,
        role: user.role,
    };
    let booking = state.ledger.cancel_booking(booking_id, &actor).await?;
    Ok(Json(BookingResponse::from(booking)))
}

/// Mark a confirmed booking completed once its scheduled end has passed.
#[utoipa::path(
    post,
    path = "/bookings/{booking_id}/complete",
    params(("booking_id" = Uuid, Path, description = "The booking to complete")),
    responses(
        (status = 200, description = "Booking completed", body = BookingResponse),
        (status = 409, description = "The session has not finished or is not confirmed")
    )
)]
pub async fn complete_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Actor {
        user_id: user.id,
        role: user.role,
    };
    let booking = state.ledger.complete_booking(booking_id, &actor).await?;
    Ok(Json(BookingResponse::from(booking)))
}

/// Review a completed session; the provider's aggregates are recomputed.
#[utoipa::path(
    post,
    path = "/reviews",
    request_body = SubmitReviewRequest,
    responses(
        (status = 201, description = "Review recorded", body = ReviewResponse),
        (status = 409, description = "The booking is not reviewable")
    )
)]
pub async fn submit_review_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let review = state
        .ratings
        .submit_review(req.booking_id, user.id, req.rating, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::from(review))))
}
