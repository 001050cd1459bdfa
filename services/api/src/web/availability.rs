//! services/api/src/web/availability.rs
//!
//! Provider-facing endpoints for managing weekly rules, blocked dates and
//! the session policy. Every handler requires the provider role and
//! operates on the caller's own schedule.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use consult_core::domain::{
    weekday_from_index, weekday_index, BlockedDate, SessionPolicy, WeeklyRule,
};
use consult_core::{EngineError, Role};

use crate::error::ApiError;
use crate::web::identity::{require_role, CurrentUser};
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AddRuleRequest {
    /// Day of week, Sunday = 0 through Saturday = 6.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Serialize, ToSchema)]
pub struct RuleResponse {
    pub id: Uuid,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl From<WeeklyRule> for RuleResponse {
    fn from(rule: WeeklyRule) -> Self {
        Self {
            id: rule.id,
            day_of_week: weekday_index(rule.day_of_week),
            start_time: rule.start_time,
            end_time: rule.end_time,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct BlockDateRequest {
    pub date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct BlockedDateResponse {
    pub id: Uuid,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

impl From<BlockedDate> for BlockedDateResponse {
    fn from(blocked: BlockedDate) -> Self {
        Self {
            id: blocked.id,
            date: blocked.date,
            reason: blocked.reason,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SetPolicyRequest {
    pub rate_per_15min: Decimal,
    pub buffer_minutes: u32,
    pub max_advance_days: u32,
    pub min_advance_hours: u32,
    pub auto_accept: bool,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Add a recurring weekly availability rule.
#[utoipa::path(
    post,
    path = "/availability/rules",
    request_body = AddRuleRequest,
    responses(
        (status = 201, description = "Rule added", body = RuleResponse),
        (status = 409, description = "Rule overlaps an existing one"),
        (status = 403, description = "Caller is not a provider")
    )
)]
pub async fn add_rule_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<AddRuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&user, Role::Provider)?;
    let day = weekday_from_index(req.day_of_week).ok_or_else(|| {
        ApiError::Engine(EngineError::Validation(
            "day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ))
    })?;
    let rule = state
        .availability
        .add_rule(user.id, day, req.start_time, req.end_time)
        .await?;
    Ok((StatusCode::CREATED, Json(RuleResponse::from(rule))))
}

/// Remove a weekly availability rule.
#[utoipa::path(
    delete,
    path = "/availability/rules/{rule_id}",
    params(("rule_id" = Uuid, Path, description = "The rule to remove")),
    responses(
        (status = 204, description = "Rule removed"),
        (status = 404, description = "No such rule for this provider")
    )
)]
pub async fn remove_rule_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(rule_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&user, Role::Provider)?;
    state.availability.remove_rule(user.id, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Block a calendar date entirely.
#[utoipa::path(
    post,
    path = "/availability/blocked-dates",
    request_body = BlockDateRequest,
    responses(
        (status = 201, description = "Date blocked", body = BlockedDateResponse),
        (status = 409, description = "Date is already blocked")
    )
)]
pub async fn block_date_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<BlockDateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&user, Role::Provider)?;
    let blocked = state
        .availability
        .block_date(user.id, req.date, req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(BlockedDateResponse::from(blocked))))
}

/// Unblock a previously blocked date.
#[utoipa::path(
    delete,
    path = "/availability/blocked-dates/{date}",
    params(("date" = NaiveDate, Path, description = "The date to unblock")),
    responses(
        (status = 204, description = "Date unblocked"),
        (status = 404, description = "Date was not blocked")
    )
)]
pub async fn unblock_date_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(date): Path<NaiveDate>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&user, Role::Provider)?;
    state.availability.unblock_date(user.id, date).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set the provider's session policy (rate, buffer, advance windows).
#[utoipa::path(
    put,
    path = "/availability/policy",
    request_body = SetPolicyRequest,
    responses(
        (status = 204, description = "Policy saved"),
        (status = 400, description = "Invalid rate or window")
    )
)]
pub async fn set_policy_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SetPolicyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&user, Role::Provider)?;
    state
        .availability
        .set_policy(SessionPolicy {
            provider_id: user.id,
            rate_per_15min: req.rate_per_15min,
            buffer_minutes: req.buffer_minutes,
            max_advance_days: req.max_advance_days,
            min_advance_hours: req.min_advance_hours,
            auto_accept: req.auto_accept,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
