//! services/api/src/web/verification.rs
//!
//! Provider verification: providers submit requests, admins decide them.
//! The decision flips the provider's verified flag and emits the
//! `verification.decided` event.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use consult_core::domain::{Actor, VerificationRequest};

use crate::error::ApiError;
use crate::web::identity::CurrentUser;
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SubmitVerificationRequest {
    pub title: String,
    pub credentials: String,
}

#[derive(Serialize, ToSchema)]
pub struct VerificationResponse {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub status: String,
    pub admin_notes: Option<String>,
}

impl From<VerificationRequest> for VerificationResponse {
    fn from(request: VerificationRequest) -> Self {
        Self {
            id: request.id,
            provider_id: request.provider_id,
            title: request.title,
            status: request.status.as_str().to_string(),
            admin_notes: request.admin_notes,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct DecideVerificationRequest {
    pub approve: bool,
    pub notes: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Submit a verification request for the calling provider.
#[utoipa::path(
    post,
    path = "/verifications",
    request_body = SubmitVerificationRequest,
    responses(
        (status = 201, description = "Request submitted", body = VerificationResponse),
        (status = 409, description = "Caller is not a provider")
    )
)]
pub async fn submit_verification_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<SubmitVerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Actor {
        user_id: user.id,
        role: user.role,
    };
    let request = state
        .verification
        .submit(&actor, req.title, req.credentials)
        .await?;
    Ok((StatusCode::CREATED, Json(VerificationResponse::from(request))))
}

/// Approve or reject a pending verification request (admin only).
#[utoipa::path(
    post,
    path = "/verifications/{request_id}/decision",
    params(("request_id" = Uuid, Path, description = "The request to decide")),
    request_body = DecideVerificationRequest,
    responses(
        (status = 200, description = "Request decided", body = VerificationResponse),
        (status = 409, description = "Request was already decided")
    )
)]
pub async fn decide_verification_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<DecideVerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Actor {
        user_id: user.id,
        role: user.role,
    };
    let request = state
        .verification
        .decide(request_id, &actor, req.approve, req.notes)
        .await?;
    Ok(Json(VerificationResponse::from(request)))
}
