//! services/api/src/web/identity.rs
//!
//! Identity reconciliation middleware. The external identity provider has
//! already authenticated the caller; what arrives here are its trusted
//! assertions (`x-user-id`, `x-user-role`, plus profile headers). Each
//! request syncs those into the local account store, with the provider's
//! values always winning, and hands the resolved account to the handlers.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use consult_core::domain::{ExternalIdentity, Role, UserAccount};

use crate::error::ApiError;
use crate::web::state::AppState;

/// The reconciled caller, stashed in request extensions.
#[derive(Clone)]
pub struct CurrentUser(pub UserAccount);

/// Middleware that resolves the identity headers into a local `UserAccount`.
///
/// If the headers are missing or malformed, returns 401 Unauthorized.
pub async fn reconcile_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    // 1. Extract the identity provider's assertions
    let headers = req.headers();
    let external_id = required_header(headers, "x-user-id")?;
    let role_raw = required_header(headers, "x-user-role")?;
    let role = Role::parse(&role_raw).ok_or((
        StatusCode::UNAUTHORIZED,
        format!("unknown role '{role_raw}'"),
    ))?;
    let email = optional_header(headers, "x-user-email").unwrap_or_default();
    let name = optional_header(headers, "x-user-name").unwrap_or_else(|| "User".to_string());

    // 2. One-way sync into local storage, idempotent on the external id
    let identity = ExternalIdentity {
        external_id,
        email,
        name,
        role,
    };
    let account = state.store.sync_identity(&identity).await.map_err(|e| {
        error!("Failed to reconcile identity: {:?}", e);
        (
            StatusCode::UNAUTHORIZED,
            "identity could not be resolved".to_string(),
        )
    })?;

    // 3. Hand the resolved account to the handlers
    req.extensions_mut().insert(CurrentUser(account));

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// Rejects callers whose reconciled role does not match.
pub fn require_role(user: &UserAccount, role: Role) -> Result<(), ApiError> {
    if user.role == role {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "this operation requires the {} role",
            role.as_str()
        )))
    }
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String, (StatusCode, String)> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            format!("{name} header is required"),
        ))
}

fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
