//! crates/consult_core/src/verification.rs
//!
//! Provider verification requests and the admin decision that resolves
//! them. The decision flips the provider's verified flag atomically with
//! the request status and emits `verification.decided`.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Actor, NewVerificationRequest, Role, VerificationRequest, VerificationStatus};
use crate::error::{EngineError, EngineResult};
use crate::ports::{Event, NotificationService, PortError, StorageService};

#[derive(Clone)]
pub struct VerificationDesk {
    store: Arc<dyn StorageService>,
    notifier: Arc<dyn NotificationService>,
}

impl VerificationDesk {
    pub fn new(store: Arc<dyn StorageService>, notifier: Arc<dyn NotificationService>) -> Self {
        Self { store, notifier }
    }

    pub async fn submit(
        &self,
        actor: &Actor,
        title: String,
        credentials: String,
    ) -> EngineResult<VerificationRequest> {
        if actor.role != Role::Provider {
            return Err(EngineError::NotEligible(
                "only providers can request verification".to_string(),
            ));
        }
        if title.trim().is_empty() || credentials.trim().is_empty() {
            return Err(EngineError::Validation(
                "title and credentials are required".to_string(),
            ));
        }

        let request = NewVerificationRequest {
            provider_id: actor.user_id,
            title,
            credentials,
        };
        Ok(self.store.insert_verification(&request).await?)
    }

    pub async fn decide(
        &self,
        request_id: Uuid,
        admin: &Actor,
        approve: bool,
        notes: Option<String>,
    ) -> EngineResult<VerificationRequest> {
        if admin.role != Role::Admin {
            return Err(EngineError::NotEligible(
                "only admins can decide verification requests".to_string(),
            ));
        }

        let request = self.store.get_verification(request_id).await?;
        if request.status != VerificationStatus::Pending {
            return Err(EngineError::NotEligible(format!(
                "request was already {}",
                request.status.as_str()
            )));
        }

        let decided = match self
            .store
            .commit_verification_decision(request_id, admin.user_id, approve, notes.as_deref())
            .await
        {
            Ok(decided) => decided,
            Err(PortError::Conflict(reason)) => return Err(EngineError::NotEligible(reason)),
            Err(err) => return Err(err.into()),
        };

        let event = Event::VerificationDecided {
            request_id,
            provider_id: decided.provider_id,
            approved: approve,
        };
        if let Err(err) = self.notifier.publish(event).await {
            tracing::warn!(event = "verification.decided", error = %err, "notification delivery failed");
        }

        Ok(decided)
    }
}
