//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use consult_core::ports::{NotificationService, StorageService};
use consult_core::{
    AvailabilityStore, BookingLedger, RatingAggregator, SlotGenerator, VerificationDesk,
};

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn StorageService>,
    pub availability: AvailabilityStore,
    pub slots: SlotGenerator,
    pub ledger: BookingLedger,
    pub ratings: RatingAggregator,
    pub verification: VerificationDesk,
}

impl AppState {
    /// Wires the engine services to the given port implementations.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn StorageService>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        let availability = AvailabilityStore::new(store.clone());
        let slots = SlotGenerator::new(store.clone());
        let ledger = BookingLedger::new(store.clone(), notifier.clone(), config.refund_policy);
        let ratings = RatingAggregator::new(store.clone());
        let verification = VerificationDesk::new(store.clone(), notifier);

        Self {
            config,
            store,
            availability,
            slots,
            ledger,
            ratings,
            verification,
        }
    }
}
