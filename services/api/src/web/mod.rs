pub mod availability;
pub mod identity;
pub mod rest;
pub mod state;
pub mod verification;
pub mod wallet;

// Re-export the pieces the binary needs to build the router.
pub use identity::reconcile_identity;
pub use rest::ApiDoc;
pub use state::AppState;
