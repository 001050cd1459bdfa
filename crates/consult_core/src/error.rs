//! crates/consult_core/src/error.rs
//!
//! The typed outcome taxonomy for every engine operation. All of these are
//! local, caller-visible results; nothing here is recovered silently.

use rust_decimal::Decimal;

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed input: zero duration, end before start, rating out of range.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A new weekly rule intersects an existing rule on the same day.
    #[error("availability rule overlaps an existing rule for that day")]
    RuleOverlap,

    /// The date is already blocked for this provider.
    #[error("date is already blocked")]
    DuplicateBlock,

    /// The slot lost a booking race, fell outside the advance window, or is
    /// now blocked. Re-checked at commit time, never trusted from a stale list.
    #[error("slot is no longer available")]
    SlotUnavailable,

    /// The seeker's balance does not cover the booking. Carries the exact
    /// shortfall so the caller can show an actionable amount.
    #[error("insufficient funds: needs {shortfall} more")]
    InsufficientFunds { shortfall: Decimal },

    /// Review or completion preconditions were not met.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// Cancellation requested on a booking already in a terminal state.
    #[error("booking can no longer be cancelled: {0}")]
    NotCancellable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The storage collaborator stayed unreachable after bounded retries.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Covers the port outcomes that map the same way everywhere. `Conflict`
/// and `BalanceGuard` are context dependent and are matched explicitly at
/// the call sites that can produce them.
impl From<PortError> for EngineError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => EngineError::NotFound(what),
            PortError::Unavailable(reason) => EngineError::StorageUnavailable(reason),
            PortError::Conflict(reason) => EngineError::Storage(reason),
            PortError::BalanceGuard => {
                EngineError::Storage("balance guard rejected an unchecked debit".to_string())
            }
            PortError::Unexpected(reason) => EngineError::Storage(reason),
        }
    }
}
