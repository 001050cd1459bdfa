pub mod availability;
pub mod booking;
pub mod domain;
pub mod error;
pub mod ports;
pub mod ratings;
pub mod slots;
pub mod verification;

pub use availability::AvailabilityStore;
pub use booking::{booking_amount, BookingLedger, RefundPolicy};
pub use domain::{
    Actor, BlockedDate, Booking, BookingStatus, ExternalIdentity, LedgerEntry, LedgerKind,
    LedgerStatus, ProviderProfile, Review, Role, SessionPolicy, UserAccount, VerificationRequest,
    VerificationStatus, WeeklyRule,
};
pub use error::{EngineError, EngineResult};
pub use ports::{Event, NotificationService, PortError, PortResult, StorageService};
pub use ratings::RatingAggregator;
pub use slots::SlotGenerator;
pub use verification::VerificationDesk;
