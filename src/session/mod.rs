//! Session persistence and expiry.

pub mod cleanup;
pub mod store;

pub use cleanup::{CleanupHandle, CleanupScheduler, SweepReport};
pub use store::{ResultsRecord, SessionId, SessionStore};
