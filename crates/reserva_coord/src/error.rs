//! Error types for the coordinator.

use reserva_core::CoreError;
use thiserror::Error;

/// Result type for coordinator operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors that can occur in coordinator operations.
///
/// Business failures (unknown customer, unavailable item, refused delete)
/// are sentinel results on the operations themselves, not errors.
#[derive(Debug, Error)]
pub enum CoordError {
    /// An error surfaced by the transaction core.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CoordError {
    /// Returns true if the error terminated the calling transaction.
    #[must_use]
    pub fn is_fatal_to_transaction(&self) -> bool {
        match self {
            CoordError::Core(core) => core.is_fatal_to_transaction(),
        }
    }
}
