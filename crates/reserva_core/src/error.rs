//! Error types for the reserva core.

use crate::types::{ItemKey, Xid};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in reserva core operations.
///
/// Business failures (item absent, zero availability, unknown customer) are
/// not errors; operations report them as sentinel results (`Option`, `bool`,
/// a zero count or an empty bill).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The transaction id is unknown, committed, aborted or expired.
    #[error("invalid transaction {xid}")]
    InvalidTransaction {
        /// The offending transaction id.
        xid: Xid,
    },

    /// The transaction was aborted while the operation was in flight.
    ///
    /// Raised after a lock wait is broken by the deadlock policy; by the time
    /// the caller sees this error the transaction's locks are released and
    /// its before-images restored. Retry under a fresh transaction.
    #[error("transaction {xid} aborted")]
    TransactionAborted {
        /// The aborted transaction id.
        xid: Xid,
    },

    /// A lock wait exceeded the configured bound.
    ///
    /// Internal to the core: the transaction manager translates this into an
    /// abort plus [`CoreError::TransactionAborted`] before it reaches callers.
    #[error("deadlock: {xid} timed out waiting for {key}")]
    Deadlock {
        /// The waiting transaction.
        xid: Xid,
        /// The contended key.
        key: ItemKey,
    },

    /// A remote resource node was unreachable or answered out of protocol.
    #[error("communication failure with node '{node}': {message}")]
    Communication {
        /// The logical node name.
        node: String,
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid-transaction error.
    #[must_use]
    pub fn invalid_transaction(xid: Xid) -> Self {
        Self::InvalidTransaction { xid }
    }

    /// Creates a transaction-aborted error.
    #[must_use]
    pub fn transaction_aborted(xid: Xid) -> Self {
        Self::TransactionAborted { xid }
    }

    /// Creates a communication error.
    pub fn communication(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Communication {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error terminated the transaction.
    #[must_use]
    pub fn is_fatal_to_transaction(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTransaction { .. } | CoreError::TransactionAborted { .. }
        )
    }
}
