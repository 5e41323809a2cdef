//! The transactional unit-of-work boundary handlers execute inside.
//!
//! The mediator does not know what the underlying store is; it only brackets
//! handler execution with begin/commit/rollback through these traits.
//! Repositories used inside handlers are opaque to the mediator.

use std::fmt;
use thiserror::Error;

/// Whether a transaction may commit writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionMode {
    /// No writes are committed, even if the handler mistakenly mutates
    /// state. Used for query execution.
    ReadOnly,
    /// Writes are committed on success, rolled back on handler failure.
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Errors raised at the transaction boundary.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The store could not open a transaction.
    #[error("Failed to begin {mode} transaction: {reason}")]
    Begin {
        /// Requested mode.
        mode: TransactionMode,
        /// Store-reported cause.
        reason: String,
    },

    /// Commit failed; the transaction's effects are not durable.
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// Rollback failed; the store may need recovery.
    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),
}

/// An open transaction. Consumed by exactly one of `commit` or `rollback`.
pub trait Transaction: Send {
    /// Make the transaction's writes durable (no-op for read-only scopes).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Commit`] if the store rejects the commit.
    fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    /// Discard the transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Rollback`] if the store cannot restore
    /// its previous state.
    fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Factory for transactions over the shared mutable store.
///
/// Implementations must be `Send + Sync`; the built registry and invokers
/// are shared across request threads and rely on the store for isolation
/// between concurrently executing commands.
pub trait UnitOfWork: Send + Sync {
    /// Open a transaction in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Begin`] if the store cannot open one.
    fn begin(&self, mode: TransactionMode) -> Result<Box<dyn Transaction>, TransactionError>;
}
