//! Audit records, request correlation, and the event log contract.
//!
//! Every successful command invocation writes one [`EventRecord`] per
//! declared-and-emitted event (plus one leading record for the command
//! itself), all sharing the [`RequestId`] of the external trigger that
//! transitively caused them. The log is append-only; records are retrievable
//! in insertion order within a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for [`RequestId`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request ID: {0}")]
pub struct ParseRequestIdError(String);

/// The correlation identifier shared by one external trigger and every
/// command and event transitively caused by it.
///
/// Minted (v4 UUID) by the command invoker for the outermost call of a
/// causal chain and reused by all nested, policy-triggered invocations.
///
/// # Examples
///
/// ```
/// use scriptorium_core::record::RequestId;
///
/// let id = RequestId::new();
/// let parsed: RequestId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh random request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ParseRequestIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|err| ParseRequestIdError(err.to_string()))
    }
}

/// A not-yet-persisted audit row.
///
/// Built by the command invoker during the audit step and handed to an
/// [`EventLog`] implementation, which assigns the storage id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEventRecord {
    /// Correlates all records from one causal chain.
    pub request_id: RequestId,
    /// Discriminator string: the event's type name, or for command records
    /// the `Event > Policy > Command` origin chain.
    pub event_type: String,
    /// Serialized event or command payload.
    pub payload: serde_json::Value,
    /// Whether the producing invocation completed successfully.
    pub success: bool,
    /// Populated when the record describes a failure.
    pub failure_reason: Option<String>,
    /// Set when the event was emitted but not declared by its handler;
    /// such records are kept (a fact is never dropped) and flagged for
    /// review.
    pub undeclared: bool,
    /// Insertion timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl NewEventRecord {
    /// A record for a declared, successfully emitted event.
    #[must_use]
    pub fn success(
        request_id: RequestId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            event_type: event_type.into(),
            payload,
            success: true,
            failure_reason: None,
            undeclared: false,
            recorded_at,
        }
    }

    /// A record for an event that was emitted but never declared by its
    /// handler. The fact is persisted anyway, flagged for review.
    #[must_use]
    pub fn flagged_undeclared(
        request_id: RequestId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            undeclared: true,
            ..Self::success(request_id, event_type, payload, recorded_at)
        }
    }
}

/// A persisted audit row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    /// Storage-assigned identifier, monotonically increasing with insertion.
    pub id: i64,
    /// Correlates all records from one causal chain.
    pub request_id: RequestId,
    /// Discriminator string.
    pub event_type: String,
    /// Serialized event or command payload.
    pub payload: serde_json::Value,
    /// Whether the producing invocation completed successfully.
    pub success: bool,
    /// Populated when the record describes a failure.
    pub failure_reason: Option<String>,
    /// Set when the event was emitted but not declared by its handler.
    pub undeclared: bool,
    /// Insertion timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    /// Attach a storage id to a [`NewEventRecord`].
    #[must_use]
    pub fn from_new(id: i64, record: NewEventRecord) -> Self {
        Self {
            id,
            request_id: record.request_id,
            event_type: record.event_type,
            payload: record.payload,
            success: record.success,
            failure_reason: record.failure_reason,
            undeclared: record.undeclared,
            recorded_at: record.recorded_at,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventRecord {{ id: {}, request: {}, type: {} }}",
            self.id, self.request_id, self.event_type
        )
    }
}

/// Errors that can occur during event log operations.
#[derive(Error, Debug)]
pub enum EventLogError {
    /// The underlying store rejected the operation.
    #[error("Event log storage error: {0}")]
    Storage(String),

    /// A record could not be serialized or deserialized.
    #[error("Event log serialization error: {0}")]
    Serialization(String),
}

/// The durable, append-only audit store of all emitted events.
///
/// # Ordering
///
/// Records are retrievable in insertion order within a request id. Global
/// ordering across request ids follows wall-clock insertion time but is not
/// a correctness-bearing guarantee; only per-chain order matters to
/// consumers.
///
/// # Implementations
///
/// - `SqliteEventLog` (in `scriptorium-sqlite`): durable local storage
/// - `InMemoryEventLog` (in `scriptorium-testing`): fast, deterministic tests
pub trait EventLog: Send + Sync {
    /// Append one record, returning it with its storage id.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the write fails. Callers must
    /// not roll back an already-committed business transaction in response;
    /// the invoker retries a bounded number of times and then surfaces the
    /// inconsistency loudly.
    fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError>;

    /// Records with the given type discriminator, oldest first, at most
    /// `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the read fails.
    fn find_by_type(&self, event_type: &str, limit: usize)
    -> Result<Vec<EventRecord>, EventLogError>;

    /// All records of one causal chain, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] if the read fails.
    fn find_by_request_id(&self, request_id: &RequestId)
    -> Result<Vec<EventRecord>, EventLogError>;
}
