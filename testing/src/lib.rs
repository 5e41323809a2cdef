//! # Scriptorium Testing
//!
//! Testing utilities and in-memory stores for the Scriptorium architecture.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time for reproducible audit timestamps
//! - [`InMemoryEventLog`]: a fast, truncatable event log
//! - [`MemoryDb`]: a snapshot/restore transactional store implementing the
//!   [`UnitOfWork`] boundary for handlers under test
//!
//! ## Example
//!
//! ```
//! use scriptorium_testing::MemoryDb;
//! use scriptorium_core::transaction::{Transaction, TransactionMode, UnitOfWork};
//!
//! #[derive(Clone, Default)]
//! struct Folders {
//!     names: Vec<String>,
//! }
//!
//! let db = MemoryDb::new(Folders::default());
//! let tx = db.begin(TransactionMode::ReadWrite).unwrap();
//! db.write(|state| state.names.push("inbox".to_string()));
//! tx.rollback().unwrap();
//!
//! assert!(db.read(|state| state.names.is_empty()));
//! ```

pub use clock::{FixedClock, test_clock};
pub use event_log::InMemoryEventLog;
pub use store::MemoryDb;

/// Install a compact tracing subscriber for a test run.
///
/// Honors `RUST_LOG`; repeated calls are no-ops, so every test can call it
/// first thing.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic clocks.
pub mod clock {
    use chrono::{DateTime, Utc};
    use scriptorium_core::environment::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use scriptorium_testing::clock::FixedClock;
    /// use scriptorium_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// In-memory audit log.
pub mod event_log {
    use scriptorium_core::record::{
        EventLog, EventLogError, EventRecord, NewEventRecord, RequestId,
    };
    use std::sync::{Mutex, PoisonError};

    /// An append-only event log held in memory, for tests and demos.
    ///
    /// Ids are assigned sequentially from 1; queries return records in
    /// insertion order. `clear` truncates for test isolation.
    #[derive(Debug, Default)]
    pub struct InMemoryEventLog {
        inner: Mutex<LogInner>,
    }

    #[derive(Debug, Default)]
    struct LogInner {
        next_id: i64,
        records: Vec<EventRecord>,
    }

    impl InMemoryEventLog {
        /// An empty log.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of all records, in insertion order.
        #[must_use]
        pub fn records(&self) -> Vec<EventRecord> {
            self.lock().records.clone()
        }

        /// Number of records appended.
        #[must_use]
        pub fn len(&self) -> usize {
            self.lock().records.len()
        }

        /// Whether the log holds no records.
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.lock().records.is_empty()
        }

        /// Truncate the log. Tests only; production logs are append-only.
        pub fn clear(&self) {
            self.lock().records.clear();
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl EventLog for InMemoryEventLog {
        fn append(&self, record: NewEventRecord) -> Result<EventRecord, EventLogError> {
            let mut inner = self.lock();
            inner.next_id += 1;
            let saved = EventRecord::from_new(inner.next_id, record);
            inner.records.push(saved.clone());
            Ok(saved)
        }

        fn find_by_type(
            &self,
            event_type: &str,
            limit: usize,
        ) -> Result<Vec<EventRecord>, EventLogError> {
            Ok(self
                .lock()
                .records
                .iter()
                .filter(|r| r.event_type == event_type)
                .take(limit)
                .cloned()
                .collect())
        }

        fn find_by_request_id(
            &self,
            request_id: &RequestId,
        ) -> Result<Vec<EventRecord>, EventLogError> {
            Ok(self
                .lock()
                .records
                .iter()
                .filter(|r| r.request_id == *request_id)
                .cloned()
                .collect())
        }
    }
}

/// Snapshot/restore transactional store.
pub mod store {
    use scriptorium_core::transaction::{
        Transaction, TransactionError, TransactionMode, UnitOfWork,
    };
    use std::sync::{Arc, Mutex, PoisonError};

    /// An in-memory store with snapshot/restore transaction semantics.
    ///
    /// `begin` snapshots the state; `rollback` restores it; `commit` keeps
    /// the mutations made through [`write`](MemoryDb::write) — except in
    /// read-only mode, where completion always restores the snapshot, so
    /// accidental writes are never committed.
    ///
    /// One transaction may be open at a time. The mediator commits a
    /// command's transaction before fanning its events out, so nested
    /// policy-triggered invocations never overlap with their trigger.
    /// Dropping a transaction without completing it rolls it back.
    ///
    /// Handlers hold a clone of the db (clones share state) and read or
    /// mutate it through the closure accessors; the invoker holds the same
    /// db as its [`UnitOfWork`].
    #[derive(Debug)]
    pub struct MemoryDb<S> {
        inner: Arc<Mutex<DbInner<S>>>,
    }

    impl<S> Clone for MemoryDb<S> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    #[derive(Debug)]
    struct DbInner<S> {
        state: S,
        open: Option<OpenTx<S>>,
    }

    #[derive(Debug)]
    struct OpenTx<S> {
        snapshot: S,
        mode: TransactionMode,
    }

    impl<S: Clone + Send + 'static> MemoryDb<S> {
        /// Wrap an initial state.
        #[must_use]
        pub fn new(state: S) -> Self {
            Self {
                inner: Arc::new(Mutex::new(DbInner { state, open: None })),
            }
        }

        /// Read the current state.
        pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
            let inner = lock(&self.inner);
            f(&inner.state)
        }

        /// Mutate the current state.
        pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
            let mut inner = lock(&self.inner);
            f(&mut inner.state)
        }

        /// Clone the full current state, for assertions.
        #[must_use]
        pub fn snapshot(&self) -> S {
            self.read(S::clone)
        }
    }

    fn lock<S>(inner: &Arc<Mutex<DbInner<S>>>) -> std::sync::MutexGuard<'_, DbInner<S>> {
        inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl<S: Clone + Send + 'static> UnitOfWork for MemoryDb<S> {
        fn begin(&self, mode: TransactionMode) -> Result<Box<dyn Transaction>, TransactionError> {
            let mut inner = lock(&self.inner);
            if inner.open.is_some() {
                return Err(TransactionError::Begin {
                    mode,
                    reason: "a transaction is already open".to_string(),
                });
            }
            inner.open = Some(OpenTx {
                snapshot: inner.state.clone(),
                mode,
            });
            Ok(Box::new(MemoryTransaction {
                inner: Arc::clone(&self.inner),
            }))
        }
    }

    struct MemoryTransaction<S> {
        inner: Arc<Mutex<DbInner<S>>>,
    }

    impl<S: Clone + Send + 'static> Transaction for MemoryTransaction<S> {
        fn commit(self: Box<Self>) -> Result<(), TransactionError> {
            let mut inner = lock(&self.inner);
            match inner.open.take() {
                Some(open) => {
                    if open.mode == TransactionMode::ReadOnly {
                        // Read-only scopes never commit writes.
                        inner.state = open.snapshot;
                    }
                    Ok(())
                },
                None => Err(TransactionError::Commit(
                    "no transaction is open".to_string(),
                )),
            }
        }

        fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
            let mut inner = lock(&self.inner);
            match inner.open.take() {
                Some(open) => {
                    inner.state = open.snapshot;
                    Ok(())
                },
                None => Err(TransactionError::Rollback(
                    "no transaction is open".to_string(),
                )),
            }
        }
    }

    impl<S> Drop for MemoryTransaction<S> {
        fn drop(&mut self) {
            // An abandoned transaction rolls back.
            let mut inner = lock(&self.inner);
            if let Some(open) = inner.open.take() {
                inner.state = open.snapshot;
            }
        }
    }
}
