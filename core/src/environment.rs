//! Injected dependency traits.
//!
//! External concerns are abstracted behind traits so production and test
//! wiring can differ without touching the mediator.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Production code uses [`SystemClock`]; tests pin time with the `FixedClock`
/// from `scriptorium-testing` so audit timestamps are deterministic.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// System clock - reads the host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
