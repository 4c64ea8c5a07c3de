//! Time source used by issuance and verification.
//!
//! Clock trust is bounded: a client that controls its own clock can move
//! past an expiry check. The trait exists so tests (and operators replaying
//! a verification) can pin "now" explicitly.

use chrono::{DateTime, SubsecRound, Utc};

/// Supplies the current UTC time, truncated to whole seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.trunc_subsecs(0)
    }
}
