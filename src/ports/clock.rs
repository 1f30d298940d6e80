//! Clock port - Source of the current instant.
//!
//! Entitlement is a function of time; injecting the clock keeps handlers
//! deterministic under test.

use crate::domain::foundation::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
