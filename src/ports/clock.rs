//! Clock Port - Time Source
//!
//! TWAP accrual needs a monotonic-enough seconds counter. Production uses
//! the system clock; tests drive time by hand.

/// Unix-seconds time source.
pub trait Clock: Send + Sync {
  fn now(&self) -> u64;
}
