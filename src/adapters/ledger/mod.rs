//! Ledger Adapters - Custody Implementations
//!
//! `InMemoryLedger` keeps balances and holdings in process memory. It
//! backs the service binary and the integration tests.

pub mod memory;

pub use memory::InMemoryLedger;
