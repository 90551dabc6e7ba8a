//! LMSR Engine — Library Root
//!
//! Constant-time LMSR pricing for multi-outcome prediction markets.
//! Re-exports all modules for the service binary, integration tests and
//! benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
