//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the Repository port using append-only JSONL files for the
//! trade journal and an atomic JSON snapshot of engine state.
//! `JournalSink` bridges the synchronous engine to the async writer.

pub mod repository_impl;
pub mod sink;
pub mod state;
pub mod trades;

pub use repository_impl::RepositoryImpl;
pub use sink::{JournalSink, run_journal};
pub use state::StateStore;
pub use trades::TradeLogger;
