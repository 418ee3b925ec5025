//! Journaled multi-leg order executor.
//!
//! Turns one logical multi-leg operation into broker orders under a
//! write-ahead journal: every leg gets a durable journal row before its
//! broker call is issued, per-leg outcomes are recorded as they resolve,
//! and the group aggregates to COMPLETED, PARTIALLY_DONE, or FAILED.

pub mod executor;
pub mod report;

pub use executor::{ExecutionPolicy, ExecutorError, JournaledExecutor};
pub use report::{ExecutionReport, LegOutcome, LegReport};
