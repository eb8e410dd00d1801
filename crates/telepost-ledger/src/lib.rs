//! # Telepost Ledger
//!
//! SQLite-backed publication ledger. One row per (post, planned time)
//! combination tracking planned vs. actual send time, status, and attempt
//! count. Rows are never deleted — the ledger is the audit trail.
//!
//! The dispatch loop is the only writer of publication delivery state; the
//! admin surface reads concurrently and may cancel pending publications.

pub mod ledger;
pub mod slots;

pub use ledger::{CommitOutcome, DispatchItem, Ledger};
