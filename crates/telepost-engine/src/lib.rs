//! # Telepost Engine
//!
//! The scheduling heart: a single background worker that wakes on a fixed
//! interval, selects due publications in a deterministic order, invokes the
//! delivery port, and writes outcomes back to the ledger. Items missed
//! while the worker was down are recovered automatically — anything still
//! pending with `ready_at` in the past is due on the next wake.
//!
//! Also home to the validation engine that gates what may be scheduled.

pub mod dispatch;
pub mod scheduling;
pub mod validation;

pub use dispatch::{DispatchLoop, TickStats};
pub use scheduling::{ScheduleOutcome, schedule_post};
pub use validation::{Policy, Violation, validate};
