//! The post → publication gate. Scheduling always runs validation first;
//! the admin surface and the CSV importer go through here and can never
//! bypass it.

use chrono::{DateTime, Utc};

use telepost_core::error::Result;
use telepost_ledger::Ledger;

use crate::validation::{Policy, Violation, validate};

/// Result of a scheduling request.
#[derive(Debug)]
pub enum ScheduleOutcome {
    /// Publication created; carries the new publication id.
    Scheduled(i64),
    /// Blocked by policy; violations are surfaced verbatim to the caller.
    Rejected(Vec<Violation>),
}

/// Validate a post against the policy snapshot and, if clean, create its
/// pending publication at `planned_at`.
pub fn schedule_post(
    ledger: &Ledger,
    post_id: i64,
    planned_at: DateTime<Utc>,
    policy: &Policy,
) -> Result<ScheduleOutcome> {
    let post = ledger.get_post(post_id)?;
    let violations = validate(&post.rendered(), policy);
    if !violations.is_empty() {
        tracing::info!(
            post_id,
            count = violations.len(),
            "post blocked from scheduling by policy"
        );
        return Ok(ScheduleOutcome::Rejected(violations));
    }
    let publication_id = ledger.schedule(post_id, planned_at)?;
    tracing::info!(post_id, publication_id, %planned_at, "post scheduled");
    Ok(ScheduleOutcome::Scheduled(publication_id))
}
