//! Review channel access reconciliation.
//!
//! Membership of the review channel follows the reviewer rights table. Each
//! pass diffs the current rights against the snapshot applied last time and
//! only calls the channel for identities whose access changed.

mod plan;
mod reconciler;

pub use plan::{plan_access_changes, AccessPlan};
pub use reconciler::{AccessCommand, AccessHandle, AccessReconciler, AccessReport, JoinDecision, REVOKE_REASON};
