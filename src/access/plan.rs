//! Pure membership diff.

use std::collections::BTreeSet;

use crate::review::{ChannelId, ReviewerId, ReviewerRightsSnapshot};

/// Membership changes for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPlan {
    /// Identities to remove from the channel.
    pub revoke: BTreeSet<ReviewerId>,
    /// Identities to unblock.
    pub restore: BTreeSet<ReviewerId>,
    /// True when the previous snapshot was ignored.
    pub full_scan: bool,
}

impl AccessPlan {
    /// True when there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revoke.is_empty() && self.restore.is_empty()
    }
}

/// Computes the minimal set of revoke and restore operations.
///
/// A channel other than `previous_channel` (including the first pass, where
/// there is none) forces a full scan from `current` alone. Otherwise only
/// identities whose right changed, or that appeared, are touched, plus every
/// identity that disappeared from the admin set, which is revoked.
///
/// `revoke` and `restore` are disjoint and only contain identities from
/// `previous` or `current`.
#[must_use]
pub fn plan_access_changes(
    previous: &ReviewerRightsSnapshot,
    previous_channel: Option<ChannelId>,
    current: &ReviewerRightsSnapshot,
    channel: ChannelId,
) -> AccessPlan {
    let mut plan = AccessPlan {
        full_scan: previous_channel != Some(channel),
        ..AccessPlan::default()
    };

    if plan.full_scan {
        for (identity, allowed) in current.iter() {
            if allowed {
                plan.restore.insert(identity);
            } else {
                plan.revoke.insert(identity);
            }
        }
        return plan;
    }

    for (identity, allowed) in current.iter() {
        match (previous.get(identity), allowed) {
            (Some(false), false) | (Some(true), true) => {}
            (_, false) => {
                plan.revoke.insert(identity);
            }
            (_, true) => {
                plan.restore.insert(identity);
            }
        }
    }
    plan.revoke
        .extend(previous.identities().filter(|id| !current.contains(*id)));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(entries: &[(i64, bool)]) -> ReviewerRightsSnapshot {
        entries.iter().map(|(id, allowed)| (ReviewerId::new(*id), *allowed)).collect()
    }

    fn ids(raw: &[i64]) -> BTreeSet<ReviewerId> {
        raw.iter().copied().map(ReviewerId::new).collect()
    }

    const CHAT: ChannelId = ChannelId::new(-100);

    #[test]
    fn incremental_diff_touches_only_changes() {
        let previous = snap(&[(1, true), (2, false)]);
        let current = snap(&[(1, false), (2, true), (3, true)]);
        let plan = plan_access_changes(&previous, Some(CHAT), &current, CHAT);
        assert!(!plan.full_scan);
        assert_eq!(plan.revoke, ids(&[1]));
        assert_eq!(plan.restore, ids(&[2, 3]));
        assert!(plan.revoke.is_disjoint(&plan.restore));
    }

    #[test]
    fn unchanged_rights_produce_empty_plan() {
        let previous = snap(&[(1, true), (2, false)]);
        let plan = plan_access_changes(&previous, Some(CHAT), &previous.clone(), CHAT);
        assert!(plan.is_empty());
    }

    #[test]
    fn removed_admin_is_revoked() {
        let previous = snap(&[(1, true), (2, false), (4, true)]);
        let current = snap(&[(1, true)]);
        let plan = plan_access_changes(&previous, Some(CHAT), &current, CHAT);
        assert_eq!(plan.revoke, ids(&[2, 4]));
        assert!(plan.restore.is_empty());
    }

    #[test]
    fn new_disallowed_identity_is_revoked() {
        let previous = snap(&[]);
        let current = snap(&[(5, false)]);
        let plan = plan_access_changes(&previous, Some(CHAT), &current, CHAT);
        assert_eq!(plan.revoke, ids(&[5]));
    }

    #[test]
    fn channel_change_forces_full_scan() {
        let previous = snap(&[(1, true), (2, false)]);
        let current = snap(&[(1, true), (2, false), (3, true)]);
        let plan = plan_access_changes(&previous, Some(ChannelId::new(-1)), &current, CHAT);
        assert!(plan.full_scan);
        assert_eq!(plan.revoke, ids(&[2]));
        assert_eq!(plan.restore, ids(&[1, 3]));
    }

    #[test]
    fn first_pass_is_full_scan() {
        let current = snap(&[(1, true)]);
        let plan = plan_access_changes(&ReviewerRightsSnapshot::new(), None, &current, CHAT);
        assert!(plan.full_scan);
        assert_eq!(plan.restore, ids(&[1]));
    }
}
