//! Group completion detection and one-shot report delivery.

use chrono::NaiveDate;
use routine_core::types::Routine;
use routine_notify::{Delivery, GroupReport, ReportSink};

use crate::ledger::DailyLedger;
use crate::persistence::RoutineStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCheck {
    /// The group already produced its report today.
    AlreadyReported,
    /// The group has no routines on this date.
    Empty,
    /// Members still waiting to fire.
    Unresolved { remaining: usize },
    /// Report built and handed to the sink.
    Reported { delivery: Delivery },
    StoreUnavailable,
}

/// A member counts as resolved once it has a final status or the daemon has
/// already handled it today (a timeout may leave the status pending).
pub fn is_member_resolved(routine: &Routine, ledger: &DailyLedger) -> bool {
    routine.status.is_terminal() || ledger.is_handled(routine.id)
}

pub fn unresolved_count(members: &[Routine], ledger: &DailyLedger) -> usize {
    members
        .iter()
        .filter(|member| !is_member_resolved(member, ledger))
        .count()
}

/// Sends the group's report once every member is resolved. The group is
/// marked reported whatever the delivery result, so a dropped report is not
/// retried.
pub fn report_if_resolved(
    group: &str,
    date: NaiveDate,
    store: &dyn RoutineStore,
    ledger: &mut DailyLedger,
    sink: &mut dyn ReportSink,
) -> GroupCheck {
    if ledger.is_group_reported(group) {
        return GroupCheck::AlreadyReported;
    }

    let members = match store.routines_in_group(group, date) {
        Ok(members) => members,
        Err(err) => {
            tracing::warn!(group, error = %err, "failed to load group members");
            return GroupCheck::StoreUnavailable;
        }
    };
    if members.is_empty() {
        return GroupCheck::Empty;
    }

    let remaining = unresolved_count(&members, ledger);
    if remaining > 0 {
        tracing::debug!(group, remaining, "group not yet resolved");
        return GroupCheck::Unresolved { remaining };
    }

    let report = GroupReport::from_routines(group, &members);
    let delivery = sink.send(&report);
    ledger.mark_group_reported(group);
    match &delivery {
        Delivery::Sent => {
            tracing::info!(group, members = members.len(), sink = ?sink.kind(), "group report sent")
        }
        Delivery::Dropped { reason } => {
            tracing::warn!(group, reason = %reason, "group report dropped")
        }
    }
    GroupCheck::Reported { delivery }
}
