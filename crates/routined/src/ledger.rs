//! Per-day memory of handled routines and reported groups.

use chrono::NaiveDate;
use routine_core::types::RoutineId;
use std::collections::HashSet;

/// In-memory dedup state owned by the main loop. Not persisted: a restart
/// starts with an empty ledger.
#[derive(Debug, Default, Clone)]
pub struct DailyLedger {
    date: Option<NaiveDate>,
    handled: HashSet<RoutineId>,
    reported_groups: HashSet<String>,
}

impl DailyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Records the current date and clears everything when it differs from
    /// the last observed one. Returns true on a rollover.
    pub fn observe_date(&mut self, today: NaiveDate) -> bool {
        match self.date {
            Some(previous) if previous == today => false,
            Some(previous) => {
                tracing::info!(
                    from = %previous,
                    to = %today,
                    cleared = self.handled.len(),
                    "date rolled over; clearing dedup set"
                );
                self.handled.clear();
                self.reported_groups.clear();
                self.date = Some(today);
                true
            }
            None => {
                self.date = Some(today);
                false
            }
        }
    }

    pub fn is_handled(&self, routine_id: RoutineId) -> bool {
        self.handled.contains(&routine_id)
    }

    /// Returns false if the routine was already marked today.
    pub fn mark_handled(&mut self, routine_id: RoutineId) -> bool {
        self.handled.insert(routine_id)
    }

    pub fn handled_count(&self) -> usize {
        self.handled.len()
    }

    pub fn is_group_reported(&self, group: &str) -> bool {
        self.reported_groups.contains(group)
    }

    pub fn mark_group_reported(&mut self, group: impl Into<String>) -> bool {
        self.reported_groups.insert(group.into())
    }
}
