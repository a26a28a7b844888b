use chrono::NaiveTime;
use routine_core::types::{Routine, RoutineId, RoutineStatus};
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// One routine as it appears in a group report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: RoutineId,
    pub start_time: NaiveTime,
    pub minutes: u32,
    pub status: RoutineStatus,
    pub name: String,
}

impl From<&Routine> for ReportEntry {
    fn from(routine: &Routine) -> Self {
        Self {
            id: routine.id,
            start_time: routine.start_time,
            minutes: routine.minutes,
            status: routine.status,
            name: routine.name.clone(),
        }
    }
}

/// Snapshot of every routine in a group once all of them have resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group: String,
    pub routines: Vec<ReportEntry>,
}

impl GroupReport {
    /// Builds a report keeping the order of `members`.
    pub fn from_routines(group: impl Into<String>, members: &[Routine]) -> Self {
        Self {
            group: group.into(),
            routines: members.iter().map(ReportEntry::from).collect(),
        }
    }

    /// Newline-terminated JSON document, as written to the sink.
    pub fn encode_line(&self) -> Result<String, NotifyError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSinkKind {
    Stdout,
    Stream,
}

/// Result of a best-effort send. Failures never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped { reason: String },
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}
