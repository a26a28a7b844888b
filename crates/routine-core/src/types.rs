//! Core types for scheduled routines and interval timers.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Storage format for routine dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format for routine start times.
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutineId(pub i64);

impl std::fmt::Display for RoutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub i64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion status recorded for a routine.
///
/// `Pending` means the routine has not been resolved today. `Failed` covers
/// both an explicit cancel and a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl RoutineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutineStatus::Pending => "pending",
            RoutineStatus::Succeeded => "succeeded",
            RoutineStatus::Failed => "failed",
        }
    }

    /// Returns true once the routine will not be evaluated again today.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RoutineStatus::Pending)
    }
}

impl std::str::FromStr for RoutineStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(RoutineStatus::Pending),
            "succeeded" => Ok(RoutineStatus::Succeeded),
            "failed" => Ok(RoutineStatus::Failed),
            other => Err(format!(
                "invalid routine status '{other}'. valid values: pending, succeeded, failed"
            )),
        }
    }
}

impl std::fmt::Display for RoutineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed activity scheduled for one calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: RoutineId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// File name of the icon, relative to the icon directory.
    pub icon: String,
    pub minutes: u32,
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub status: RoutineStatus,
}

impl Routine {
    /// Scheduled start applied to `day`, independent of the stored date.
    pub fn scheduled_on(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.start_time)
    }

    pub fn is_pending(&self) -> bool {
        self.status == RoutineStatus::Pending
    }
}

/// Work/rest interval timer offered while no routine is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub work_minutes: u32,
    pub rest_minutes: u32,
    pub repeat_count: u32,
    pub icon: String,
}

impl Timer {
    /// Total wall time of the full cycle in minutes.
    pub fn total_minutes(&self) -> u32 {
        (self.work_minutes + self.rest_minutes).saturating_mul(self.repeat_count)
    }
}
