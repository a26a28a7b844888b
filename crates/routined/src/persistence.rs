use chrono::{NaiveDate, NaiveTime};
use routine_core::types::{
    Routine, RoutineId, RoutineStatus, Timer, TimerId, DATE_FORMAT, TIME_FORMAT,
};
use rusqlite::{params, Connection};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("stored value '{value}' for {field} is not a valid {field}: {source}")]
    TimeParse {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("routine {routine_id} has unknown status: {message}")]
    Status { routine_id: i64, message: String },
    #[error("routine not found: {routine_id}")]
    RoutineNotFound { routine_id: i64 },
}

/// Record source for routines and timers.
pub trait RoutineStore {
    /// Pending routines for `date`, ordered by start time.
    fn todays_pending_routines(&self, date: NaiveDate) -> Result<Vec<Routine>, PersistenceError>;
    /// Every routine of `group` on `date`, whatever its status.
    fn routines_in_group(
        &self,
        group: &str,
        date: NaiveDate,
    ) -> Result<Vec<Routine>, PersistenceError>;
    fn set_status(&self, routine_id: RoutineId, status: RoutineStatus)
        -> Result<(), PersistenceError>;
    fn all_timers(&self) -> Result<Vec<Timer>, PersistenceError>;
}

/// Fields needed to insert a routine; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoutine {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub icon: String,
    pub minutes: u32,
    pub name: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimer {
    pub work_minutes: u32,
    pub rest_minutes: u32,
    pub repeat_count: u32,
    pub icon: String,
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

const ROUTINE_COLUMNS: &str =
    "id, date, start_time, icon, routine_minutes, routine_name, group_routine_name, status";

struct RoutineRow {
    id: i64,
    date: String,
    start_time: String,
    icon: String,
    minutes: u32,
    name: String,
    group: String,
    status: String,
}

impl RoutineRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            start_time: row.get(2)?,
            icon: row.get(3)?,
            minutes: row.get(4)?,
            name: row.get(5)?,
            group: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_routine(self) -> Result<Routine, PersistenceError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|source| {
            PersistenceError::TimeParse {
                field: "date",
                value: self.date.clone(),
                source,
            }
        })?;
        let start_time =
            NaiveTime::parse_from_str(&self.start_time, TIME_FORMAT).map_err(|source| {
                PersistenceError::TimeParse {
                    field: "start_time",
                    value: self.start_time.clone(),
                    source,
                }
            })?;
        let status = self
            .status
            .parse::<RoutineStatus>()
            .map_err(|message| PersistenceError::Status {
                routine_id: self.id,
                message,
            })?;

        Ok(Routine {
            id: RoutineId(self.id),
            date,
            start_time,
            icon: self.icon,
            minutes: self.minutes,
            name: self.name,
            group: self.group,
            status,
        })
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS routines (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    icon TEXT NOT NULL,
    routine_minutes INTEGER NOT NULL,
    routine_name TEXT NOT NULL,
    group_routine_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);

CREATE INDEX IF NOT EXISTS idx_routines_date_status ON routines(date, status);
CREATE INDEX IF NOT EXISTS idx_routines_group ON routines(date, group_routine_name);

CREATE TABLE IF NOT EXISTS timers (
    id INTEGER PRIMARY KEY,
    work_minutes INTEGER NOT NULL,
    rest_minutes INTEGER NOT NULL,
    repeat_count INTEGER NOT NULL,
    icon TEXT NOT NULL
);
"#,
        )?;
        Ok(())
    }

    pub fn insert_routine(&self, routine: &NewRoutine) -> Result<RoutineId, PersistenceError> {
        self.conn.execute(
            r#"
INSERT INTO routines (date, start_time, icon, routine_minutes, routine_name, group_routine_name, status)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#,
            params![
                routine.date.format(DATE_FORMAT).to_string(),
                routine.start_time.format(TIME_FORMAT).to_string(),
                routine.icon,
                routine.minutes,
                routine.name,
                routine.group,
                RoutineStatus::Pending.as_str(),
            ],
        )?;
        Ok(RoutineId(self.conn.last_insert_rowid()))
    }

    pub fn insert_timer(&self, timer: &NewTimer) -> Result<TimerId, PersistenceError> {
        self.conn.execute(
            "INSERT INTO timers (work_minutes, rest_minutes, repeat_count, icon) VALUES (?1, ?2, ?3, ?4)",
            params![
                timer.work_minutes,
                timer.rest_minutes,
                timer.repeat_count,
                timer.icon
            ],
        )?;
        Ok(TimerId(self.conn.last_insert_rowid()))
    }

    pub fn list_routines_for_date(&self, date: NaiveDate) -> Result<Vec<Routine>, PersistenceError> {
        self.query_routines(
            &format!(
                "SELECT {ROUTINE_COLUMNS} FROM routines WHERE date = ?1 ORDER BY start_time ASC, id ASC"
            ),
            params![date.format(DATE_FORMAT).to_string()],
        )
    }

    fn query_routines(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Routine>, PersistenceError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RoutineRow::from_row)?;
        let mut routines = Vec::new();
        for row in rows {
            routines.push(row?.into_routine()?);
        }
        Ok(routines)
    }
}

impl RoutineStore for SqliteStore {
    fn todays_pending_routines(&self, date: NaiveDate) -> Result<Vec<Routine>, PersistenceError> {
        self.query_routines(
            &format!(
                "SELECT {ROUTINE_COLUMNS} FROM routines WHERE date = ?1 AND status = ?2 ORDER BY start_time ASC, id ASC"
            ),
            params![
                date.format(DATE_FORMAT).to_string(),
                RoutineStatus::Pending.as_str()
            ],
        )
    }

    fn routines_in_group(
        &self,
        group: &str,
        date: NaiveDate,
    ) -> Result<Vec<Routine>, PersistenceError> {
        self.query_routines(
            &format!(
                "SELECT {ROUTINE_COLUMNS} FROM routines WHERE date = ?1 AND group_routine_name = ?2 ORDER BY start_time ASC, id ASC"
            ),
            params![date.format(DATE_FORMAT).to_string(), group],
        )
    }

    fn set_status(
        &self,
        routine_id: RoutineId,
        status: RoutineStatus,
    ) -> Result<(), PersistenceError> {
        let updated = self.conn.execute(
            "UPDATE routines SET status = ?1 WHERE id = ?2",
            params![status.as_str(), routine_id.0],
        )?;
        if updated == 0 {
            return Err(PersistenceError::RoutineNotFound {
                routine_id: routine_id.0,
            });
        }
        Ok(())
    }

    fn all_timers(&self) -> Result<Vec<Timer>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, work_minutes, rest_minutes, repeat_count, icon FROM timers ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Timer {
                id: TimerId(row.get(0)?),
                work_minutes: row.get(1)?,
                rest_minutes: row.get(2)?,
                repeat_count: row.get(3)?,
                icon: row.get(4)?,
            })
        })?;
        let mut timers = Vec::new();
        for row in rows {
            timers.push(row?);
        }
        Ok(timers)
    }
}
