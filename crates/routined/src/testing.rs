//! Test doubles shared by the daemon's unit tests.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use routine_core::types::{Routine, RoutineId, RoutineStatus, Timer};
use routine_notify::{Delivery, GroupReport, NotificationSinkKind, ReportSink};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::hardware::{Actuator, Button, Buttons, Devices, Display, HardwareError, Icon};
use crate::persistence::{NewRoutine, PersistenceError, RoutineStore, SqliteStore};

pub(crate) fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
}

pub(crate) fn mk_routine(id: i64, start: &str, group: &str) -> Routine {
    Routine {
        id: RoutineId(id),
        date: test_date(),
        start_time: NaiveTime::parse_from_str(start, "%H:%M:%S").expect("time"),
        icon: "icon.png".to_string(),
        minutes: 5,
        name: format!("routine {id}"),
        group: group.to_string(),
        status: RoutineStatus::Pending,
    }
}

pub(crate) fn migrated_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open");
    store.migrate().expect("migrate");
    store
}

pub(crate) fn seed_routine(
    store: &SqliteStore,
    start: &str,
    group: &str,
    minutes: u32,
    icon: &str,
) -> RoutineId {
    store
        .insert_routine(&NewRoutine {
            date: test_date(),
            start_time: NaiveTime::parse_from_str(start, "%H:%M:%S").expect("time"),
            icon: icon.to_string(),
            minutes,
            name: format!("{group} at {start}"),
            group: group.to_string(),
        })
        .expect("insert routine")
}

/// Wall clock and monotonic clock that only move when slept or advanced.
#[derive(Debug)]
pub(crate) struct ManualClock {
    start: NaiveDateTime,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn at(datetime: &str) -> Arc<Self> {
        let start =
            NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").expect("datetime");
        Arc::new(Self {
            start,
            elapsed: Mutex::new(Duration::ZERO),
        })
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.elapsed.lock().expect("clock lock") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = *self.elapsed.lock().expect("clock lock");
        self.start + chrono::Duration::from_std(elapsed).expect("elapsed fits")
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("clock lock")
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy)]
struct ScriptedPress {
    button: Button,
    at: Duration,
    consumed: bool,
}

/// One-shot presses that become readable once the clock reaches their time,
/// latched like the console buttons. `reset` drops presses from the past.
#[derive(Clone)]
pub(crate) struct ScriptedButtons {
    clock: Arc<ManualClock>,
    presses: Arc<Mutex<Vec<ScriptedPress>>>,
}

impl ScriptedButtons {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            presses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn press_at(&self, button: Button, at: Duration) {
        self.presses.lock().expect("buttons lock").push(ScriptedPress {
            button,
            at,
            consumed: false,
        });
    }
}

impl Buttons for ScriptedButtons {
    fn is_pressed(&self, button: Button) -> bool {
        let now = self.clock.elapsed();
        let mut presses = self.presses.lock().expect("buttons lock");
        match presses
            .iter_mut()
            .find(|press| press.button == button && !press.consumed && press.at <= now)
        {
            Some(press) => {
                press.consumed = true;
                true
            }
            None => false,
        }
    }

    /// Drops presses scheduled strictly before the current instant.
    fn reset(&self) {
        let now = self.clock.elapsed();
        for press in self
            .presses
            .lock()
            .expect("buttons lock")
            .iter_mut()
            .filter(|press| press.at < now)
        {
            press.consumed = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DisplayCall {
    Init,
    Show(String),
    Clear,
    Backlight(u8),
    Shutdown,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingDisplay {
    calls: Arc<Mutex<Vec<DisplayCall>>>,
}

impl RecordingDisplay {
    pub(crate) fn calls(&self) -> Vec<DisplayCall> {
        self.calls.lock().expect("display lock").clone()
    }

    pub(crate) fn shown(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DisplayCall::Show(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DisplayCall) -> Result<(), HardwareError> {
        self.calls.lock().expect("display lock").push(call);
        Ok(())
    }
}

impl Display for RecordingDisplay {
    fn init(&mut self) -> Result<(), HardwareError> {
        self.record(DisplayCall::Init)
    }

    fn show(&mut self, icon: &Icon) -> Result<(), HardwareError> {
        self.record(DisplayCall::Show(icon.name.clone()))
    }

    fn clear(&mut self) -> Result<(), HardwareError> {
        self.record(DisplayCall::Clear)
    }

    fn set_backlight(&mut self, percent: u8) -> Result<(), HardwareError> {
        self.record(DisplayCall::Backlight(percent))
    }

    fn shutdown(&mut self) -> Result<(), HardwareError> {
        self.record(DisplayCall::Shutdown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ActuatorCall {
    Buzz(Duration),
    RunFor(u32),
    IntervalCycle { work: u32, rest: u32, repeat: u32 },
}

/// Records activations from the detached actuator threads without blocking.
#[derive(Clone, Default)]
pub(crate) struct RecordingActuator {
    state: Arc<(Mutex<Vec<ActuatorCall>>, Condvar)>,
}

impl RecordingActuator {
    fn record(&self, call: ActuatorCall) {
        let (calls, ready) = &*self.state;
        calls.lock().expect("actuator lock").push(call);
        ready.notify_all();
    }

    /// Waits up to two seconds of real time for `count` calls.
    pub(crate) fn wait_for(&self, count: usize) -> Vec<ActuatorCall> {
        let (calls, ready) = &*self.state;
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut guard = calls.lock().expect("actuator lock");
        while guard.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            guard = ready.wait_timeout(guard, remaining).expect("actuator lock").0;
        }
        guard.clone()
    }

    pub(crate) fn run_for_count(&self) -> usize {
        let (calls, _) = &*self.state;
        calls
            .lock()
            .expect("actuator lock")
            .iter()
            .filter(|call| matches!(call, ActuatorCall::RunFor(_)))
            .count()
    }
}

impl Actuator for RecordingActuator {
    fn buzz(&self, duration: Duration) {
        self.record(ActuatorCall::Buzz(duration));
    }

    fn run_for(&self, minutes: u32) {
        self.record(ActuatorCall::RunFor(minutes));
    }

    fn run_interval_cycle(&self, work_minutes: u32, rest_minutes: u32, repeat: u32) {
        self.record(ActuatorCall::IntervalCycle {
            work: work_minutes,
            rest: rest_minutes,
            repeat,
        });
    }
}

/// Fake devices wired to a manual clock, with handles kept for assertions.
pub(crate) struct TestRig {
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) buttons: ScriptedButtons,
    pub(crate) display: RecordingDisplay,
    pub(crate) actuator: RecordingActuator,
    pub(crate) devices: Devices,
    pub(crate) shutdown: Arc<AtomicBool>,
}

impl TestRig {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        let buttons = ScriptedButtons::new(Arc::clone(&clock));
        let display = RecordingDisplay::default();
        let actuator = RecordingActuator::default();
        let devices = Devices {
            display: Box::new(display.clone()),
            buttons: Box::new(buttons.clone()),
            actuator: Arc::new(actuator.clone()),
        };
        Self {
            clock,
            buttons,
            display,
            actuator,
            devices,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    reports: Arc<Mutex<Vec<GroupReport>>>,
    drop_all: bool,
}

impl RecordingSink {
    /// A sink whose link is down: every report is dropped but still recorded.
    pub(crate) fn unreachable() -> Self {
        Self {
            reports: Arc::default(),
            drop_all: true,
        }
    }

    pub(crate) fn reports(&self) -> Vec<GroupReport> {
        self.reports.lock().expect("sink lock").clone()
    }
}

impl ReportSink for RecordingSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stream
    }

    fn send(&mut self, report: &GroupReport) -> Delivery {
        self.reports.lock().expect("sink lock").push(report.clone());
        if self.drop_all {
            Delivery::Dropped {
                reason: "link down".to_string(),
            }
        } else {
            Delivery::Sent
        }
    }
}

/// Store whose every call fails, as if the database file were unreadable.
pub(crate) struct FailingStore;

fn unavailable() -> PersistenceError {
    PersistenceError::Sql {
        source: rusqlite::Error::InvalidQuery,
    }
}

impl RoutineStore for FailingStore {
    fn todays_pending_routines(&self, _date: NaiveDate) -> Result<Vec<Routine>, PersistenceError> {
        Err(unavailable())
    }

    fn routines_in_group(
        &self,
        _group: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Routine>, PersistenceError> {
        Err(unavailable())
    }

    fn set_status(
        &self,
        _routine_id: RoutineId,
        _status: RoutineStatus,
    ) -> Result<(), PersistenceError> {
        Err(unavailable())
    }

    fn all_timers(&self) -> Result<Vec<Timer>, PersistenceError> {
        Err(unavailable())
    }
}

/// Temporary icon directory holding one small file per name.
pub(crate) fn icon_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for name in names {
        std::fs::write(dir.path().join(name), b"icon").expect("write icon");
    }
    dir
}
