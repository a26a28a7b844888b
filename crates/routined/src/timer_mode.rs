//! Interactive interval timers, available while no routine is close.
//!
//! Select cycles through the stored timers, confirm starts the highlighted
//! one and cancel leaves the menu. The mode gives way as soon as a routine
//! is due or within the idle threshold, and never writes to the store.

use routine_core::types::{Timer, TimerId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::Clock;
use crate::hardware::{Button, Devices, IconLibrary};
use crate::ledger::DailyLedger;
use crate::persistence::RoutineStore;
use crate::trigger::{first_due_routine, minutes_until_next_routine, FiringWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerModeExit {
    NoTimers,
    StoreUnavailable,
    Cancelled,
    RoutineApproaching,
    Completed { timer_id: TimerId },
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerModeSettings {
    pub poll_interval: Duration,
    /// How often the store is consulted for upcoming routines.
    pub routine_check_interval: Duration,
    pub window: FiringWindow,
    pub idle_threshold_mins: u64,
    pub lookahead_mins: u64,
}

pub struct TimerModeContext<'a> {
    pub devices: &'a mut Devices,
    pub store: &'a dyn RoutineStore,
    pub clock: &'a dyn Clock,
    pub icons: &'a IconLibrary,
    pub ledger: &'a DailyLedger,
    pub settings: &'a TimerModeSettings,
    pub shutdown: &'a AtomicBool,
}

struct RoutineWatch {
    next_check: Duration,
}

impl TimerModeContext<'_> {
    fn interruption(&self, watch: &mut RoutineWatch) -> Option<TimerModeExit> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Some(TimerModeExit::Interrupted);
        }
        let elapsed = self.clock.elapsed();
        if elapsed < watch.next_check {
            return None;
        }
        watch.next_check = elapsed + self.settings.routine_check_interval;
        self.routine_approaching()
            .then_some(TimerModeExit::RoutineApproaching)
    }

    fn routine_approaching(&self) -> bool {
        let now = self.clock.now();
        let routines = match self.store.todays_pending_routines(now.date()) {
            Ok(routines) => routines,
            Err(err) => {
                tracing::warn!(error = %err, "timer mode could not check upcoming routines");
                return false;
            }
        };
        if first_due_routine(&routines, now, self.settings.window, self.ledger).is_some() {
            return true;
        }
        minutes_until_next_routine(&routines, now, self.settings.lookahead_mins)
            .is_some_and(|minutes| minutes <= self.settings.idle_threshold_mins as f64)
    }

    fn show_timer(&mut self, timer: &Timer) {
        match self.icons.load(&timer.icon) {
            Ok(icon) => {
                if let Err(err) = self.devices.display.show(&icon) {
                    tracing::warn!(timer_id = %timer.id, error = %err, "failed to draw timer icon");
                }
            }
            Err(err) => {
                tracing::warn!(timer_id = %timer.id, error = %err, "timer icon unavailable");
                self.clear_display();
            }
        }
    }

    fn clear_display(&mut self) {
        if let Err(err) = self.devices.display.clear() {
            tracing::warn!(error = %err, "failed to clear display");
        }
    }

    /// Waits out one phase. Returns an exit if the phase was cut short.
    fn wait_phase(&mut self, minutes: u32, watch: &mut RoutineWatch) -> Option<TimerModeExit> {
        let deadline = self.clock.elapsed() + Duration::from_secs(u64::from(minutes) * 60);
        self.devices.buttons.reset();
        loop {
            if let Some(exit) = self.interruption(watch) {
                return Some(exit);
            }
            if self.devices.buttons.is_pressed(Button::Cancel) {
                return Some(TimerModeExit::Cancelled);
            }
            if self.clock.elapsed() >= deadline {
                return None;
            }
            self.clock.sleep(self.settings.poll_interval);
        }
    }

    fn run_timer(&mut self, timer: &Timer, watch: &mut RoutineWatch) -> TimerModeExit {
        tracing::info!(
            timer_id = %timer.id,
            work_minutes = timer.work_minutes,
            rest_minutes = timer.rest_minutes,
            repeat = timer.repeat_count,
            "interval timer started"
        );
        let actuator = Arc::clone(&self.devices.actuator);
        let (work, rest, repeat) = (timer.work_minutes, timer.rest_minutes, timer.repeat_count);
        let spawned = thread::Builder::new()
            .name(format!("timer-{}", timer.id))
            .spawn(move || actuator.run_interval_cycle(work, rest, repeat));
        if let Err(err) = spawned {
            tracing::error!(timer_id = %timer.id, error = %err, "failed to start actuator");
        }

        for round in 1..=timer.repeat_count {
            tracing::debug!(timer_id = %timer.id, round, "work phase");
            self.show_timer(timer);
            if let Some(exit) = self.wait_phase(timer.work_minutes, watch) {
                return exit;
            }
            tracing::debug!(timer_id = %timer.id, round, "rest phase");
            self.clear_display();
            if let Some(exit) = self.wait_phase(timer.rest_minutes, watch) {
                return exit;
            }
        }
        TimerModeExit::Completed { timer_id: timer.id }
    }
}

/// Runs the timer menu until the user leaves it, a timer completes or a
/// routine needs the device. Clears the display on every exit.
pub fn run_timer_mode(ctx: &mut TimerModeContext<'_>) -> TimerModeExit {
    let timers = match ctx.store.all_timers() {
        Ok(timers) => timers,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load timers");
            return TimerModeExit::StoreUnavailable;
        }
    };
    if timers.is_empty() {
        tracing::info!("timer mode requested but no timers are stored");
        return TimerModeExit::NoTimers;
    }

    tracing::info!(timers = timers.len(), "entering timer mode");
    let mut watch = RoutineWatch {
        next_check: ctx.clock.elapsed() + ctx.settings.routine_check_interval,
    };
    let mut selected = 0;
    ctx.show_timer(&timers[selected]);
    ctx.devices.buttons.reset();
    // Select may still be held from the press that opened the menu.
    let mut select_held = ctx.devices.buttons.is_pressed(Button::Select);

    let exit = loop {
        if let Some(exit) = ctx.interruption(&mut watch) {
            break exit;
        }
        let select = ctx.devices.buttons.is_pressed(Button::Select);
        if select && !select_held {
            selected = (selected + 1) % timers.len();
            tracing::debug!(timer_id = %timers[selected].id, "timer selected");
            ctx.show_timer(&timers[selected]);
        }
        select_held = select;

        if ctx.devices.buttons.is_pressed(Button::Confirm) {
            break ctx.run_timer(&timers[selected], &mut watch);
        }
        if ctx.devices.buttons.is_pressed(Button::Cancel) {
            break TimerModeExit::Cancelled;
        }
        ctx.clock.sleep(ctx.settings.poll_interval);
    };

    ctx.clear_display();
    tracing::info!(exit = ?exit, "leaving timer mode");
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{NewTimer, SqliteStore};
    use crate::testing::{
        icon_dir, migrated_store, seed_routine, ActuatorCall, DisplayCall, FailingStore,
        ManualClock, TestRig,
    };

    fn settings() -> TimerModeSettings {
        TimerModeSettings {
            poll_interval: Duration::from_millis(100),
            routine_check_interval: Duration::from_secs(1),
            window: FiringWindow::new(0, 90),
            idle_threshold_mins: 5,
            lookahead_mins: 90,
        }
    }

    fn seed_timer(store: &SqliteStore, work: u32, rest: u32, repeat: u32, icon: &str) -> TimerId {
        store
            .insert_timer(&NewTimer {
                work_minutes: work,
                rest_minutes: rest,
                repeat_count: repeat,
                icon: icon.to_string(),
            })
            .expect("insert timer")
    }

    fn run(rig: &mut TestRig, store: &dyn RoutineStore, icons: &IconLibrary) -> TimerModeExit {
        let settings = settings();
        let ledger = DailyLedger::new();
        let clock = rig.clock.clone();
        let shutdown = rig.shutdown.clone();
        let mut ctx = TimerModeContext {
            devices: &mut rig.devices,
            store,
            clock: clock.as_ref(),
            icons,
            ledger: &ledger,
            settings: &settings,
            shutdown: &shutdown,
        };
        run_timer_mode(&mut ctx)
    }

    #[test]
    fn no_timers_leaves_immediately() {
        let store = migrated_store();
        let dir = icon_dir(&[]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::NoTimers
        );
        assert!(rig.display.calls().is_empty());
    }

    #[test]
    fn store_failure_leaves_immediately() {
        let dir = icon_dir(&[]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        assert_eq!(
            run(&mut rig, &FailingStore, &IconLibrary::new(dir.path())),
            TimerModeExit::StoreUnavailable
        );
    }

    #[test]
    fn cancel_in_menu_exits_and_clears() {
        let store = migrated_store();
        seed_timer(&store, 1, 1, 1, "t1.png");
        let dir = icon_dir(&["t1.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Cancel, Duration::from_secs(2));

        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::Cancelled
        );
        assert_eq!(
            rig.display.calls(),
            vec![DisplayCall::Show("t1.png".to_string()), DisplayCall::Clear]
        );
        assert!(rig.actuator.wait_for(0).is_empty());
    }

    #[test]
    fn select_cycles_and_confirm_runs_highlighted_timer() {
        let store = migrated_store();
        seed_timer(&store, 5, 5, 2, "t1.png");
        let second = seed_timer(&store, 1, 1, 1, "t2.png");
        let dir = icon_dir(&["t1.png", "t2.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Select, Duration::from_secs(1));
        rig.buttons.press_at(Button::Confirm, Duration::from_secs(2));

        let exit = run(&mut rig, &store, &IconLibrary::new(dir.path()));

        assert_eq!(exit, TimerModeExit::Completed { timer_id: second });
        assert_eq!(
            rig.actuator.wait_for(1),
            vec![ActuatorCall::IntervalCycle {
                work: 1,
                rest: 1,
                repeat: 1
            }]
        );
        assert_eq!(rig.display.shown(), vec!["t1.png", "t2.png", "t2.png"]);
        assert_eq!(rig.display.calls().last(), Some(&DisplayCall::Clear));
        let elapsed = rig.clock.elapsed();
        assert!(elapsed >= Duration::from_secs(122));
        assert!(elapsed < Duration::from_secs(123));
    }

    #[test]
    fn approaching_routine_preempts_running_timer() {
        let store = migrated_store();
        seed_timer(&store, 30, 5, 1, "t1.png");
        seed_routine(&store, "12:10:00", "G", 5, "r.png");
        let dir = icon_dir(&["t1.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Confirm, Duration::ZERO);

        let exit = run(&mut rig, &store, &IconLibrary::new(dir.path()));

        assert_eq!(exit, TimerModeExit::RoutineApproaching);
        let elapsed = rig.clock.elapsed();
        assert!(elapsed >= Duration::from_secs(300));
        assert!(elapsed <= Duration::from_secs(302));
        assert_eq!(rig.display.calls().last(), Some(&DisplayCall::Clear));
    }

    #[test]
    fn cancel_stops_running_timer() {
        let store = migrated_store();
        seed_timer(&store, 10, 5, 3, "t1.png");
        let dir = icon_dir(&["t1.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Confirm, Duration::ZERO);
        rig.buttons.press_at(Button::Cancel, Duration::from_secs(60));

        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::Cancelled
        );
        assert!(rig.clock.elapsed() < Duration::from_secs(61));
    }

    #[test]
    fn shutdown_interrupts_menu() {
        let store = migrated_store();
        seed_timer(&store, 1, 1, 1, "t1.png");
        let dir = icon_dir(&["t1.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.shutdown.store(true, Ordering::SeqCst);

        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::Interrupted
        );
    }

    #[test]
    fn missing_timer_icon_still_runs_with_blank_display() {
        let store = migrated_store();
        let id = seed_timer(&store, 1, 0, 1, "absent.png");
        let dir = icon_dir(&[]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Confirm, Duration::ZERO);

        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::Completed { timer_id: id }
        );
        assert!(rig.display.shown().is_empty());
    }

    #[test]
    fn cancel_pressed_before_menu_opens_is_ignored() {
        let store = migrated_store();
        let id = seed_timer(&store, 1, 0, 1, "t1.png");
        let dir = icon_dir(&["t1.png"]);
        let mut rig = TestRig::new(ManualClock::at("2026-03-01 12:00:00"));
        rig.buttons.press_at(Button::Cancel, Duration::ZERO);
        rig.clock.advance(Duration::from_secs(5));
        rig.buttons.press_at(Button::Confirm, Duration::from_secs(6));

        assert_eq!(
            run(&mut rig, &store, &IconLibrary::new(dir.path())),
            TimerModeExit::Completed { timer_id: id }
        );
    }
}
