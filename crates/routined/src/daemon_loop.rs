//! Daemon loop — one testable `tick()` plus the fixed-period driver around it.
//!
//! Each tick: roll the ledger over on a date change, fetch today's pending
//! routines, fire the first due routine whose icon loads, then check its
//! group. When nothing fired and no routine is close, the timer menu may be
//! opened with the select button. A firing routine blocks the loop until it
//! resolves, so at most one routine is ever active.

use chrono::NaiveDate;
use routine_core::config::DeviceConfig;
use routine_core::types::{Routine, RoutineId};
use routine_notify::ReportSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{report_if_resolved, GroupCheck};
use crate::clock::Clock;
use crate::execution::{execute_routine, ExecutionContext, ExecutionOutcome, ExecutionPolicy};
use crate::hardware::{Button, Devices, HardwareError, Icon, IconLibrary};
use crate::ledger::DailyLedger;
use crate::persistence::RoutineStore;
use crate::timer_mode::{run_timer_mode, TimerModeContext, TimerModeExit, TimerModeSettings};
use crate::trigger::{due_routines, minutes_until_next_routine, FiringWindow};

/// Configuration for the daemon loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub window: FiringWindow,
    pub tick_interval: Duration,
    /// Minutes to the next routine above which the device counts as idle.
    pub idle_threshold_mins: u64,
    pub lookahead_mins: u64,
    pub backlight_percent: u8,
    pub timer_mode_enabled: bool,
    pub execution: ExecutionPolicy,
}

impl DaemonConfig {
    pub fn from_device_config(config: &DeviceConfig) -> Self {
        Self {
            window: FiringWindow::from_trigger_config(&config.trigger),
            tick_interval: Duration::from_millis(config.trigger.tick_interval_ms),
            idle_threshold_mins: config.trigger.idle_threshold_mins,
            lookahead_mins: config.trigger.lookahead_mins,
            backlight_percent: config.display.backlight_percent,
            timer_mode_enabled: config.timer_mode.enabled,
            execution: ExecutionPolicy::from_execution_config(&config.execution),
        }
    }

    fn timer_mode_settings(&self) -> TimerModeSettings {
        TimerModeSettings {
            poll_interval: self.execution.poll_interval,
            routine_check_interval: self.tick_interval,
            window: self.window,
            idle_threshold_mins: self.idle_threshold_mins,
            lookahead_mins: self.lookahead_mins,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_device_config(&DeviceConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FiredRoutine {
    pub routine_id: RoutineId,
    pub outcome: ExecutionOutcome,
    /// `None` when the routine was interrupted and left unmarked.
    pub group: Option<GroupCheck>,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickSummary {
    pub rolled_over: bool,
    pub store_unavailable: bool,
    pub fired: Option<FiredRoutine>,
    /// Due routines passed over because their icon could not be loaded.
    pub skipped_missing_icon: Vec<RoutineId>,
    pub minutes_until_next: Option<f64>,
    pub idle: bool,
    pub timer_mode: Option<TimerModeExit>,
}

pub struct RoutineDaemon<S> {
    store: S,
    clock: Arc<dyn Clock>,
    devices: Devices,
    icons: IconLibrary,
    sink: Box<dyn ReportSink>,
    ledger: DailyLedger,
    config: DaemonConfig,
    shutdown: Arc<AtomicBool>,
}

impl<S: RoutineStore> RoutineDaemon<S> {
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        devices: Devices,
        icons: IconLibrary,
        sink: Box<dyn ReportSink>,
        config: DaemonConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            clock,
            devices,
            icons,
            sink,
            ledger: DailyLedger::new(),
            config,
            shutdown,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &DailyLedger {
        &self.ledger
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Brings the display up blank at the configured backlight.
    pub fn start(&mut self) -> Result<(), HardwareError> {
        self.devices.display.init()?;
        self.devices.display.clear()?;
        self.devices
            .display
            .set_backlight(self.config.backlight_percent)?;
        tracing::info!(
            window_low_secs = self.config.window.low_secs,
            window_high_secs = self.config.window.high_secs,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            sink = ?self.sink.kind(),
            "routine daemon started"
        );
        Ok(())
    }

    /// Releases the display. Safe to call after a failed `start`.
    pub fn stop(&mut self) {
        if let Err(err) = self.devices.display.clear() {
            tracing::warn!(error = %err, "failed to clear display on shutdown");
        }
        if let Err(err) = self.devices.display.shutdown() {
            tracing::warn!(error = %err, "failed to release display");
        }
        tracing::info!(handled_today = self.ledger.handled_count(), "routine daemon stopped");
    }

    pub fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        let now = self.clock.now();
        let today = now.date();
        summary.rolled_over = self.ledger.observe_date(today);

        let routines = match self.store.todays_pending_routines(today) {
            Ok(routines) => routines,
            Err(err) => {
                tracing::warn!(error = %err, "routine store unavailable; retrying next tick");
                summary.store_unavailable = true;
                return summary;
            }
        };

        let due: Vec<Routine> = due_routines(&routines, now, self.config.window, &self.ledger)
            .cloned()
            .collect();
        for routine in due {
            match self.icons.load(&routine.icon) {
                Ok(icon) => {
                    summary.fired = Some(self.fire(&routine, &icon));
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        routine_id = %routine.id,
                        error = %err,
                        "skipping routine with unavailable icon"
                    );
                    summary.skipped_missing_icon.push(routine.id);
                }
            }
        }
        if summary.fired.is_some() {
            return summary;
        }

        summary.minutes_until_next =
            minutes_until_next_routine(&routines, now, self.config.lookahead_mins);
        summary.idle = summary
            .minutes_until_next
            .map_or(true, |minutes| minutes > self.config.idle_threshold_mins as f64);

        if summary.idle
            && self.config.timer_mode_enabled
            && !self.shutdown.load(Ordering::SeqCst)
            && self.devices.buttons.is_pressed(Button::Select)
        {
            summary.timer_mode = Some(self.enter_timer_mode());
        }
        summary
    }

    /// Ticks on a fixed period until shutdown is requested. Returns the
    /// number of ticks run.
    pub fn run(&mut self) -> u64 {
        let mut ticks = 0;
        while !self.shutdown.load(Ordering::SeqCst) {
            let started = self.clock.elapsed();
            let summary = self.tick();
            ticks += 1;
            if let Some(fired) = &summary.fired {
                tracing::debug!(routine_id = %fired.routine_id, outcome = ?fired.outcome, "tick fired routine");
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let spent = self.clock.elapsed().saturating_sub(started);
            self.clock
                .sleep(self.config.tick_interval.saturating_sub(spent));
        }
        tracing::info!(ticks, "main loop stopped");
        ticks
    }

    fn fire(&mut self, routine: &Routine, icon: &Icon) -> FiredRoutine {
        let mut ctx = ExecutionContext {
            devices: &mut self.devices,
            store: &self.store,
            clock: self.clock.as_ref(),
            policy: &self.config.execution,
            shutdown: self.shutdown.as_ref(),
        };
        let outcome = execute_routine(&mut ctx, routine, icon);
        if !outcome.is_terminal() {
            return FiredRoutine {
                routine_id: routine.id,
                outcome,
                group: None,
            };
        }

        self.ledger.mark_handled(routine.id);
        let group = self.check_group(&routine.group, routine.date);
        FiredRoutine {
            routine_id: routine.id,
            outcome,
            group: Some(group),
        }
    }

    fn check_group(&mut self, group: &str, date: NaiveDate) -> GroupCheck {
        report_if_resolved(
            group,
            date,
            &self.store,
            &mut self.ledger,
            self.sink.as_mut(),
        )
    }

    fn enter_timer_mode(&mut self) -> TimerModeExit {
        let settings = self.config.timer_mode_settings();
        let mut ctx = TimerModeContext {
            devices: &mut self.devices,
            store: &self.store,
            clock: self.clock.as_ref(),
            icons: &self.icons,
            ledger: &self.ledger,
            settings: &settings,
            shutdown: self.shutdown.as_ref(),
        };
        run_timer_mode(&mut ctx)
    }
}
