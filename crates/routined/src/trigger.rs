//! Trigger evaluation — decides which routine, if any, fires on this tick.

use chrono::NaiveDateTime;
use routine_core::config::TriggerConfig;
use routine_core::types::Routine;

use crate::ledger::DailyLedger;

/// Inclusive tolerance around a routine's scheduled start, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiringWindow {
    pub low_secs: i64,
    pub high_secs: i64,
}

impl FiringWindow {
    pub fn new(low_secs: i64, high_secs: i64) -> Self {
        Self {
            low_secs,
            high_secs,
        }
    }

    pub fn from_trigger_config(config: &TriggerConfig) -> Self {
        Self::new(config.window_low_secs, config.window_high_secs)
    }

    /// Compares at millisecond precision so a fractional delta just past
    /// `high_secs` does not fire.
    pub fn contains_millis(&self, delta_millis: i64) -> bool {
        delta_millis >= self.low_secs.saturating_mul(1_000)
            && delta_millis <= self.high_secs.saturating_mul(1_000)
    }
}

impl Default for FiringWindow {
    fn default() -> Self {
        Self::from_trigger_config(&TriggerConfig::default())
    }
}

/// `now - scheduled start`, with the start applied to `now`'s date.
pub fn start_delta_millis(now: NaiveDateTime, routine: &Routine) -> i64 {
    (now - routine.scheduled_on(now.date())).num_milliseconds()
}

pub fn is_eligible(
    routine: &Routine,
    now: NaiveDateTime,
    window: FiringWindow,
    ledger: &DailyLedger,
) -> bool {
    routine.is_pending()
        && !ledger.is_handled(routine.id)
        && window.contains_millis(start_delta_millis(now, routine))
}

/// Eligible routines in store order. The main loop fires the first one whose
/// icon loads.
pub fn due_routines<'a>(
    routines: &'a [Routine],
    now: NaiveDateTime,
    window: FiringWindow,
    ledger: &'a DailyLedger,
) -> impl Iterator<Item = &'a Routine> + 'a {
    routines.iter().filter(move |routine| {
        let delta = start_delta_millis(now, routine);
        let eligible = is_eligible(routine, now, window, ledger);
        tracing::debug!(
            routine_id = %routine.id,
            name = %routine.name,
            delta_secs = delta as f64 / 1_000.0,
            eligible,
            "trigger check"
        );
        eligible
    })
}

pub fn first_due_routine<'a>(
    routines: &'a [Routine],
    now: NaiveDateTime,
    window: FiringWindow,
    ledger: &'a DailyLedger,
) -> Option<&'a Routine> {
    due_routines(routines, now, window, ledger).next()
}

/// Minutes until the closest upcoming pending routine, ignoring anything that
/// already started or lies `lookahead_mins` or more ahead.
pub fn minutes_until_next_routine(
    routines: &[Routine],
    now: NaiveDateTime,
    lookahead_mins: u64,
) -> Option<f64> {
    let lookahead = lookahead_mins as f64;
    routines
        .iter()
        .filter(|routine| routine.is_pending())
        .map(|routine| -(start_delta_millis(now, routine) as f64) / 60_000.0)
        .filter(|minutes| *minutes > 0.0 && *minutes < lookahead)
        .min_by(|a, b| a.total_cmp(b))
}
