//! Execution state machine for a single firing routine.
//!
//! ```text
//! Idle → Active → Succeeded   (confirm pressed)
//!             ↘ Failed        (cancel pressed)
//!             ↘ TimedOut      (minutes * 60 + slack elapsed)
//! ```
//!
//! Entering `Active` draws the icon and launches the actuator on a detached
//! thread. The thread is never joined or cancelled and may still be running
//! after the routine resolves.

use routine_core::config::ExecutionConfig;
use routine_core::types::{Routine, RoutineStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::Clock;
use crate::hardware::{Actuator, Button, Devices, Icon};
use crate::persistence::RoutineStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Active,
    Succeeded,
    Failed,
    TimedOut,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::TimedOut
        )
    }
}

/// How an execution ended. `Interrupted` means shutdown was requested while
/// the routine was active; nothing is written and the routine is not marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Failed,
    TimedOut,
    Interrupted,
}

impl ExecutionOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionOutcome::Interrupted)
    }

    /// Status to persist for this outcome under `policy`, if any.
    pub fn status_to_write(self, policy: &ExecutionPolicy) -> Option<RoutineStatus> {
        match self {
            ExecutionOutcome::Succeeded => Some(RoutineStatus::Succeeded),
            ExecutionOutcome::Failed if policy.write_status_on_cancel => Some(RoutineStatus::Failed),
            ExecutionOutcome::TimedOut if policy.write_status_on_timeout => {
                Some(RoutineStatus::Failed)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub poll_interval: Duration,
    pub slack: Duration,
    pub buzz: Duration,
    pub write_status_on_cancel: bool,
    pub write_status_on_timeout: bool,
}

impl ExecutionPolicy {
    pub fn from_execution_config(config: &ExecutionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            slack: Duration::from_secs(config.slack_secs),
            buzz: Duration::from_secs(config.buzz_secs),
            write_status_on_cancel: config.write_status_on_cancel,
            write_status_on_timeout: config.write_status_on_timeout,
        }
    }

    pub fn deadline_for(&self, routine: &Routine) -> Duration {
        Duration::from_secs(u64::from(routine.minutes) * 60) + self.slack
    }
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from_execution_config(&ExecutionConfig::default())
    }
}

/// Button levels read in one poll. Cancel is only read when confirm is not
/// pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonSample {
    pub confirm: bool,
    pub cancel: bool,
}

/// One poll step of the `Active` state. The deadline wins over a button
/// pressed in the same poll.
pub fn next_state(
    state: ExecutionState,
    sample: ButtonSample,
    elapsed: Duration,
    deadline: Duration,
) -> ExecutionState {
    if state != ExecutionState::Active {
        return state;
    }
    if elapsed >= deadline {
        ExecutionState::TimedOut
    } else if sample.confirm {
        ExecutionState::Succeeded
    } else if sample.cancel {
        ExecutionState::Failed
    } else {
        ExecutionState::Active
    }
}

pub struct ExecutionContext<'a> {
    pub devices: &'a mut Devices,
    pub store: &'a dyn RoutineStore,
    pub clock: &'a dyn Clock,
    pub policy: &'a ExecutionPolicy,
    pub shutdown: &'a AtomicBool,
}

/// Runs `routine` until a button, the deadline or shutdown resolves it.
/// Blocks the caller for the whole activation.
pub fn execute_routine(
    ctx: &mut ExecutionContext<'_>,
    routine: &Routine,
    icon: &Icon,
) -> ExecutionOutcome {
    let deadline = ctx.policy.deadline_for(routine);
    tracing::info!(
        routine_id = %routine.id,
        name = %routine.name,
        minutes = routine.minutes,
        deadline_secs = deadline.as_secs(),
        "routine active"
    );

    if let Err(err) = ctx.devices.display.show(icon) {
        tracing::warn!(routine_id = %routine.id, error = %err, "failed to draw routine icon");
    }
    launch_actuator(&ctx.devices.actuator, routine, ctx.policy.buzz);
    // Only presses made while the routine is active count.
    ctx.devices.buttons.reset();

    let started = ctx.clock.elapsed();
    let mut state = ExecutionState::Active;
    let outcome = loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break ExecutionOutcome::Interrupted;
        }

        let confirm = ctx.devices.buttons.is_pressed(Button::Confirm);
        let sample = ButtonSample {
            confirm,
            cancel: !confirm && ctx.devices.buttons.is_pressed(Button::Cancel),
        };
        let elapsed = ctx.clock.elapsed().saturating_sub(started);
        state = next_state(state, sample, elapsed, deadline);

        match state {
            ExecutionState::Succeeded => break ExecutionOutcome::Succeeded,
            ExecutionState::Failed => break ExecutionOutcome::Failed,
            ExecutionState::TimedOut => break ExecutionOutcome::TimedOut,
            ExecutionState::Idle | ExecutionState::Active => {}
        }
        ctx.clock.sleep(ctx.policy.poll_interval);
    };

    tracing::info!(routine_id = %routine.id, outcome = ?outcome, "routine resolved");

    if let Some(status) = outcome.status_to_write(ctx.policy) {
        if let Err(err) = ctx.store.set_status(routine.id, status) {
            tracing::error!(
                routine_id = %routine.id,
                status = %status,
                error = %err,
                "failed to record routine status"
            );
        }
    }

    if let Err(err) = ctx.devices.display.clear() {
        tracing::warn!(routine_id = %routine.id, error = %err, "failed to clear display");
    }

    outcome
}

fn launch_actuator(actuator: &Arc<dyn Actuator>, routine: &Routine, buzz: Duration) {
    let actuator = Arc::clone(actuator);
    let minutes = routine.minutes;
    let spawned = thread::Builder::new()
        .name(format!("actuator-{}", routine.id))
        .spawn(move || {
            if !buzz.is_zero() {
                actuator.buzz(buzz);
            }
            actuator.run_for(minutes);
        });
    // Detached: the handle is dropped, never joined.
    if let Err(err) = spawned {
        tracing::error!(routine_id = %routine.id, error = %err, "failed to start actuator");
    }
}
