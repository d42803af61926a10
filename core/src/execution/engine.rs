//! Execution engine: drives selected instances through their lifecycle.
//!
//! Every instance moves `Pending → Running → {Succeeded | Failed | Skipped}`;
//! fail-fast mode moves instances that never started to `Cancelled`. The
//! `Ledger` enforces those transitions. The `Engine` invokes the runner,
//! converts body signals, panics and provisioning faults into results, and
//! schedules instances sequentially or on a bounded set of worker threads.
//! Results always come back in input order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::context::{Session, Signal};
use super::runner::Runner;
use crate::report::{RunResult, Status};
use crate::session::SessionInstance;

/// Message prefix that marks a failure raised while provisioning.
pub const PROVISION_FAILURE_PREFIX: &str = "provisioning failed: ";

/// Message recorded for instances cancelled by fail-fast.
pub const CANCELLED_MESSAGE: &str = "not run: an earlier session failed (fail-fast)";

// ---------------------------------------------------------------------------
// InstanceState
// ---------------------------------------------------------------------------

/// The lifecycle state of a single instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
    Skipped { reason: String },
    /// Never started because fail-fast stopped the run.
    Cancelled,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InstanceState::Pending | InstanceState::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Per-state instance counts of a `Ledger`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

/// Tracks the state of every instance in a run. Entries are addressed by the
/// slot `enqueue` returns, so two entries may share a display id without
/// sharing state. Terminal states are final.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<(String, InstanceState)>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    /// Add an instance in `Pending` state and return its slot.
    pub fn enqueue(&mut self, id: &str) -> usize {
        self.entries.push((id.to_string(), InstanceState::Pending));
        self.entries.len() - 1
    }

    /// `Pending → Running`.
    pub fn start(&mut self, slot: usize) -> Result<(), String> {
        let (id, state) = self.entry_mut(slot)?;
        if *state != InstanceState::Pending {
            return Err(format!("cannot start instance '{}' in {:?} state", id, state));
        }
        *state = InstanceState::Running;
        Ok(())
    }

    pub fn succeed(&mut self, slot: usize) -> Result<(), String> {
        self.finish(slot, InstanceState::Succeeded)
    }

    pub fn fail(&mut self, slot: usize, message: &str) -> Result<(), String> {
        self.finish(
            slot,
            InstanceState::Failed {
                message: message.to_string(),
            },
        )
    }

    pub fn skip(&mut self, slot: usize, reason: &str) -> Result<(), String> {
        self.finish(
            slot,
            InstanceState::Skipped {
                reason: reason.to_string(),
            },
        )
    }

    /// `Pending → Cancelled`. A running instance is never cancelled.
    pub fn cancel(&mut self, slot: usize) -> Result<(), String> {
        let (id, state) = self.entry_mut(slot)?;
        if *state != InstanceState::Pending {
            return Err(format!("cannot cancel instance '{}' in {:?} state", id, state));
        }
        *state = InstanceState::Cancelled;
        Ok(())
    }

    pub fn state(&self, slot: usize) -> Option<&InstanceState> {
        self.entries.get(slot).map(|(_, state)| state)
    }

    /// Most recent slot queued under `id`.
    pub fn find(&self, id: &str) -> Option<usize> {
        self.entries.iter().rposition(|(entry, _)| entry == id)
    }

    /// State of the most recent entry queued under `id`.
    pub fn get(&self, id: &str) -> Option<&InstanceState> {
        self.find(id).and_then(|slot| self.state(slot))
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            total: self.entries.len(),
            ..LedgerStats::default()
        };
        for (_, state) in &self.entries {
            match state {
                InstanceState::Pending => stats.pending += 1,
                InstanceState::Running => stats.running += 1,
                InstanceState::Succeeded => stats.succeeded += 1,
                InstanceState::Failed { .. } => stats.failed += 1,
                InstanceState::Skipped { .. } => stats.skipped += 1,
                InstanceState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// `Running → terminal`.
    fn finish(&mut self, slot: usize, next: InstanceState) -> Result<(), String> {
        let (id, state) = self.entry_mut(slot)?;
        if !state.is_running() {
            return Err(format!("instance '{}' is not running", id));
        }
        *state = next;
        Ok(())
    }

    fn entry_mut(&mut self, slot: usize) -> Result<(&str, &mut InstanceState), String> {
        self.entries
            .get_mut(slot)
            .map(|(id, state)| (id.as_str(), state))
            .ok_or_else(|| format!("no instance in slot {}", slot))
    }
}

// ---------------------------------------------------------------------------
// EngineOptions
// ---------------------------------------------------------------------------

/// Scheduling and continuation policy for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineOptions {
    /// Stop starting new instances after the first failure.
    #[serde(default)]
    pub fail_fast: bool,
    /// Maximum instances running at once. `1` is strictly sequential.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_jobs() -> usize {
    1
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            fail_fast: false,
            jobs: default_jobs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs instances through a `Runner`.
pub struct Engine<'r> {
    runner: &'r dyn Runner,
    options: EngineOptions,
    ledger: Mutex<Ledger>,
}

impl<'r> Engine<'r> {
    pub fn new(runner: &'r dyn Runner, options: EngineOptions) -> Self {
        Engine {
            runner,
            options,
            ledger: Mutex::new(Ledger::new()),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Counts of the engine's ledger.
    pub fn stats(&self) -> LedgerStats {
        self.ledger().stats()
    }

    /// State of one instance, by display id.
    pub fn state(&self, id: &str) -> Option<InstanceState> {
        self.ledger().get(id).cloned()
    }

    /// Run a single instance to a terminal state. Never fails: body
    /// signals, panics and provisioning faults all become results.
    ///
    /// An instance this engine already finished is not run again; its
    /// recorded outcome is returned instead.
    pub fn run(&self, instance: &SessionInstance, posargs: &[String]) -> RunResult {
        let slot = {
            let mut ledger = self.ledger();
            match ledger.find(&instance.display_id) {
                Some(slot) => slot,
                None => ledger.enqueue(&instance.display_id),
            }
        };
        self.run_slot(slot, instance, posargs)
    }

    /// Run every instance and return one result per instance, in input order.
    pub fn run_all(&self, instances: &[SessionInstance], posargs: &[String]) -> Vec<RunResult> {
        let slots: Vec<usize> = {
            let mut ledger = self.ledger();
            instances
                .iter()
                .map(|instance| ledger.enqueue(&instance.display_id))
                .collect()
        };

        if self.options.jobs <= 1 || instances.len() <= 1 {
            self.run_sequential(instances, &slots, posargs)
        } else {
            self.run_parallel(instances, &slots, posargs)
        }
    }

    fn run_slot(&self, slot: usize, instance: &SessionInstance, posargs: &[String]) -> RunResult {
        let id = instance.display_id.as_str();
        {
            let mut ledger = self.ledger();
            if let Err(e) = ledger.start(slot) {
                warn!(session = %id, "not running: {}", e);
                let (status, message) = recorded_outcome(ledger.state(slot), &e);
                return RunResult::new(instance, status, message, posargs);
            }
        }

        info!(session = %id, "running");
        let started = Instant::now();
        let (status, message, log) = match self.runner.provision(instance) {
            Err(e) => (
                Status::Failed,
                Some(format!("{}{}", PROVISION_FAILURE_PREFIX, e)),
                Vec::new(),
            ),
            Ok(env) => {
                let mut session = Session::new(instance, posargs, self.runner, &env);
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| instance.body.call(&mut session)));
                let log = session.into_log();
                match outcome {
                    Ok(Ok(())) => (Status::Success, None, log),
                    Ok(Err(Signal::Skip(reason))) => (Status::Skipped, Some(reason), log),
                    Ok(Err(Signal::Fail(message))) => (Status::Failed, Some(message), log),
                    Err(payload) => (
                        Status::Failed,
                        Some(format!("session panicked: {}", panic_message(&*payload))),
                        log,
                    ),
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        {
            let mut ledger = self.ledger();
            let text = message.as_deref().unwrap_or("");
            let transition = match status {
                Status::Success => ledger.succeed(slot),
                Status::Skipped => ledger.skip(slot, text),
                _ => ledger.fail(slot, text),
            };
            self.track(transition);
        }

        match status {
            Status::Success => info!(session = %id, duration_ms, "succeeded"),
            Status::Skipped => warn!(session = %id, reason = message.as_deref().unwrap_or(""), "skipped"),
            _ => warn!(session = %id, error = message.as_deref().unwrap_or(""), "failed"),
        }

        RunResult {
            duration_ms,
            log,
            ..RunResult::new(instance, status, message, posargs)
        }
    }

    fn run_sequential(
        &self,
        instances: &[SessionInstance],
        slots: &[usize],
        posargs: &[String],
    ) -> Vec<RunResult> {
        let mut results = Vec::with_capacity(instances.len());
        let mut stopped = false;
        for (instance, &slot) in instances.iter().zip(slots) {
            if stopped {
                results.push(self.cancel(slot, instance, posargs));
                continue;
            }
            let result = self.run_slot(slot, instance, posargs);
            stopped = self.options.fail_fast && result.status == Status::Failed;
            results.push(result);
        }
        results
    }

    /// Workers claim the next unstarted index; each result lands in the slot
    /// of its input position.
    fn run_parallel(
        &self,
        instances: &[SessionInstance],
        slots: &[usize],
        posargs: &[String],
    ) -> Vec<RunResult> {
        let next = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let results: Mutex<Vec<Option<RunResult>>> = Mutex::new(vec![None; instances.len()]);
        let workers = self.options.jobs.min(instances.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(instance) = instances.get(index) else {
                        break;
                    };
                    let result = self.run_slot(slots[index], instance, posargs);
                    if self.options.fail_fast && result.status == Status::Failed {
                        abort.store(true, Ordering::SeqCst);
                    }
                    results.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(result);
                });
            }
        });

        let results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results
            .into_iter()
            .zip(instances.iter().zip(slots))
            .map(|(result, (instance, &slot))| match result {
                Some(result) => result,
                None => self.cancel(slot, instance, posargs),
            })
            .collect()
    }

    fn cancel(&self, slot: usize, instance: &SessionInstance, posargs: &[String]) -> RunResult {
        self.track(self.ledger().cancel(slot));
        info!(session = %instance.display_id, "cancelled");
        RunResult::new(
            instance,
            Status::NotSelected,
            Some(CANCELLED_MESSAGE.to_string()),
            posargs,
        )
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, transition: Result<(), String>) {
        if let Err(e) = transition {
            warn!("ledger: {}", e);
        }
    }
}

/// Report outcome for an instance that could not be started.
fn recorded_outcome(state: Option<&InstanceState>, error: &str) -> (Status, Option<String>) {
    match state {
        Some(InstanceState::Succeeded) => (Status::Success, None),
        Some(InstanceState::Skipped { reason }) => (Status::Skipped, Some(reason.clone())),
        Some(InstanceState::Failed { message }) => (Status::Failed, Some(message.clone())),
        Some(InstanceState::Cancelled) => (Status::NotSelected, Some(CANCELLED_MESSAGE.to_string())),
        _ => (Status::Failed, Some(error.to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
