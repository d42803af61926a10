//! Orchestrator: wires store, expander, selector, engine and reporter.
//!
//! `Orchestrator` is the integration layer over the pure components. It is
//! the only place a run causes side effects, and only through the injected
//! `Runner` (`ShellRunner` in production, `MockRunner` in tests). Selection
//! errors surface before any instance is provisioned.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Error;
use crate::execution::engine::{Engine, EngineOptions};
use crate::execution::runner::Runner;
use crate::report::{listing, summarize_with, ListEntry, Report, ReportPolicy};
use crate::session::expand::expand_all;
use crate::session::select::{select, Criteria};
use crate::session::store::SessionStore;
use crate::session::SessionInstance;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// Everything the invoker decides about one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Invocation {
    #[serde(default)]
    pub criteria: Criteria,
    /// Passed verbatim to every session body.
    #[serde(default)]
    pub posargs: Vec<String>,
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub report: ReportPolicy,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// The expanded instance set and the selected run-set, both in expander order.
#[derive(Debug, Clone)]
pub struct Plan {
    pub all: Vec<SessionInstance>,
    pub selected: Vec<SessionInstance>,
}

impl Plan {
    /// Expand the store and apply the selection criteria.
    pub fn build(store: &SessionStore, criteria: &Criteria) -> Result<Plan, Error> {
        let all = expand_all(store);
        let selected = select(&all, criteria)?;
        info!(
            sessions = store.len(),
            instances = all.len(),
            selected = selected.len(),
            "planned run"
        );
        Ok(Plan { all, selected })
    }

    pub fn listing(&self) -> Vec<ListEntry> {
        listing(&self.all, &self.selected)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs a store's sessions through an injected runner.
pub struct Orchestrator {
    store: SessionStore,
    runner: Box<dyn Runner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.store)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(store: SessionStore, runner: Box<dyn Runner>) -> Self {
        Orchestrator { store, runner }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn plan(&self, criteria: &Criteria) -> Result<Plan, Error> {
        Plan::build(&self.store, criteria)
    }

    /// Execute a plan's selected instances and summarize them.
    pub fn execute(&self, plan: &Plan, invocation: &Invocation) -> Report {
        let engine = Engine::new(self.runner.as_ref(), invocation.engine.clone());
        let results = engine.run_all(&plan.selected, &invocation.posargs);
        let report = summarize_with(results, invocation.report);
        let counts = report.counts();
        info!(
            succeeded = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            not_run = counts.not_run,
            "run finished"
        );
        report
    }

    /// Plan and execute in one step.
    pub fn run(&self, invocation: &Invocation) -> Result<Report, Error> {
        let plan = self.plan(&invocation.criteria)?;
        Ok(self.execute(&plan, invocation))
    }
}
