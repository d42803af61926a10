//! Result reporting: per-instance results, the aggregate report, and the
//! session listing.
//!
//! The report always follows selection order, whatever order instances
//! finished in. Skipped instances never fail a run unless the report policy
//! says so.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::session::{Params, SessionInstance};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Terminal status of one instance in a report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failed,
    Skipped,
    /// Selected but never started (fail-fast).
    NotSelected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::NotSelected => "not run",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

/// Outcome of one executed (or cancelled) instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub display_id: String,
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub posargs: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<String>,
}

impl RunResult {
    pub fn new(
        instance: &SessionInstance,
        status: Status,
        message: Option<String>,
        posargs: &[String],
    ) -> Self {
        RunResult {
            display_id: instance.display_id.clone(),
            session: instance.definition_name.clone(),
            interpreter: instance.interpreter.clone(),
            params: instance.params.clone(),
            status,
            message,
            posargs: posargs.to_vec(),
            duration_ms: 0,
            log: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReportPolicy
// ---------------------------------------------------------------------------

/// How skipped instances are treated in the report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportPolicy {
    /// Leave skipped instances out of the per-instance list.
    #[serde(default)]
    pub omit_skipped: bool,
    /// Count a skip as a failure of the run.
    #[serde(default)]
    pub skipped_is_failure: bool,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Overall {
    Succeeded,
    Failed,
}

/// Counts per status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Counts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_run: usize,
}

/// The aggregated result of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub results: Vec<RunResult>,
    pub overall: Overall,
}

/// Summarize with the default policy: skips are listed and neutral.
pub fn summarize(results: Vec<RunResult>) -> Report {
    summarize_with(results, ReportPolicy::default())
}

pub fn summarize_with(results: Vec<RunResult>, policy: ReportPolicy) -> Report {
    let failed = results.iter().any(|r| {
        r.status == Status::Failed || (policy.skipped_is_failure && r.status == Status::Skipped)
    });
    let results = if policy.omit_skipped {
        results
            .into_iter()
            .filter(|r| r.status != Status::Skipped)
            .collect()
    } else {
        results
    };
    Report {
        results,
        overall: if failed {
            Overall::Failed
        } else {
            Overall::Succeeded
        },
    }
}

impl Report {
    pub fn succeeded(&self) -> bool {
        self.overall == Overall::Succeeded
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for r in &self.results {
            match r.status {
                Status::Success => counts.success += 1,
                Status::Failed => counts.failed += 1,
                Status::Skipped => counts.skipped += 1,
                Status::NotSelected => counts.not_run += 1,
            }
        }
        counts
    }

    /// Human-readable summary, one line per instance.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for r in &self.results {
            out.push_str(&format!("* {}: {}", r.display_id, r.status));
            if let Some(message) = &r.message {
                out.push_str(&format!(" ({})", message));
            }
            out.push('\n');
        }
        let c = self.counts();
        out.push_str(&format!(
            "{} succeeded, {} failed, {} skipped, {} not run",
            c.success, c.failed, c.skipped, c.not_run
        ));
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One line of the session listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListEntry {
    pub display_id: String,
    pub session: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub selected: bool,
}

/// Every instance in expander order, flagged with whether it is selected.
pub fn listing(all: &[SessionInstance], selected: &[SessionInstance]) -> Vec<ListEntry> {
    all.iter()
        .map(|inst| ListEntry {
            display_id: inst.display_id.clone(),
            session: inst.definition_name.clone(),
            description: inst.description.clone(),
            selected: selected.iter().any(|s| s.display_id == inst.display_id),
        })
        .collect()
}

/// `* id -> description` for selected instances, `- id` for the rest.
pub fn render_listing(entries: &[ListEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let marker = if e.selected { '*' } else { '-' };
            match &e.description {
                Some(d) => format!("{} {} -> {}", marker, e.display_id, d),
                None => format!("{} {}", marker, e.display_id),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
