//! Run report: table rendering, JSON export and exit codes

use crate::config::{ProbePolicy, RunConfig, RunMode};
use crate::coordinator::NodeOutcome;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// At least one candidate succeeded
    Success,
    /// Candidates were tried and all failed
    AllFailed,
    /// No input list, or the configuration is invalid
    InputMissing,
    /// Input present but no entry parsed
    NoCandidates,
    /// Stopped by a signal before finishing
    Interrupted,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::AllFailed => 1,
            ExitStatus::InputMissing => 2,
            ExitStatus::NoCandidates => 3,
            ExitStatus::Interrupted => 130,
        }
    }
}

/// Everything recorded by one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    pub probe_policy: ProbePolicy,
    pub candidates: usize,
    pub interrupted: bool,
    pub outcomes: Vec<NodeOutcome>,
}

impl RunReport {
    pub fn new(
        run: &RunConfig,
        candidates: usize,
        started_at: DateTime<Utc>,
        outcomes: Vec<NodeOutcome>,
        interrupted: bool,
    ) -> Self {
        RunReport {
            started_at,
            finished_at: Utc::now(),
            mode: run.mode,
            probe_policy: run.probe_policy,
            candidates,
            interrupted,
            outcomes,
        }
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    /// First successful node, in candidate order
    pub fn first_success(&self) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.status.is_success())
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.successes() > 0 {
            ExitStatus::Success
        } else if self.interrupted {
            ExitStatus::Interrupted
        } else if self.candidates == 0 {
            ExitStatus::NoCandidates
        } else {
            ExitStatus::AllFailed
        }
    }

    pub fn render(&self) -> String {
        let mut out = render_table(&self.outcomes);
        let _ = write!(
            out,
            "\n{} of {} tested node(s) passed ({} candidate(s), mode {})",
            self.successes(),
            self.outcomes.len(),
            self.candidates,
            self.mode
        );
        if self.interrupted {
            out.push_str(", interrupted");
        }
        out.push('\n');
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

const HEADERS: [&str; 6] = ["#", "NODE", "NETWORK", "BROWSER", "LATENCY", "STATUS"];

/// Fixed-width table of outcomes
pub fn render_table(outcomes: &[NodeOutcome]) -> String {
    let rows: Vec<[String; 6]> = outcomes
        .iter()
        .map(|o| {
            [
                (o.index + 1).to_string(),
                o.endpoint_label.clone(),
                o.network_probe_address.clone().unwrap_or_else(|| "-".to_string()),
                o.browser_probe_address.clone().unwrap_or_else(|| "-".to_string()),
                o.network_latency_ms
                    .map(|ms| format!("{} ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
                o.status.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(rule.join("-+-").as_str());
    out.push('\n');

    if rows.is_empty() {
        out.push_str("(no candidates tested)\n");
    }
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}
