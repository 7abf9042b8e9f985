//! Text summary builder for CLI output.
//!
//! Formats the human-readable lines printed after a run in text mode.

use crate::model::{RunOutcome, RunReport};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished run.
pub(crate) fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();

    let outcome = match &report.outcome {
        RunOutcome::Finished => "finished successfully".to_string(),
        RunOutcome::Cancelled => "cancelled".to_string(),
        RunOutcome::Failed { reason } => format!("failed ({reason})"),
    };
    lines.push(format!("Outcome: {outcome}"));
    lines.push(format!(
        "Copied: {} / {}",
        report.progress.completed, report.progress.total
    ));

    let remaining = report
        .progress
        .total
        .saturating_sub(report.progress.completed);
    if remaining > 0 {
        lines.push(format!("Not copied: {remaining}"));
    }
    lines.push(format!("Started: {}", report.started_at));
    lines.push(format!("Ended:   {}", report.ended_at));

    TextSummary { lines }
}
