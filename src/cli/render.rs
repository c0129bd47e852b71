use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::models::{ReproductionOutcome, ReproductionStatus};
use crate::pipeline::{BatchSummary, PocRecord};
use crate::scoring::{reliability_level, verification_status, ScoreBreakdown};
use crate::utils::{short_id, truncate_error, truncate_output};

/// Spinner on stderr; hidden when `quiet`.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("  {spinner:.cyan} {msg} ({elapsed})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(template);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn status_label(status: ReproductionStatus) -> String {
    match status {
        ReproductionStatus::Success => style("SUCCESS").green().bold().to_string(),
        ReproductionStatus::Partial => style("PARTIAL").yellow().bold().to_string(),
        ReproductionStatus::Failed => style("FAILED").red().bold().to_string(),
    }
}

pub fn render_outcome(outcome: &ReproductionOutcome) -> String {
    let mut lines = vec![format!(
        "{} Reproduction {} [{}]",
        style("▶").green().bold(),
        style(&outcome.reproduction_id).cyan(),
        outcome.poc_type,
    )];

    if let Some(target) = &outcome.target_host {
        lines.push(format!("  Target:    {}", target));
    }
    lines.push(format!("  Status:    {}", status_label(outcome.status)));

    if let Some(error) = &outcome.error {
        let stage = outcome.failed_stage.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        lines.push(format!(
            "  {} {} (after {})",
            style("Error:").red().bold(),
            truncate_error(error),
            stage,
        ));
    }

    if let Some(exec) = &outcome.execution_result {
        let exit = if exec.timed_out {
            format!("{} (timed out)", exec.exit_code)
        } else {
            exec.exit_code.to_string()
        };
        lines.push(format!("  Exit code: {}", exit));
        if !exec.stdout.trim().is_empty() {
            lines.push(format!("  {}", style("stdout:").dim()));
            lines.extend(truncate_output(exec.stdout.trim_end()).lines().map(|l| format!("    {}", l)));
        }
        if !exec.stderr.trim().is_empty() {
            lines.push(format!("  {}", style("stderr:").dim()));
            lines.extend(truncate_output(exec.stderr.trim_end()).lines().map(|l| format!("    {}", l)));
        }
    }

    let paths = outcome.evidence.paths();
    if !paths.is_empty() || !outcome.evidence.notes.is_empty() {
        lines.push("  Evidence:".to_string());
        for (kind, path) in &paths {
            lines.push(format!("    {} {:<9} {}", style("✓").green(), kind, path.display()));
        }
        for (kind, note) in &outcome.evidence.notes {
            lines.push(format!("    {} {:<9} {}", style("✗").dim(), kind, style(note).dim()));
        }
    }

    if let Some(info) = &outcome.container_info {
        let mut line = format!("  Container: {} ({}, {})", info.name, short_id(&info.id), info.status);
        if let Some(tag) = &info.snapshot_tag {
            line.push_str(&format!(", snapshot {}", tag));
        }
        lines.push(line);
    }

    lines.join("\n")
}

pub fn render_breakdown(breakdown: &ScoreBreakdown, threshold: u8) -> String {
    format!(
        "{} Reliability {}/100 ({}, {})\n  source   {:>2}/40\n  status   {:>2}/40\n  evidence {:>2}/20",
        style("◆").cyan().bold(),
        style(breakdown.total).bold(),
        reliability_level(breakdown.total),
        verification_status(breakdown.total, threshold),
        breakdown.source,
        breakdown.status,
        breakdown.evidence,
    )
}

pub fn render_record_line(record: &PocRecord) -> String {
    let label = record.metadata.as_ref()
        .map(|m| m.poc_id.clone())
        .unwrap_or_else(|| record.outcome.poc_type.clone());
    let mut line = format!(
        "  {} {:<8} {:>3} {:<6} {}",
        if record.success { style("✓").green() } else { style("✗").red() },
        record.status,
        record.reliability_score,
        record.reliability_level,
        label,
    );
    if let Some(error) = &record.error {
        line.push_str(&format!(" ({})", style(truncate_error(error)).red()));
    }
    line
}

pub fn render_summary(summary: &BatchSummary) -> String {
    let counts: Vec<String> = summary.status_counts.iter().map(|(s, n)| format!("{} {}", n, s)).collect();
    format!(
        "{} {} jobs: {} | {} verified | {} infrastructure failures | mean score {:.1}",
        style("■").cyan().bold(),
        summary.total,
        if counts.is_empty() { "none".to_string() } else { counts.join(", ") },
        summary.verified,
        summary.infrastructure_failures,
        summary.mean_score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceBundle, EvidenceKind, ExecutionResult, ReproductionStage};
    use chrono::Utc;
    use std::path::PathBuf;

    fn outcome() -> ReproductionOutcome {
        let mut evidence = EvidenceBundle::default();
        evidence.set(EvidenceKind::Syscalls, PathBuf::from("/ev/x_syscalls.log"));
        evidence.note(EvidenceKind::Network, "tcpdump not available");
        ReproductionOutcome {
            reproduction_id: "poc_x".into(),
            poc_type: "rce".into(),
            target_host: Some("10.0.0.1".into()),
            success: true,
            status: ReproductionStatus::Success,
            execution_result: Some(ExecutionResult::new(0, "remote code execution ok\n", "")),
            evidence,
            container_info: None,
            error: None,
            error_type: None,
            failed_stage: None,
            final_stage: ReproductionStage::CleanedUp,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_render_outcome_lists_evidence_and_output() {
        let text = console::strip_ansi_codes(&render_outcome(&outcome())).to_string();
        assert!(text.contains("Status:    SUCCESS"));
        assert!(text.contains("remote code execution ok"));
        assert!(text.contains("syscalls  /ev/x_syscalls.log"));
        assert!(text.contains("tcpdump not available"));
    }

    #[test]
    fn test_render_breakdown() {
        let breakdown = ScoreBreakdown { source: 34, status: 40, evidence: 0, total: 74 };
        let text = console::strip_ansi_codes(&render_breakdown(&breakdown, 70)).to_string();
        assert!(text.contains("74/100 (medium, verified)"));
        assert!(text.contains("source   34/40"));
    }
}
