//! Human-readable summaries (stderr) and JSON files for reports and sync logs.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use leadsync_recon::model::LeadRef;
use leadsync_recon::summary::match_type_breakdown;
use leadsync_recon::{ReconciliationReport, ReportDocument, SyncOutcome, UpdateIntent, UpdatePlan};
use serde::Serialize;

use crate::exit_codes;
use crate::fetch::common::truncate_chars;
use crate::CliError;

const MAX_STATUS_DIFFS: usize = 20;
const MAX_UNMATCHED: usize = 10;
const NOTES_PREVIEW_CHARS: usize = 60;

// ── Human output ────────────────────────────────────────────────────

pub fn render_report(report: &ReconciliationReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    let rate = s
        .match_rate()
        .map(|r| format!("{:.1}%", r))
        .unwrap_or_else(|| "n/a".to_string());
    let _ = writeln!(out, "reconciliation: {} source, {} target", s.source_count, s.target_count);
    let _ = writeln!(out, "  matched:            {} ({})", s.matched_count, rate);
    let _ = writeln!(out, "  unmatched source:   {}", s.unmatched_source_count);
    let _ = writeln!(out, "  unmatched target:   {}", s.unmatched_target_count);
    let _ = writeln!(out, "  status differences: {}", s.status_diff_count);

    let breakdown = match_type_breakdown(&report.matches);
    if !breakdown.is_empty() {
        let _ = writeln!(out, "\nmatch types:");
        for (category, count) in breakdown {
            let _ = writeln!(out, "  {:<6} {}", category.as_str(), count);
        }
    }

    let diffs: Vec<_> = report.matches.iter().filter(|m| m.status_differs).collect();
    if !diffs.is_empty() {
        let _ = writeln!(out, "\nstatus differences:");
        for m in diffs.iter().take(MAX_STATUS_DIFFS) {
            let Some(target) = &m.target else { continue };
            let _ = writeln!(
                out,
                "  {}: {} -> {} ({}, {:.2})",
                m.source.name,
                target.status,
                m.source.status,
                m.match_type.as_str(),
                m.match_confidence,
            );
        }
        more_line(&mut out, diffs.len(), MAX_STATUS_DIFFS);
    }

    unmatched_section(&mut out, "unmatched source", &report.unmatched_source);
    unmatched_section(&mut out, "unmatched target", &report.unmatched_target);

    if !report.duplicate_target_phones.is_empty() {
        let _ = writeln!(out, "\nphones shared by several targets (first loaded wins):");
        for dup in &report.duplicate_target_phones {
            let _ = writeln!(out, "  {}: {}", dup.phone, dup.target_ids.join(", "));
        }
    }

    out
}

fn unmatched_section(out: &mut String, title: &str, leads: &[LeadRef]) {
    if leads.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}:", title);
    for lead in leads.iter().take(MAX_UNMATCHED) {
        let _ = writeln!(
            out,
            "  {} {} ({}) [{}]",
            lead.id,
            lead.name,
            lead.phone.as_deref().or(lead.email.as_deref()).unwrap_or("-"),
            lead.status,
        );
    }
    more_line(out, leads.len(), MAX_UNMATCHED);
}

fn more_line(out: &mut String, total: usize, shown: usize) {
    if total > shown {
        let _ = writeln!(out, "  ... and {} more", total - shown);
    }
}

/// Notes on one line, cut to the preview width.
pub fn notes_preview(notes: &str) -> String {
    let flat = notes.replace(['\r', '\n'], " ");
    let cut = truncate_chars(&flat, NOTES_PREVIEW_CHARS);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat
    }
}

pub fn render_pending(plan: &UpdatePlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "pending updates: {} ({} status changes, {} with notes)",
        plan.intents.len(),
        plan.status_change_count(),
        plan.with_notes_count(),
    );
    for intent in &plan.intents {
        let change = match intent.new_status {
            Some(status) => format!("{} -> {}", intent.old_status, status),
            None => format!("{} =", intent.old_status),
        };
        let _ = writeln!(out, "  [{}] {}: {}", intent.target_id, intent.lead_name, change);
        if let Some(notes) = &intent.notes {
            let _ = writeln!(out, "      notes: {}", notes_preview(notes));
        }
    }
    if !plan.warnings.is_empty() {
        let _ = writeln!(out, "\nskipped (status outside the vocabulary):");
        for w in &plan.warnings {
            let _ = writeln!(out, "  {} {}: '{}'", w.source_id, w.lead_name, w.status);
        }
    }
    out
}

pub fn render_outcome(outcome: &SyncOutcome, dry_run: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}{} attempted, {} succeeded, {} failed",
        if dry_run { "dry run: " } else { "" },
        outcome.updates_attempted,
        outcome.updates_succeeded,
        outcome.updates_failed,
    );
    for e in &outcome.errors {
        let _ = writeln!(out, "  {}", e);
    }
    out
}

// ── JSON files ──────────────────────────────────────────────────────

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: exit_codes::EXIT_ERROR,
        message: format!("JSON serialization error: {}", e),
        hint: None,
    })?;
    std::fs::write(path, json).map_err(|e| CliError {
        code: exit_codes::EXIT_IO,
        message: format!("cannot write {}: {}", path.display(), e),
        hint: None,
    })
}

pub fn save_report(path: &Path, doc: &ReportDocument) -> Result<(), CliError> {
    write_json(path, doc)?;
    log::info!("wrote report to {}", path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct SyncLog<'a> {
    pub timestamp: DateTime<Utc>,
    pub result: &'a SyncOutcome,
    pub updates: &'a [UpdateIntent],
}

pub fn save_sync_log(path: &Path, log: &SyncLog<'_>) -> Result<(), CliError> {
    write_json(path, log)?;
    log::info!("wrote sync log to {}", path.display());
    Ok(())
}
