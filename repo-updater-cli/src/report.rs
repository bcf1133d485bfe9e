//! Human and JSON rendering of a [`SyncReport`], shared by `sync` and `diff`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use repo_updater_core::Repo;
use repo_updater_sync::SyncReport;

#[derive(Serialize)]
struct ReportJson {
    dry_run: bool,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    sourced: usize,
    added: Vec<String>,
    modified: Vec<String>,
    deleted: Vec<String>,
    unmodified: usize,
    source_errors: Vec<SourceErrorJson>,
}

#[derive(Serialize)]
struct SourceErrorJson {
    origin: String,
    error: String,
}

pub fn print(report: &SyncReport, dry_run: bool, json: bool) -> Result<()> {
    if json {
        print_json(report, dry_run)
    } else {
        print_human(report, dry_run);
        Ok(())
    }
}

fn keys(repos: &[Repo]) -> Vec<String> {
    repos.iter().map(|r| r.key().to_string()).collect()
}

fn print_json(report: &SyncReport, dry_run: bool) -> Result<()> {
    let payload = ReportJson {
        dry_run,
        started_at: report.started_at,
        duration_ms: report.duration_ms,
        sourced: report.sourced,
        added: keys(&report.diff.added),
        modified: keys(&report.diff.modified),
        deleted: keys(&report.diff.deleted),
        unmodified: report.diff.unmodified.len(),
        source_errors: report
            .source_errors
            .iter()
            .map(|err| SourceErrorJson {
                origin: err.origin.to_string(),
                error: err.source.to_string(),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

fn print_human(report: &SyncReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let diff = &report.diff;

    if diff.is_empty() {
        println!(
            "{prefix}✓ catalog up to date ({} unchanged, {}ms)",
            diff.unmodified.len(),
            report.duration_ms
        );
    } else {
        let verb = if dry_run { "would change" } else { "changed" };
        println!(
            "{prefix}✓ catalog {verb}: {} added, {} modified, {} deleted, {} unchanged ({}ms)",
            diff.added.len(),
            diff.modified.len(),
            diff.deleted.len(),
            diff.unmodified.len(),
            report.duration_ms
        );
        for repo in &diff.added {
            println!("  {}  {}", "+".green().bold(), repo.key());
        }
        for repo in &diff.modified {
            println!("  {}  {}", "~".yellow().bold(), repo.key());
        }
        for repo in &diff.deleted {
            println!("  {}  {}", "-".red().bold(), repo.key());
        }
    }

    if !report.source_errors.is_empty() {
        println!(
            "{} {} source(s) failed:",
            "!".yellow().bold(),
            report.source_errors.len()
        );
        for err in report.source_errors.iter() {
            println!("  {}: {}", err.origin, err.source);
        }
    }
}
