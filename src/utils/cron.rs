//! Cron job management utilities
//!
//! Every backup gets one crontab entry preceded by a marker comment, so
//! re-running setup replaces entries instead of duplicating them.

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

const MARKER_PREFIX: &str = "# Dump Manager - Backup:";

/// Get the path to the dump-manager binary
pub fn get_binary_path() -> Result<PathBuf> {
    env::current_exe().context("Failed to get current executable path")
}

/// Marker line identifying the entry for `backup_id`
pub fn marker(backup_id: &str) -> String {
    format!("{} {}", MARKER_PREFIX, backup_id)
}

/// Get the current crontab
pub fn get_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .output()
        .context("Failed to execute crontab -l")?;

    if !output.status.success() {
        // Empty crontab returns non-zero, check stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            return Ok(String::new());
        }
        anyhow::bail!("Failed to read crontab: {}", stderr);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Set the crontab content
pub fn set_crontab(content: &str) -> Result<()> {
    use std::io::Write;

    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .context("Failed to spawn crontab")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes())
            .context("Failed to write to crontab stdin")?;
    } else {
        anyhow::bail!("Failed to open crontab stdin");
    }

    let output = child.wait_with_output()
        .context("Failed to wait for crontab")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Crontab command failed: {}", stderr);
    }

    info!("Crontab updated successfully");
    Ok(())
}

/// Build the two-line crontab entry (marker + schedule line) for a backup
pub fn build_cron_entry(
    backup_id: &str,
    schedule: &str,
    binary_path: &Path,
    config_path: &Path,
    log_directory: &Path,
) -> String {
    let log_file = log_directory.join("cron.log");
    let cron_command = format!(
        "{} --config {} run --backup {} >> {} 2>&1",
        binary_path.display(),
        config_path.display(),
        backup_id,
        log_file.display()
    );

    format!("{}\n{} {}", marker(backup_id), schedule, cron_command)
}

/// Drop the marker line of `backup_id` and the schedule line following it
pub fn remove_entry(crontab: &str, backup_id: &str) -> String {
    let marker = marker(backup_id);
    let mut new_lines = Vec::new();
    let mut skip_next = false;

    for line in crontab.lines() {
        if line.trim_end() == marker {
            skip_next = true;
            continue;
        }
        if skip_next {
            skip_next = false;
            continue;
        }
        new_lines.push(line);
    }

    if new_lines.is_empty() {
        String::new()
    } else {
        new_lines.join("\n") + "\n"
    }
}

/// Replace (or append) the entry for `backup_id`
pub fn upsert_entry(crontab: &str, backup_id: &str, entry: &str) -> String {
    let mut content = remove_entry(crontab, backup_id);
    content.push_str(entry);
    content.push('\n');
    content
}

/// Add or replace the cron job for a backup
pub fn add_cron_job(
    backup_id: &str,
    schedule: &str,
    config_path: &Path,
    log_directory: &Path,
    dry_run: bool,
) -> Result<()> {
    let binary_path = get_binary_path()?;
    let cron_entry = build_cron_entry(backup_id, schedule, &binary_path, config_path, log_directory);

    if dry_run {
        println!("  [DRY RUN] Would add cron job:");
        println!("    {}", cron_entry.replace('\n', "\n    "));
        return Ok(());
    }

    let existing = get_crontab()?;
    if existing.contains(&marker(backup_id)) {
        warn!("Cron job for backup '{}' already exists, updating...", backup_id);
    }

    set_crontab(&upsert_entry(&existing, backup_id, &cron_entry))?;

    info!("Added cron job for backup: {}", backup_id);
    Ok(())
}

/// Remove cron job for a backup
pub fn remove_cron_job(backup_id: &str, dry_run: bool) -> Result<()> {
    let existing = get_crontab()?;

    if !existing.contains(&marker(backup_id)) {
        return Ok(());
    }

    if dry_run {
        println!("  [DRY RUN] Would remove cron job for: {}", backup_id);
        return Ok(());
    }

    set_crontab(&remove_entry(&existing, backup_id))?;

    info!("Removed cron job for backup: {}", backup_id);
    Ok(())
}

/// Validate cron schedule syntax
pub fn validate_cron_schedule(schedule: &str) -> bool {
    // Basic validation: should have 5 fields
    schedule.split_whitespace().count() == 5
}

/// List all dump-manager cron jobs
pub fn list_cron_jobs() -> Result<Vec<String>> {
    let existing = get_crontab()?;

    Ok(existing
        .lines()
        .filter(|line| line.starts_with(MARKER_PREFIX))
        .map(String::from)
        .collect())
}
