//! Retention: decide which backups at a destination should be deleted
//!
//! Backup files are recognised purely by name: `<prefix><timestamp><suffix>`
//! where the timestamp follows the job's date format and the suffix is one of
//! [`BACKUP_SUFFIXES`]. Everything else in the listing is left alone.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

/// File name endings produced by the dump, compress and encrypt stages
pub const BACKUP_SUFFIXES: [&str; 4] = [".sql.xz.enc", ".sql.enc", ".sql.xz", ".sql"];

/// Parse the timestamp embedded in a backup file name
///
/// Returns `None` when the name does not start with `prefix`, has no known
/// suffix, or the remainder does not match `date_format`.
pub fn parse_backup_timestamp(name: &str, prefix: &str, date_format: &str) -> Option<NaiveDateTime> {
    let rest = name.strip_prefix(prefix)?;
    let stamp = BACKUP_SUFFIXES
        .iter()
        .find_map(|suffix| rest.strip_suffix(suffix))?;

    NaiveDateTime::parse_from_str(stamp, date_format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(stamp, date_format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Select the backups to delete so that at most `max_backup_files` remain
///
/// Names that start with `prefix` but cannot be parsed are skipped and logged,
/// never selected. Equal timestamps keep their listing order. With
/// `max_backup_files == 0` every parseable backup is selected.
pub fn select_for_deletion(
    filenames: &[String],
    prefix: &str,
    date_format: &str,
    max_backup_files: u32,
) -> Vec<String> {
    let mut dated: Vec<(NaiveDateTime, &String)> = Vec::new();

    for name in filenames.iter().filter(|name| name.starts_with(prefix)) {
        match parse_backup_timestamp(name, prefix, date_format) {
            Some(timestamp) => dated.push((timestamp, name)),
            None => warn!("Ignoring file with unparsable backup name: {}", name),
        }
    }

    // Vec::sort_by_key is stable
    dated.sort_by_key(|(timestamp, _)| *timestamp);

    let keep = max_backup_files as usize;
    let excess = dated.len().saturating_sub(keep);

    debug!(
        "Retention: {} backups found, keeping {}, deleting {}",
        dated.len(),
        dated.len() - excess,
        excess
    );

    dated
        .into_iter()
        .take(excess)
        .map(|(_, name)| name.clone())
        .collect()
}
