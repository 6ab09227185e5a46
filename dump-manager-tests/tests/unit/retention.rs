//! Unit tests for retention selection
//!
//! Covers the deletion count over many listing sizes and the handling of
//! names that cannot be parsed.

use dump_manager::utils::retention::select_for_deletion;
use rstest::rstest;
use test_utils::backup_names;

const PREFIX: &str = "prefix_";
const DATE_FORMAT: &str = "%Y%m%d";

fn dates(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("2024{:02}{:02}", 1 + i / 28, 1 + i % 28))
        .collect()
}

#[test]
fn test_three_backups_keep_two() {
    let listing = backup_names(PREFIX, &["20240101", "20240102", "20240103"]);

    let deleted = select_for_deletion(&listing, PREFIX, DATE_FORMAT, 2);

    assert_eq!(deleted, vec!["prefix_20240101.sql"]);
}

#[test]
fn test_unparsable_name_is_neither_kept_nor_deleted() {
    let mut listing = backup_names(PREFIX, &["20240103", "20240101", "20240102"]);
    listing.insert(1, "prefix_invalid.sql".to_string());

    let deleted = select_for_deletion(&listing, PREFIX, DATE_FORMAT, 1);

    assert_eq!(deleted, vec!["prefix_20240101.sql", "prefix_20240102.sql"]);
    assert!(!deleted.contains(&"prefix_invalid.sql".to_string()));
}

#[test]
fn test_other_jobs_files_are_ignored() {
    let mut listing = backup_names(PREFIX, &["20240101", "20240102"]);
    listing.extend(backup_names("other_", &["20230101", "20230102"]));
    listing.push("README.txt".to_string());

    let deleted = select_for_deletion(&listing, PREFIX, DATE_FORMAT, 1);

    assert_eq!(deleted, vec!["prefix_20240101.sql"]);
}

#[rstest]
#[case(0, 3)]
#[case(1, 0)]
#[case(5, 1)]
#[case(5, 5)]
#[case(12, 4)]
#[case(30, 7)]
fn test_deletes_oldest_excess(#[case] count: usize, #[case] max: u32) {
    let stamps = dates(count);
    // Reverse so listing order differs from age order
    let mut listing: Vec<String> = stamps.iter().map(|d| format!("{}{}.sql", PREFIX, d)).collect();
    listing.reverse();

    let deleted = select_for_deletion(&listing, PREFIX, DATE_FORMAT, max);

    let expected_len = count.saturating_sub(max as usize);
    assert_eq!(deleted.len(), expected_len);

    let oldest: Vec<String> = stamps
        .iter()
        .take(expected_len)
        .map(|d| format!("{}{}.sql", PREFIX, d))
        .collect();
    assert_eq!(deleted, oldest);
}
