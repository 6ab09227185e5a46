//! Tests for the 'setup' command
//!
//! Setup writes one marked crontab entry per enabled backup. These tests
//! work on crontab text and never touch the real crontab.

use dump_manager::config::resolve_all_jobs;
use dump_manager::utils::cron::{build_cron_entry, marker, remove_entry, upsert_entry, validate_cron_schedule};
use std::path::Path;
use test_utils::ConfigBuilder;

const BINARY: &str = "/usr/local/bin/dump-manager";
const CONFIG: &str = "/etc/dump-manager/config.toml";

fn entry_for(id: &str, schedule: &str) -> String {
    build_cron_entry(
        id,
        schedule,
        Path::new(BINARY),
        Path::new(CONFIG),
        Path::new("/var/log/dump-manager"),
    )
}

#[test]
fn test_setup_builds_entry_per_enabled_backup() {
    let config = ConfigBuilder::minimal()
        .add_backup("shop")
        .add_backup("blog")
        .add_disabled_backup("archive")
        .build();
    let jobs = resolve_all_jobs(&config).unwrap();

    let mut ids: Vec<_> = jobs.keys().cloned().collect();
    ids.sort();

    let mut crontab = String::from("MAILTO=\"\"\n");
    for id in ids.iter().filter(|id| jobs[*id].enabled) {
        let job = &jobs[id];
        assert!(validate_cron_schedule(&job.schedule));
        crontab = upsert_entry(&crontab, id, &entry_for(id, &job.schedule));
    }

    assert!(crontab.starts_with("MAILTO=\"\"\n"));
    assert!(crontab.contains(&marker("shop")));
    assert!(crontab.contains(&marker("blog")));
    assert!(!crontab.contains(&marker("archive")));
    assert!(crontab.contains("run --backup shop >> /var/log/dump-manager/cron.log 2>&1"));
}

#[test]
fn test_setup_twice_does_not_duplicate() {
    let entry = entry_for("shop", "0 2 * * *");

    let once = upsert_entry("", "shop", &entry);
    let twice = upsert_entry(&once, "shop", &entry);

    assert_eq!(once, twice);
    assert_eq!(twice.matches(&marker("shop")).count(), 1);
}

#[test]
fn test_setup_replaces_changed_schedule() {
    let first = upsert_entry("", "shop", &entry_for("shop", "0 2 * * *"));
    let second = upsert_entry(&first, "shop", &entry_for("shop", "30 4 * * 0"));

    assert!(second.contains("30 4 * * 0"));
    assert!(!second.contains("0 2 * * *"));
}

#[test]
fn test_remove_leaves_other_backups() {
    let crontab = upsert_entry("", "shop", &entry_for("shop", "0 2 * * *"));
    let crontab = upsert_entry(&crontab, "blog", &entry_for("blog", "0 3 * * *"));

    let remaining = remove_entry(&crontab, "shop");

    assert!(!remaining.contains(&marker("shop")));
    assert!(remaining.contains(&marker("blog")));
    assert!(remaining.contains("run --backup blog"));
}
