//! Tests for the 'decompress' command

use dump_manager::utils::compression::{compress_file, decompress_file};
use test_utils::{ResultAssertions, TestContext, SAMPLE_DUMP};

#[test]
fn test_decompress_downloaded_backup() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop.sql", SAMPLE_DUMP);
    let compressed = compress_file(&source).unwrap();
    std::fs::remove_file(&source).unwrap();

    let restored = decompress_file(&compressed).assert_ok();

    assert_eq!(restored, source);
    assert_eq!(std::fs::read(restored).unwrap(), SAMPLE_DUMP);
}

#[test]
fn test_decompress_non_xz_file_fails() {
    let ctx = TestContext::new();
    let bogus = ctx.create_file("shop.sql.xz", "plain text, not xz");

    decompress_file(&bogus).assert_err_contains("Compression");
}
