//! Tests for the 'decrypt' command
//!
//! Decrypting a downloaded backup needs only the file and the passphrase.

use dump_manager::config::Secret;
use dump_manager::utils::encryption::{decrypt_file, encrypt_file, read_passphrase_file};
use test_utils::{ResultAssertions, TestContext, SAMPLE_DUMP};

#[test]
fn test_decrypt_downloaded_backup() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop_20240101_020000.sql", SAMPLE_DUMP);
    let encrypted = encrypt_file(&source, &Secret::new("passphrase-123")).unwrap();
    std::fs::remove_file(&source).unwrap();

    let restored = decrypt_file(&encrypted, &Secret::new("passphrase-123")).assert_ok();

    assert_eq!(restored, ctx.temp_dir().join("shop_20240101_020000.sql"));
    assert_eq!(std::fs::read(restored).unwrap(), SAMPLE_DUMP);
}

#[test]
fn test_decrypt_with_wrong_passphrase_writes_nothing() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop.sql", SAMPLE_DUMP);
    let encrypted = encrypt_file(&source, &Secret::new("passphrase-123")).unwrap();
    std::fs::remove_file(&source).unwrap();

    decrypt_file(&encrypted, &Secret::new("wrong")).assert_err_contains("Decryption");

    assert!(!ctx.file_exists("shop.sql"));
}

#[test]
fn test_decrypt_file_without_enc_suffix() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop.sql", SAMPLE_DUMP);
    let encrypted = encrypt_file(&source, &Secret::new("pw")).unwrap();
    let renamed = ctx.temp_dir().join("download.bin");
    std::fs::rename(&encrypted, &renamed).unwrap();

    let restored = decrypt_file(&renamed, &Secret::new("pw")).assert_ok();

    assert_eq!(restored, ctx.temp_dir().join("download.bin.decrypted"));
}

#[test]
fn test_decrypt_with_password_file() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop_20240101_020000.sql.xz", SAMPLE_DUMP);
    let encrypted = encrypt_file(&source, &Secret::new("passphrase-123")).unwrap();
    std::fs::remove_file(&source).unwrap();

    let password_file = ctx.create_password_file("passphrase-123");
    let passphrase = read_passphrase_file(&password_file).assert_ok();
    assert_eq!(passphrase.expose(), "passphrase-123");

    let restored = decrypt_file(&encrypted, &passphrase).assert_ok();
    assert_eq!(std::fs::read(restored).unwrap(), SAMPLE_DUMP);
}

#[test]
fn test_password_file_keeps_inner_whitespace() {
    let ctx = TestContext::new();
    let password_file = ctx.create_file("encryption-password", "  two words \r\n");

    let passphrase = read_passphrase_file(&password_file).assert_ok();
    assert_eq!(passphrase.expose(), "  two words ");
}

#[test]
fn test_empty_password_file_rejected() {
    let ctx = TestContext::new();
    let password_file = ctx.create_password_file("");

    read_passphrase_file(&password_file).assert_err_contains("empty");
}

#[test]
fn test_missing_password_file_rejected() {
    let ctx = TestContext::new();

    read_passphrase_file(&ctx.temp_dir().join("nope")).assert_err_contains("cannot read password file");
}
