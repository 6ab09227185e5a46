//! Unit tests for file encryption
//!
//! Verifies the on-disk layout and that only the right passphrase decrypts.

use dump_manager::config::Secret;
use dump_manager::utils::encryption::{
    decrypt_bytes, decrypt_file, encrypt_file, encrypted_path, SALT_SIZE,
};
use dump_manager::ErrorKind;
use test_utils::{ResultAssertions, TestContext, SAMPLE_DUMP};

#[test]
fn test_salt_prefix_then_token() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop.sql", SAMPLE_DUMP);
    let secret = Secret::new("secret");

    let encrypted = encrypt_file(&source, &secret).assert_ok();
    assert_eq!(encrypted, encrypted_path(&source));

    let data = std::fs::read(&encrypted).unwrap();
    assert!(data.len() > SALT_SIZE);
    // Fernet tokens are URL-safe base64 text
    assert!(data[SALT_SIZE..]
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_' || *b == b'='));

    assert_eq!(decrypt_bytes(&data, &secret).assert_ok(), SAMPLE_DUMP);

    let err = decrypt_bytes(&data, &Secret::new("not-the-secret")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);
}

#[test]
fn test_same_input_encrypts_differently() {
    let ctx = TestContext::new();
    let first = ctx.create_binary_file("a/shop.sql", SAMPLE_DUMP);
    let second = ctx.create_binary_file("b/shop.sql", SAMPLE_DUMP);
    let secret = Secret::new("secret");

    let a = std::fs::read(encrypt_file(&first, &secret).unwrap()).unwrap();
    let b = std::fs::read(encrypt_file(&second, &secret).unwrap()).unwrap();

    assert_ne!(a[..SALT_SIZE], b[..SALT_SIZE]);
    assert_ne!(a, b);
}

#[test]
fn test_decrypt_file_restores_original_name() {
    let ctx = TestContext::new();
    let source = ctx.create_binary_file("shop_20240101.sql", SAMPLE_DUMP);
    let secret = Secret::new("secret");

    let encrypted = encrypt_file(&source, &secret).unwrap();
    std::fs::remove_file(&source).unwrap();

    let restored = decrypt_file(&encrypted, &secret).assert_ok();
    assert_eq!(restored, source);
    assert_eq!(std::fs::read(&restored).unwrap(), SAMPLE_DUMP);
}

#[test]
fn test_error_text_never_contains_passphrase() {
    let ctx = TestContext::new();
    let garbage = ctx.create_binary_file("broken.sql.enc", b"0123456789abcdef-not-a-token");

    let err = decrypt_file(&garbage, &Secret::new("super-secret-passphrase")).unwrap_err();

    assert!(!err.to_string().contains("super-secret-passphrase"));
    assert!(!format!("{:?}", err).contains("super-secret-passphrase"));
}
