//! Password-based file encryption
//!
//! File layout: a random 16-byte salt followed by a Fernet token
//! (version, timestamp, IV, AES-128-CBC ciphertext, HMAC-SHA256 tag).
//! The Fernet key is PBKDF2-HMAC-SHA256 of the passphrase and salt.
//!
//! A wrong passphrase and a corrupted file fail the same way.
//!
//! Fernet tokens are one-shot, so the whole file is held in memory while it
//! is sealed: the plaintext, the base64 token and the output buffer together
//! peak at roughly 3.5 times the input size. Inputs of
//! [`LARGE_INPUT_BYTES`] or more are logged with a warning.

use crate::config::Secret;
use crate::error::{BackupError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use fernet::Fernet;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

pub const ENCRYPTED_SUFFIX: &str = ".enc";
pub const SALT_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;
pub const ITERATIONS: u32 = 600_000;

/// Input size from which encryption logs a memory warning (1 GiB)
pub const LARGE_INPUT_BYTES: u64 = 1 << 30;

/// Approximate peak memory needed to encrypt `input_len` bytes
pub fn peak_memory_estimate(input_len: u64) -> u64 {
    input_len.saturating_mul(7) / 2
}

/// Path of the encrypted artifact for `path`
pub fn encrypted_path(path: &Path) -> PathBuf {
    super::compression::append_suffix(path, ENCRYPTED_SUFFIX)
}

/// Path a decrypted file is written to: `.enc` stripped, else `.decrypted` appended
pub fn decrypted_path(path: &Path) -> PathBuf {
    super::compression::strip_suffix(path, ENCRYPTED_SUFFIX)
        .unwrap_or_else(|| super::compression::append_suffix(path, ".decrypted"))
}

fn derive_fernet(passphrase: &Secret, salt: &[u8]) -> Option<Fernet> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.expose().as_bytes(), salt, ITERATIONS, &mut *key);
    let encoded = Zeroizing::new(URL_SAFE.encode(&*key));
    Fernet::new(&encoded)
}

/// Encrypt bytes into `salt ∥ token`
pub fn encrypt_bytes(plaintext: &[u8], passphrase: &Secret) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let fernet = derive_fernet(passphrase, &salt)
        .ok_or_else(|| BackupError::Encryption("key derivation produced an invalid key".to_string()))?;
    let token = fernet.encrypt(plaintext);

    let mut output = Vec::with_capacity(SALT_SIZE + token.len());
    output.extend_from_slice(&salt);
    output.extend_from_slice(token.as_bytes());
    Ok(output)
}

/// Decrypt `salt ∥ token` bytes
pub fn decrypt_bytes(data: &[u8], passphrase: &Secret) -> Result<Vec<u8>> {
    if data.len() < SALT_SIZE {
        return Err(BackupError::Decryption(
            "file is too short to contain a salt".to_string(),
        ));
    }
    let (salt, token) = data.split_at(SALT_SIZE);

    let invalid = || BackupError::Decryption("invalid passphrase or corrupted data".to_string());

    let token = std::str::from_utf8(token).map_err(|_| invalid())?;
    let fernet = derive_fernet(passphrase, salt).ok_or_else(invalid)?;
    fernet.decrypt(token.trim_end()).map_err(|_| invalid())
}

/// Encrypt `source` into `source.enc`, returning the new path
pub fn encrypt_file(source: &Path, passphrase: &Secret) -> Result<PathBuf> {
    let target = encrypted_path(source);
    encrypt_into(source, &target, passphrase)?;
    Ok(target)
}

/// Encrypt `source` into an explicit `target` path
pub fn encrypt_into(source: &Path, target: &Path, passphrase: &Secret) -> Result<()> {
    info!("Encrypting {}", source.display());

    if let Ok(metadata) = fs::metadata(source) {
        if metadata.len() >= LARGE_INPUT_BYTES {
            warn!(
                "Encrypting {} ({} MiB) needs about {} MiB of memory",
                source.display(),
                metadata.len() >> 20,
                peak_memory_estimate(metadata.len()) >> 20
            );
        }
    }

    let plaintext = Zeroizing::new(fs::read(source).map_err(|e| {
        BackupError::Encryption(format!("cannot read {}: {}", source.display(), e))
    })?);
    let encrypted = encrypt_bytes(&plaintext, passphrase)?;

    fs::write(target, encrypted).map_err(|e| {
        BackupError::Encryption(format!("cannot write {}: {}", target.display(), e))
    })?;

    debug!("File encrypted successfully: {}", target.display());
    Ok(())
}

/// Decrypt `source`, writing the result only after the token verified
pub fn decrypt_file(source: &Path, passphrase: &Secret) -> Result<PathBuf> {
    let target = decrypted_path(source);
    info!("Decrypting file: {} -> {}", source.display(), target.display());

    let data = fs::read(source).map_err(|e| {
        BackupError::Decryption(format!("cannot read {}: {}", source.display(), e))
    })?;

    let plaintext = match decrypt_bytes(&data, passphrase) {
        Ok(plaintext) => Zeroizing::new(plaintext),
        Err(e) => {
            error!("Invalid password or corrupted file: {}", source.display());
            return Err(e);
        }
    };

    fs::write(&target, plaintext.as_slice())?;
    info!("File decrypted successfully: {}", target.display());
    Ok(target)
}

/// Read a passphrase from a file, ignoring the trailing line ending
pub fn read_passphrase_file(path: &Path) -> Result<Secret> {
    let contents = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
        BackupError::Decryption(format!("cannot read password file {}: {}", path.display(), e))
    })?);

    let passphrase = Secret::new(contents.trim_end_matches(['\r', '\n']));
    if passphrase.is_empty() {
        return Err(BackupError::Decryption(format!(
            "password file {} is empty",
            path.display()
        )));
    }
    Ok(passphrase)
}

/// Run [`encrypt_into`] on the blocking thread pool
pub async fn encrypt_into_async(source: PathBuf, target: PathBuf, passphrase: Secret) -> Result<()> {
    tokio::task::spawn_blocking(move || encrypt_into(&source, &target, &passphrase))
        .await
        .map_err(|e| BackupError::Encryption(format!("encryption task failed: {}", e)))?
}
