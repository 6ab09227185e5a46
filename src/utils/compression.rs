//! xz compression of dump files
//!
//! Both directions stream through fixed-size buffers; files of any size are
//! handled without loading them into memory.

use crate::error::{BackupError, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

pub const COMPRESSED_SUFFIX: &str = ".xz";

/// xz preset used for dumps (0-9)
const XZ_PRESET: u32 = 6;

/// Path of the compressed artifact for `path`
pub fn compressed_path(path: &Path) -> PathBuf {
    append_suffix(path, COMPRESSED_SUFFIX)
}

/// Path a decompressed file is written to: `.xz` stripped, else `.out` appended
pub fn decompressed_path(path: &Path) -> PathBuf {
    strip_suffix(path, COMPRESSED_SUFFIX).unwrap_or_else(|| append_suffix(path, ".out"))
}

/// Compress `source` into `source.xz`, returning the new path
///
/// The source file is left in place.
pub fn compress_file(source: &Path) -> Result<PathBuf> {
    let target = compressed_path(source);
    compress_into(source, &target)?;
    Ok(target)
}

/// Compress `source` into an explicit `target` path
pub fn compress_into(source: &Path, target: &Path) -> Result<()> {
    info!("Compressing {}", source.display());

    let input = File::open(source)
        .map_err(|e| BackupError::Compression(format!("cannot open {}: {}", source.display(), e)))?;
    let output = File::create(target)
        .map_err(|e| BackupError::Compression(format!("cannot create {}: {}", target.display(), e)))?;

    let mut reader = BufReader::new(input);
    let mut encoder = XzEncoder::new(BufWriter::new(output), XZ_PRESET);

    let bytes = io::copy(&mut reader, &mut encoder).map_err(compression_error)?;
    let mut writer = encoder.finish().map_err(compression_error)?;
    writer.flush().map_err(compression_error)?;

    debug!("Compressed {} bytes into {}", bytes, target.display());
    Ok(())
}

/// Decompress an `.xz` file next to itself, returning the new path
pub fn decompress_file(source: &Path) -> Result<PathBuf> {
    let target = decompressed_path(source);
    decompress_into(source, &target)?;
    Ok(target)
}

/// Decompress `source` into an explicit `target` path
pub fn decompress_into(source: &Path, target: &Path) -> Result<()> {
    info!("Decompressing {}", source.display());

    let input = File::open(source)
        .map_err(|e| BackupError::Compression(format!("cannot open {}: {}", source.display(), e)))?;
    let output = File::create(target)
        .map_err(|e| BackupError::Compression(format!("cannot create {}: {}", target.display(), e)))?;

    let mut decoder = XzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);

    let result = io::copy(&mut decoder, &mut writer).and_then(|bytes| writer.flush().map(|_| bytes));
    match result {
        Ok(bytes) => {
            debug!("Decompressed {} bytes into {}", bytes, target.display());
            Ok(())
        }
        Err(e) => {
            drop(writer);
            let _ = std::fs::remove_file(target);
            Err(compression_error(e))
        }
    }
}

/// Run [`compress_into`] on the blocking thread pool
pub async fn compress_into_async(source: PathBuf, target: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || compress_into(&source, &target))
        .await
        .map_err(|e| BackupError::Compression(format!("compression task failed: {}", e)))?
}

fn compression_error(e: io::Error) -> BackupError {
    BackupError::Compression(e.to_string())
}

pub(crate) fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn strip_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.to_str()?;
    name.strip_suffix(suffix)
        .filter(|stripped| !stripped.is_empty() && !stripped.ends_with('/'))
        .map(PathBuf::from)
}
